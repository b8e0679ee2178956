/*
[INPUT]:  Binance REST responses and stream event payloads
[OUTPUT]: Typed wire structs parsed at the boundary
[POS]:    Datafeed - Binance schema definitions
[UPDATE]: When Binance payload fields used by the datafeed change
*/

use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use chartfeed_adapter::{ChartfeedError, Result};

pub const EXCHANGE_INFO_PATH: &str = "/api/v3/exchangeInfo";
pub const KLINES_PATH: &str = "/api/v3/klines";
pub const TICKER_24H_PATH: &str = "/api/v3/ticker/24hr";
pub const SERVER_TIME_PATH: &str = "/api/v3/time";

/// Page size of one klines request
pub const KLINES_PAGE_LIMIT: usize = 500;

pub const TICKER_EVENT: &str = "24hrTicker";
pub const KLINE_EVENT: &str = "kline";

const PRICE_FILTER: &str = "PRICE_FILTER";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExchangeInfo {
    #[serde(default)]
    pub symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSymbol {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

impl ExchangeSymbol {
    /// `round(1 / tickSize)` of the price filter, 1 without one.
    pub fn pricescale(&self) -> u64 {
        self.filters
            .iter()
            .find(|filter| filter.filter_type == PRICE_FILTER)
            .and_then(|filter| filter.tick_size)
            .filter(|tick| !tick.is_zero())
            .and_then(|tick| (Decimal::ONE / tick).round().to_u64())
            .unwrap_or(1)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolFilter {
    pub filter_type: String,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub tick_size: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTime {
    pub server_time: i64,
}

/// Entry of `/api/v3/ticker/24hr`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24h {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price_change: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub price_change_percent: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub last_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub bid_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub ask_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub open_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub high_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub low_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub prev_close_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub volume: Decimal,
}

/// `<symbol>@ticker` stream payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TickerEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    pub price_change: Decimal,
    #[serde(rename = "P", with = "rust_decimal::serde::str")]
    pub price_change_percent: Decimal,
    #[serde(rename = "c", with = "rust_decimal::serde::str")]
    pub last_price: Decimal,
    #[serde(rename = "b", with = "rust_decimal::serde::str")]
    pub bid_price: Decimal,
    #[serde(rename = "a", with = "rust_decimal::serde::str")]
    pub ask_price: Decimal,
    #[serde(rename = "o", with = "rust_decimal::serde::str")]
    pub open_price: Decimal,
    #[serde(rename = "h", with = "rust_decimal::serde::str")]
    pub high_price: Decimal,
    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    pub low_price: Decimal,
    #[serde(rename = "v", with = "rust_decimal::serde::str")]
    pub volume: Decimal,
}

/// `<symbol>@kline_<interval>` stream payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KlineEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: KlinePayload,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KlinePayload {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o", with = "rust_decimal::serde::str")]
    pub open: Decimal,
    #[serde(rename = "h", with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(rename = "c", with = "rust_decimal::serde::str")]
    pub close: Decimal,
    #[serde(rename = "v", with = "rust_decimal::serde::str")]
    pub volume: Decimal,
}

/// One REST kline row: `[openTime, open, high, low, close, volume, closeTime, ...]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KlineRow {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl KlineRow {
    pub fn parse(row: &Value) -> Result<Self> {
        let fields = row
            .as_array()
            .ok_or_else(|| invalid("kline row is not an array"))?;
        let open_time = fields
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| invalid("kline row has no open time"))?;

        Ok(Self {
            open_time,
            open: decimal_at(fields, 1)?,
            high: decimal_at(fields, 2)?,
            low: decimal_at(fields, 3)?,
            close: decimal_at(fields, 4)?,
            volume: decimal_at(fields, 5)?,
        })
    }
}

/// Deserialize a REST body, mapping failures to `InvalidResponse`
pub fn from_value<T: DeserializeOwned>(endpoint: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|err| ChartfeedError::InvalidResponse(format!("{endpoint}: {err}")))
}

fn decimal_at(fields: &[Value], index: usize) -> Result<Decimal> {
    let raw = fields
        .get(index)
        .ok_or_else(|| invalid(format!("kline row has no field {index}")))?;
    let parsed = match raw {
        Value::String(text) => Decimal::from_str(text).ok(),
        Value::Number(number) => Decimal::from_str(&number.to_string()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| invalid(format!("kline field {index} is not a decimal: {raw}")))
}

fn invalid(message: impl Into<String>) -> ChartfeedError {
    ChartfeedError::InvalidResponse(message.into())
}
