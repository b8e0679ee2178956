/*
[INPUT]:  Parsed Binance payloads
[OUTPUT]: Chart-facing bars, quotes and symbol descriptions
[POS]:    Datafeed - values handed to the charting widget
[UPDATE]: When the chart-facing shapes change
*/

use rust_decimal::Decimal;
use serde::Serialize;

use crate::binance::{ExchangeSymbol, KlinePayload, KlineRow, Ticker24h, TickerEvent};
use crate::resolution::SUPPORTED_RESOLUTIONS;

pub const EXCHANGE_NAME: &str = "Binance";

/// Answer of `on_ready`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatafeedConfiguration {
    pub supports_marks: bool,
    pub supports_timescale_marks: bool,
    pub supports_time: bool,
    pub supported_resolutions: Vec<String>,
}

impl Default for DatafeedConfiguration {
    fn default() -> Self {
        Self {
            supports_marks: false,
            supports_timescale_marks: false,
            supports_time: true,
            supported_resolutions: SUPPORTED_RESOLUTIONS.iter().map(|r| r.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolInfo {
    pub name: String,
    pub full_name: String,
    pub ticker: String,
    pub description: String,
    pub exchange: String,
    pub listed_exchange: String,
    #[serde(rename = "type")]
    pub symbol_type: String,
    pub session: String,
    pub format: String,
    pub timezone: String,
    pub minmov: u32,
    pub pricescale: u64,
    pub has_intraday: bool,
    pub has_daily: bool,
    pub has_weekly_and_monthly: bool,
    pub currency_code: String,
}

impl From<&ExchangeSymbol> for SymbolInfo {
    fn from(symbol: &ExchangeSymbol) -> Self {
        Self {
            name: symbol.symbol.clone(),
            full_name: symbol.symbol.clone(),
            ticker: symbol.symbol.clone(),
            description: format!("{} / {}", symbol.base_asset, symbol.quote_asset),
            exchange: EXCHANGE_NAME.to_string(),
            listed_exchange: EXCHANGE_NAME.to_string(),
            symbol_type: "crypto".to_string(),
            session: "24x7".to_string(),
            format: "price".to_string(),
            timezone: "UTC".to_string(),
            minmov: 1,
            pricescale: symbol.pricescale(),
            has_intraday: true,
            has_daily: true,
            has_weekly_and_monthly: true,
            currency_code: symbol.quote_asset.clone(),
        }
    }
}

/// OHLCV bar; `time` is the open time in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bar {
    pub time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl From<KlineRow> for Bar {
    fn from(row: KlineRow) -> Self {
        Self {
            time: row.open_time,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        }
    }
}

impl From<&KlinePayload> for Bar {
    fn from(kline: &KlinePayload) -> Self {
        Self {
            time: kline.open_time,
            open: kline.open,
            high: kline.high,
            low: kline.low,
            close: kline.close,
            volume: kline.volume,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BarsResult {
    pub bars: Vec<Bar>,
    pub no_data: bool,
}

impl BarsResult {
    pub fn new(bars: Vec<Bar>) -> Self {
        let no_data = bars.is_empty();
        Self { bars, no_data }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuoteValues {
    pub ch: Decimal,
    pub chp: Decimal,
    pub short_name: String,
    pub exchange: String,
    pub original_name: String,
    pub description: String,
    pub lp: Decimal,
    pub ask: Decimal,
    pub bid: Decimal,
    pub spread: Decimal,
    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_close_price: Option<Decimal>,
    pub volume: Decimal,
}

impl QuoteValues {
    /// From a REST ticker, labelled with the name the caller asked for.
    pub fn from_ticker(name: &str, ticker: &Ticker24h) -> Self {
        Self {
            ch: ticker.price_change,
            chp: ticker.price_change_percent,
            short_name: name.to_string(),
            exchange: EXCHANGE_NAME.to_string(),
            original_name: name.to_string(),
            description: name.to_string(),
            lp: ticker.last_price,
            ask: ticker.ask_price,
            bid: ticker.bid_price,
            spread: ticker.ask_price - ticker.bid_price,
            open_price: ticker.open_price,
            high_price: ticker.high_price,
            low_price: ticker.low_price,
            prev_close_price: Some(ticker.prev_close_price),
            volume: ticker.volume,
        }
    }
}

impl From<&TickerEvent> for QuoteValues {
    fn from(event: &TickerEvent) -> Self {
        Self {
            ch: event.price_change,
            chp: event.price_change_percent,
            short_name: event.symbol.clone(),
            exchange: EXCHANGE_NAME.to_string(),
            original_name: event.symbol.clone(),
            description: event.symbol.clone(),
            lp: event.last_price,
            ask: event.ask_price,
            bid: event.bid_price,
            spread: event.ask_price - event.bid_price,
            open_price: event.open_price,
            high_price: event.high_price,
            low_price: event.low_price,
            prev_close_price: None,
            volume: event.volume,
        }
    }
}

/// Per-symbol quote answer: `{"s":"ok","n":..,"v":..}` or `{"s":"error","n":..}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "s", rename_all = "lowercase")]
pub enum QuoteResult {
    Ok {
        #[serde(rename = "n")]
        name: String,
        #[serde(rename = "v")]
        values: QuoteValues,
    },
    Error {
        #[serde(rename = "n")]
        name: String,
    },
}

impl QuoteResult {
    pub fn name(&self) -> &str {
        match self {
            Self::Ok { name, .. } | Self::Error { name } => name,
        }
    }
}
