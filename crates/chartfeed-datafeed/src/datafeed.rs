/*
[INPUT]:  Shared Multiplexer + RequestCache, Binance REST and stream payloads
[OUTPUT]: Chart datafeed operations (config, symbols, history, quotes, live bars)
[POS]:    Datafeed - the object the charting widget talks to
[UPDATE]: When adding datafeed operations or changing request shapes
*/

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chartfeed_adapter::{
    CacheEntry, ChartfeedError, ControlMessage, Multiplexer, RequestCache, RequestDescriptor,
    Result, StreamMessage,
};

use crate::binance::{
    self, EXCHANGE_INFO_PATH, ExchangeInfo, ExchangeSymbol, KLINE_EVENT, KLINES_PAGE_LIMIT,
    KLINES_PATH, KlineEvent, KlineRow, SERVER_TIME_PATH, ServerTime, TICKER_24H_PATH,
    TICKER_EVENT, Ticker24h, TickerEvent,
};
use crate::models::{Bar, BarsResult, DatafeedConfiguration, QuoteResult, QuoteValues, SymbolInfo};
use crate::resolution::interval_for;

/// Poll step while another caller owns the callback of an in-flight key
const SUPERSEDED_POLL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, PartialEq)]
pub struct DatafeedOptions {
    /// Log raw REST payload sizes
    pub debug: bool,
    /// Freshness window of cached exchange info and history pages
    pub cache_timeout: Duration,
}

impl Default for DatafeedOptions {
    fn default() -> Self {
        Self {
            debug: false,
            cache_timeout: Duration::from_secs(60),
        }
    }
}

/// Binance-backed chart datafeed.
///
/// Streams go through the shared [`Multiplexer`]; REST calls go through the
/// [`RequestCache`] so identical requests within the freshness window hit the
/// network once.
pub struct BinanceDatafeed {
    multiplexer: Arc<Multiplexer>,
    cache: RequestCache,
    options: DatafeedOptions,
    symbols: RwLock<HashMap<String, ExchangeSymbol>>,
    next_request_id: AtomicU64,
}

impl std::fmt::Debug for BinanceDatafeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceDatafeed")
            .field("symbols", &self.symbols.read().len())
            .field("options", &self.options)
            .finish()
    }
}

impl BinanceDatafeed {
    pub fn new(multiplexer: Arc<Multiplexer>, cache: RequestCache, options: DatafeedOptions) -> Self {
        Self {
            multiplexer,
            cache,
            options,
            symbols: RwLock::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Connect the stream and load the symbol table.
    pub async fn on_ready(&self) -> Result<DatafeedConfiguration> {
        self.multiplexer.connect();

        let descriptor =
            RequestDescriptor::get(EXCHANGE_INFO_PATH).with_timeout(self.options.cache_timeout);
        let body = self.fetch(descriptor).await?;
        let info: ExchangeInfo = binance::from_value(EXCHANGE_INFO_PATH, body)?;

        let table: HashMap<String, ExchangeSymbol> = info
            .symbols
            .into_iter()
            .map(|symbol| (symbol.symbol.clone(), symbol))
            .collect();
        info!(symbols = table.len(), "exchange info loaded");
        *self.symbols.write() = table;

        Ok(DatafeedConfiguration::default())
    }

    /// Resolve `EXCHANGE:SYMBOL` or `symbol` against the loaded symbol table.
    pub fn resolve_symbol(&self, name: &str) -> Result<SymbolInfo> {
        let bare = name.split(':').nth(1).unwrap_or(name).to_uppercase();
        if self.options.debug {
            debug!(requested = %name, symbol = %bare, "resolve symbol");
        }

        self.symbols
            .read()
            .get(&bare)
            .map(SymbolInfo::from)
            .ok_or_else(|| ChartfeedError::InvalidResponse("not found".to_string()))
    }

    /// History between two unix-second bounds, paged 500 klines at a time.
    pub async fn get_bars(
        &self,
        symbol: &str,
        resolution: &str,
        from_secs: i64,
        to_secs: i64,
    ) -> Result<BarsResult> {
        let interval = interval_for(resolution)
            .ok_or_else(|| ChartfeedError::InvalidRequest(format!("invalid resolution {resolution}")))?;
        let symbol = symbol.to_uppercase();
        let end = to_secs.saturating_mul(1000);
        let mut start = from_secs.saturating_mul(1000);
        let mut bars = Vec::new();

        loop {
            let url = format!(
                "{KLINES_PATH}?symbol={symbol}&interval={interval}&limit={KLINES_PAGE_LIMIT}&startTime={start}&endTime={end}"
            );
            let body = self
                .fetch(RequestDescriptor::get(url).with_timeout(self.options.cache_timeout))
                .await?;
            let rows = body.as_array().ok_or_else(|| {
                ChartfeedError::InvalidResponse(format!("{KLINES_PATH}: expected an array"))
            })?;

            let page = rows
                .iter()
                .map(KlineRow::parse)
                .collect::<Result<Vec<_>>>()?;
            let page_len = page.len();
            let last_open = page.last().map(|row| row.open_time);
            bars.extend(page.into_iter().map(Bar::from));

            match last_open {
                Some(open_time) if page_len == KLINES_PAGE_LIMIT => start = open_time + 1,
                _ => break,
            }
        }

        if self.options.debug {
            debug!(%symbol, interval, bars = bars.len(), "history loaded");
        }
        Ok(BarsResult::new(bars))
    }

    /// One-shot 24h quotes; unknown symbols come back as errors.
    pub async fn get_quotes(&self, symbols: &[String]) -> Result<Vec<QuoteResult>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let query = symbols
            .iter()
            .map(|symbol| format!("\"{}\"", symbol.to_uppercase()))
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{TICKER_24H_PATH}?symbols=[{query}]");
        let body = self
            .fetch(RequestDescriptor::get(url).with_disable(true))
            .await?;
        let tickers: Vec<Ticker24h> = binance::from_value(TICKER_24H_PATH, body)?;

        Ok(symbols
            .iter()
            .map(|name| {
                let upper = name.to_uppercase();
                match tickers.iter().find(|ticker| ticker.symbol == upper) {
                    Some(ticker) => QuoteResult::Ok {
                        name: name.clone(),
                        values: QuoteValues::from_ticker(name, ticker),
                    },
                    None => QuoteResult::Error { name: name.clone() },
                }
            })
            .collect())
    }

    /// Stream `<symbol>@ticker` updates of `symbols` to `callback`.
    pub fn subscribe_quotes<F>(&self, symbols: &[String], listener_id: &str, callback: F) -> Result<()>
    where
        F: Fn(Vec<QuoteResult>) + Send + Sync + 'static,
    {
        let params: Vec<String> = symbols
            .iter()
            .map(|symbol| format!("{}@ticker", symbol.to_lowercase()))
            .collect();
        let wanted: Vec<String> = symbols.iter().map(|symbol| symbol.to_uppercase()).collect();

        let handle = self.multiplexer.add_subscriber(listener_id, params.clone());
        handle.subscribe(move |message: &StreamMessage| {
            if message.event_type() != Some(TICKER_EVENT) {
                return;
            }
            let Some(event) = parse_event::<TickerEvent>(message) else {
                return;
            };
            if !wanted.contains(&event.symbol) {
                return;
            }
            callback(vec![QuoteResult::Ok {
                name: event.symbol.clone(),
                values: QuoteValues::from(&event),
            }]);
        });

        handle.send(&self.subscribe_payload(params)?);
        info!(listener = %listener_id, symbols = symbols.len(), "quotes subscribed");
        Ok(())
    }

    /// Stream live bars of `symbol` at `resolution` to `callback`.
    ///
    /// Bars older than the last delivered one are dropped; an update of the
    /// current bar is delivered again.
    pub fn subscribe_bars<F>(
        &self,
        symbol: &str,
        resolution: &str,
        listener_id: &str,
        callback: F,
    ) -> Result<()>
    where
        F: Fn(Bar) + Send + Sync + 'static,
    {
        let interval = interval_for(resolution)
            .ok_or_else(|| ChartfeedError::InvalidRequest(format!("invalid resolution {resolution}")))?;
        let symbol = symbol.to_uppercase();
        let params = vec![format!("{}@kline_{interval}", symbol.to_lowercase())];

        let last_bar_time: Mutex<Option<i64>> = Mutex::new(None);
        let handle = self.multiplexer.add_subscriber(listener_id, params.clone());
        let target = symbol.clone();
        handle.subscribe(move |message: &StreamMessage| {
            if message.event_type() != Some(KLINE_EVENT) {
                return;
            }
            let Some(event) = parse_event::<KlineEvent>(message) else {
                return;
            };
            if event.kline.interval != interval || event.kline.symbol != target {
                return;
            }

            let bar = Bar::from(&event.kline);
            let deliver = {
                let mut last = last_bar_time.lock();
                let newer = last.is_none_or(|time| bar.time >= time);
                if newer {
                    *last = Some(bar.time);
                }
                newer
            };
            if deliver {
                callback(bar);
            }
        });

        handle.send(&self.subscribe_payload(params)?);
        info!(listener = %listener_id, %symbol, interval, "bars subscribed");
        Ok(())
    }

    pub fn unsubscribe_quotes(&self, listener_id: &str) -> bool {
        self.multiplexer.unsubscribe(listener_id)
    }

    pub fn unsubscribe_bars(&self, listener_id: &str) -> bool {
        self.multiplexer.unsubscribe(listener_id)
    }

    /// Exchange clock in unix seconds.
    pub async fn get_server_time(&self) -> Result<i64> {
        let body = self
            .fetch(RequestDescriptor::get(SERVER_TIME_PATH).with_disable(true))
            .await?;
        let time: ServerTime = binance::from_value(SERVER_TIME_PATH, body)?;
        Ok(time.server_time.div_euclid(1000))
    }

    pub fn multiplexer(&self) -> &Arc<Multiplexer> {
        &self.multiplexer
    }

    fn subscribe_payload(&self, params: Vec<String>) -> Result<String> {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        ControlMessage::subscribe(params, id).to_text()
    }

    /// Run `descriptor` through the cache and wait for it to settle.
    async fn fetch(&self, descriptor: RequestDescriptor) -> Result<Value> {
        let url = descriptor.url.clone();
        let observer = self.cache.register(descriptor);
        let (entry_tx, mut entry_rx) = mpsc::unbounded_channel();
        observer.subscribe(move |entry: &CacheEntry| {
            let _ = entry_tx.send(entry.clone());
        });

        while let Some(entry) = entry_rx.recv().await {
            if !entry.calling {
                if self.options.debug {
                    debug!(%url, has_error = entry.has_error, "request settled");
                }
                return entry.into_result();
            }
        }

        // A later subscriber on the same key took over the callback.
        loop {
            match self.cache.entry(observer.key()) {
                Some(entry) if !entry.calling => return entry.into_result(),
                Some(_) => tokio::time::sleep(SUPERSEDED_POLL).await,
                None => {
                    warn!(%url, "cache entry vanished while waiting");
                    return Err(ChartfeedError::InvalidResponse(format!("{url}: no cache entry")));
                }
            }
        }
    }
}

fn parse_event<T: serde::de::DeserializeOwned>(message: &StreamMessage) -> Option<T> {
    let payload = message.payload()?;
    match serde_json::from_value(payload.clone()) {
        Ok(event) => Some(event),
        Err(err) => {
            debug!(stream = message.stream().unwrap_or("-"), error = %err, "stream event ignored");
            None
        }
    }
}
