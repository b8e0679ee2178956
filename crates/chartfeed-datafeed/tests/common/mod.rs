/*
[INPUT]:  Datafeed test scenarios needing REST mocks or a scripted stream
[OUTPUT]: Shared fixtures and a datafeed wired to fake endpoints
[POS]:    Test infrastructure - shared across datafeed test modules
[UPDATE]: When adding new test patterns or fixtures
*/

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chartfeed_adapter::{
    ClientConfig, ControlMessage, HttpClient, Multiplexer, MultiplexerConfig, ReconnectConfig,
    RequestCache, Result, StreamConnection, StreamTransport, TransportEvent,
};
use chartfeed_datafeed::{BinanceDatafeed, DatafeedOptions};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use wiremock::MockServer;

/// Server side of one scripted stream connection
pub struct ScriptedConnection {
    pub sent: mpsc::Receiver<String>,
    pub events: mpsc::Sender<TransportEvent>,
}

impl ScriptedConnection {
    pub async fn next_control(&mut self) -> ControlMessage {
        let text = self.sent.recv().await.expect("connection still open");
        ControlMessage::parse(&text).expect("valid control message")
    }

    /// Push a combined-stream frame `{stream, data}`
    pub async fn push(&self, stream: &str, data: Value) {
        let frame = json!({ "stream": stream, "data": data });
        self.events
            .send(TransportEvent::Message(frame.to_string()))
            .await
            .expect("multiplexer listening");
    }
}

/// StreamTransport handing every new connection to the test
pub struct ScriptedTransport {
    connections: mpsc::UnboundedSender<ScriptedConnection>,
}

impl ScriptedTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ScriptedConnection>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { connections: tx }), rx)
    }
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn connect(&self) -> Result<StreamConnection> {
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(64);
        let _ = self.connections.send(ScriptedConnection {
            sent: outbound_rx,
            events: event_tx,
        });
        Ok(StreamConnection {
            outbound: outbound_tx,
            inbound: event_rx,
        })
    }
}

pub fn test_multiplexer_config() -> MultiplexerConfig {
    MultiplexerConfig {
        send_interval: Duration::from_secs(1),
        reconnect: ReconnectConfig {
            jitter_factor: 0.0,
            ..ReconnectConfig::default()
        },
    }
}

/// Datafeed whose REST calls go to `rest_base_url` and whose stream is scripted
pub fn datafeed_for(
    rest_base_url: &str,
) -> (BinanceDatafeed, mpsc::UnboundedReceiver<ScriptedConnection>) {
    let http = HttpClient::with_config(ClientConfig::default(), rest_base_url).expect("http client");
    let (transport, connections) = ScriptedTransport::new();
    let multiplexer = Arc::new(Multiplexer::new(transport, test_multiplexer_config()));
    let datafeed = BinanceDatafeed::new(
        multiplexer,
        RequestCache::new(Arc::new(http)),
        DatafeedOptions::default(),
    );
    (datafeed, connections)
}

pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

pub fn exchange_info() -> Value {
    json!({
        "timezone": "UTC",
        "serverTime": 1_700_000_000_000i64,
        "symbols": [
            {
                "symbol": "BTCUSDT",
                "status": "TRADING",
                "baseAsset": "BTC",
                "quoteAsset": "USDT",
                "filters": [
                    { "filterType": "PRICE_FILTER", "minPrice": "0.01", "maxPrice": "1000000", "tickSize": "0.01000000" },
                    { "filterType": "LOT_SIZE", "minQty": "0.00001", "maxQty": "9000", "stepSize": "0.00001" }
                ]
            },
            {
                "symbol": "SHIBUSDT",
                "status": "TRADING",
                "baseAsset": "SHIB",
                "quoteAsset": "USDT",
                "filters": [
                    { "filterType": "PRICE_FILTER", "tickSize": "0.00000001" }
                ]
            }
        ]
    })
}

/// `count` consecutive one-minute kline rows starting at `open_time`
pub fn kline_rows(open_time: i64, count: usize) -> Value {
    let rows: Vec<Value> = (0..count as i64)
        .map(|i| {
            let t = open_time + i * 60_000;
            json!([t, "100.0", "110.0", "90.0", "105.0", "1.5", t + 59_999, "157.5", 10, "0.7", "73.5", "0"])
        })
        .collect();
    Value::Array(rows)
}

pub fn kline_event(symbol: &str, interval: &str, open_time: i64, close: &str) -> Value {
    json!({
        "e": "kline",
        "E": open_time + 1,
        "s": symbol,
        "k": {
            "t": open_time, "T": open_time + 59_999, "s": symbol, "i": interval,
            "o": "100", "c": close, "h": "110", "l": "90", "v": "12", "x": false
        }
    })
}

pub fn ticker_event(symbol: &str, last: &str) -> Value {
    json!({
        "e": "24hrTicker", "E": 1, "s": symbol,
        "p": "5", "P": "0.5", "c": last, "b": "99.9", "a": "100.1",
        "o": "95", "h": "120", "l": "90", "v": "1000"
    })
}
