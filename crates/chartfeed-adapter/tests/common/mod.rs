/*
[INPUT]:  Test scenarios needing fake transports or mock servers
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for chartfeed-adapter tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chartfeed_adapter::{
    ChartfeedError, ControlMessage, MultiplexerConfig, ReconnectConfig, Result, StreamConnection,
    StreamTransport, TransportEvent,
};
use tokio::sync::mpsc;
use wiremock::MockServer;

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Server side of one fake connection
pub struct MockConnection {
    pub sent: mpsc::Receiver<String>,
    pub events: mpsc::Sender<TransportEvent>,
}

impl MockConnection {
    /// Next control message written by the multiplexer
    pub async fn next_control(&mut self) -> ControlMessage {
        let text = self.sent.recv().await.expect("connection still open");
        ControlMessage::parse(&text).expect("valid control message")
    }

    pub async fn push(&self, frame: serde_json::Value) {
        self.events
            .send(TransportEvent::Message(frame.to_string()))
            .await
            .expect("multiplexer listening");
    }

    pub async fn close(&self) {
        let _ = self.events.send(TransportEvent::Closed).await;
    }

    pub async fn error(&self, reason: &str) {
        let _ = self.events.send(TransportEvent::Error(reason.to_string())).await;
    }
}

/// In-memory StreamTransport handing each connection to the test
pub struct MockStreamTransport {
    connections: mpsc::UnboundedSender<MockConnection>,
    connect_count: AtomicUsize,
    failures_left: AtomicUsize,
}

impl MockStreamTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockConnection>) {
        Self::failing_first(0)
    }

    /// The first `failures` connect attempts are refused
    pub fn failing_first(failures: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<MockConnection>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            connections: tx,
            connect_count: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(failures),
        });
        (transport, rx)
    }

    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamTransport for MockStreamTransport {
    async fn connect(&self) -> Result<StreamConnection> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ChartfeedError::WebSocket("connection refused".to_string()));
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(64);
        let _ = self.connections.send(MockConnection {
            sent: outbound_rx,
            events: event_tx,
        });

        Ok(StreamConnection {
            outbound: outbound_tx,
            inbound: event_rx,
        })
    }
}

/// Deterministic timings: 1s pacing, 2s reconnect without jitter
pub fn test_config() -> MultiplexerConfig {
    MultiplexerConfig {
        send_interval: Duration::from_secs(1),
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        },
    }
}

pub fn subscribe_payload(params: &[&str], id: u64) -> String {
    serde_json::json!({ "method": "SUBSCRIBE", "params": params, "id": id }).to_string()
}
