/*
[INPUT]:  WebSocket URL
[OUTPUT]: Live StreamConnection backed by a tokio-tungstenite socket task
[POS]:    WebSocket layer - real-time data stream handling
[UPDATE]: When changing frame handling or connection logic
*/

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::http::{ChartfeedError, Result};
use crate::ws::transport::{StreamConnection, StreamTransport, TransportEvent};

/// Binance combined stream endpoint
pub const DEFAULT_STREAM_URL: &str = "wss://stream.binance.com/stream";
const CHANNEL_CAPACITY: usize = 256;
const FRAME_LOG_LIMIT: usize = 10;
const RAW_LOG_MAX_BYTES: usize = 1024;

static FRAME_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

/// tokio-tungstenite implementation of [`StreamTransport`]
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_URL)
    }
}

#[async_trait]
impl StreamTransport for WsTransport {
    async fn connect(&self) -> Result<StreamConnection> {
        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|err| ChartfeedError::WebSocket(err.to_string()))?;
        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(CHANNEL_CAPACITY);

        info!(url = %self.url, "ws connected");

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = outbound_rx.recv() => {
                        match outbound {
                            Some(text) => {
                                log_frame_sent(&text);
                                if let Err(err) = write.send(WsMessage::Text(text.into())).await {
                                    let _ = event_tx.send(TransportEvent::Error(err.to_string())).await;
                                    break;
                                }
                            }
                            None => {
                                let _ = write.send(WsMessage::Close(None)).await;
                                break;
                            }
                        }
                    }
                    incoming = read.next() => {
                        let event = match incoming {
                            Some(Ok(WsMessage::Close(_))) => {
                                let _ = write.send(WsMessage::Close(None)).await;
                                let _ = event_tx.send(TransportEvent::Closed).await;
                                break;
                            }
                            Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => continue,
                            Some(Ok(WsMessage::Frame(_))) => continue,
                            Some(Ok(WsMessage::Text(text))) => TransportEvent::Message(text.to_string()),
                            Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                                Ok(text) => TransportEvent::Message(text),
                                Err(_) => {
                                    debug!(bytes = bytes.len(), "ws binary frame is not utf-8");
                                    continue;
                                }
                            },
                            Some(Err(err)) => {
                                warn!(error = %err, "ws read failed");
                                let _ = event_tx.send(TransportEvent::Error(err.to_string())).await;
                                break;
                            }
                            None => {
                                let _ = event_tx.send(TransportEvent::Closed).await;
                                break;
                            }
                        };

                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                }
            }

            debug!("ws socket task finished");
        });

        Ok(StreamConnection {
            outbound: outbound_tx,
            inbound: event_rx,
        })
    }
}

fn log_frame_sent(text: &str) {
    let count = FRAME_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count >= FRAME_LOG_LIMIT {
        return;
    }

    let preview = truncate_for_log(text, RAW_LOG_MAX_BYTES);
    info!(
        sample_index = count + 1,
        sample_limit = FRAME_LOG_LIMIT,
        message = %preview,
        "ws frame sent"
    );
}

pub(crate) fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut cut = max_len;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = String::with_capacity(cut + 3);
    out.push_str(&value[..cut]);
    out.push_str("...");
    out
}
