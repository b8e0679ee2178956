/*
[INPUT]:  Connect requests from the multiplexer worker
[OUTPUT]: One live connection as an outbound sender + inbound event receiver
[POS]:    WebSocket layer - transport seam owned by the multiplexer
[UPDATE]: When the connection event contract changes
*/

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::http::Result;

/// Events reported by a live connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(String),
    Error(String),
    Closed,
}

/// A live connection. Dropping `outbound` closes it.
#[derive(Debug)]
pub struct StreamConnection {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Streaming transport driven exclusively by [`crate::multiplexer::Multiplexer`].
#[async_trait]
pub trait StreamTransport: Send + Sync + 'static {
    async fn connect(&self) -> Result<StreamConnection>;
}
