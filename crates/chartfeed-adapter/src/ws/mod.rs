/*
[INPUT]:  WebSocket configuration and control payloads
[OUTPUT]: Stream transport, typed control and inbound messages
[POS]:    WebSocket layer - real-time data streams
[UPDATE]: When adding new frame types or changing connection logic
*/

pub mod client;
pub mod message;
pub mod transport;

pub use client::WsTransport;
pub use message::{ControlMessage, ControlMethod, StreamMessage};
pub use transport::{StreamConnection, StreamTransport, TransportEvent};
