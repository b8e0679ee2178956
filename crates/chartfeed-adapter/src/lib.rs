/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public chartfeed adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod cache;
pub mod http;
pub mod multiplexer;
pub mod store;
pub mod timers;
pub mod ws;

// Re-export commonly used types from cache
pub use cache::{
    CacheEntry,
    CacheKey,
    CacheObserver,
    ExpiringCache,
    FetchError,
    RequestCache,
    RequestDescriptor,
    RequestMethod,
};

// Re-export commonly used types from http
pub use http::{
    ChartfeedError,
    ClientConfig,
    HttpClient,
    HttpTransport,
    Result,
};

// Re-export commonly used types from multiplexer
pub use multiplexer::{
    ConnectionState,
    Multiplexer,
    MultiplexerConfig,
    ReconnectConfig,
    SubscriberHandle,
};

pub use store::{SymbolState, SymbolStateStore};

// Re-export commonly used types from ws
pub use ws::{
    ControlMessage,
    StreamConnection,
    StreamMessage,
    StreamTransport,
    TransportEvent,
    WsTransport,
};
