/*
[INPUT]:  HTTP client configuration and API endpoints
[OUTPUT]: JSON responses behind the HttpTransport trait
[POS]:    HTTP layer - REST API communication
[UPDATE]: When adding new transports or changing client behavior
*/

pub mod client;
pub mod error;
pub mod transport;

pub use error::{ChartfeedError, Result};
pub use transport::HttpTransport;

pub use client::{ClientConfig, HttpClient};
