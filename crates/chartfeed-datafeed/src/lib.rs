/*
[INPUT]:  Public API exports for chartfeed-datafeed crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod binance;
pub mod config;
pub mod datafeed;
pub mod models;
pub mod resolution;

// Re-export main types for convenience
pub use config::{DatafeedConfig, ReconnectSettings, WatchConfig};
pub use datafeed::{BinanceDatafeed, DatafeedOptions};
pub use models::{Bar, BarsResult, DatafeedConfiguration, QuoteResult, QuoteValues, SymbolInfo};
pub use resolution::{SUPPORTED_RESOLUTIONS, interval_for};
