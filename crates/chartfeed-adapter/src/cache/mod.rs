/*
[INPUT]:  Request descriptors and an injected HttpTransport
[OUTPUT]: Cached, single-flight request results
[POS]:    Cache layer - request/response data path
[UPDATE]: When adding cache primitives or changing exports
*/

pub mod coordinator;
pub mod entry;
pub mod expiring;
pub mod key;

pub use coordinator::{CacheCallback, CacheObserver, DEFAULT_REQUEST_TIMEOUT, RequestCache, RequestDescriptor};
pub use entry::{CacheEntry, FetchError, is_empty_value};
pub use expiring::ExpiringCache;
pub use key::{CacheKey, RequestMethod};
