/*
[INPUT]:  Request URL and optional JSON body
[OUTPUT]: Decoded JSON response body or transport error
[POS]:    HTTP layer - transport seam used by the request cache
[UPDATE]: When adding HTTP methods the cache can issue
*/

use async_trait::async_trait;
use serde_json::Value;

use crate::http::Result;

/// Request/response transport injected into [`crate::cache::RequestCache`].
///
/// Both calls fail on network errors and on non-2xx responses.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn get(&self, url: &str) -> Result<Value>;

    async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value>;
}
