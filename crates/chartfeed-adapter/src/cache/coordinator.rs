/*
[INPUT]:  Request descriptors and subscriber callbacks
[OUTPUT]: Single-flight, TTL-cached HTTP results pushed to the key's callback
[POS]:    Cache layer - request cache coordinator
[UPDATE]: When changing freshness, single-flight or notification rules
*/

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::cache::entry::{CacheEntry, FetchError};
use crate::cache::expiring::ExpiringCache;
use crate::cache::key::{CacheKey, RequestMethod};
use crate::http::HttpTransport;

/// Default staleness window
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Callback receiving every state change of one cache key
pub type CacheCallback = Arc<dyn Fn(&CacheEntry) + Send + Sync>;

/// Identifies one logical request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: RequestMethod,
    pub body: Option<Value>,
    /// Staleness window; a fetch older than this is redone on the next subscribe
    pub timeout: Duration,
    /// Bypass freshness and refetch on every subscribe
    pub disable: bool,
}

impl RequestDescriptor {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: RequestMethod::Get,
            body: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            disable: false,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: RequestMethod::Post,
            body: Some(body),
            ..Self::get(url)
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_disable(mut self, disable: bool) -> Self {
        self.disable = disable;
        self
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(
            self.method,
            &self.url,
            self.body.as_ref(),
            self.timeout,
            self.disable,
        )
    }
}

struct SubscriberSlot {
    descriptor: RequestDescriptor,
    callback: CacheCallback,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<CacheKey, SubscriberSlot>,
    entries: ExpiringCache<CacheKey, CacheEntry>,
}

impl CacheState {
    /// Store `entry`; its `updated_at` is the staleness clock of the slot.
    fn put(&mut self, key: CacheKey, entry: CacheEntry, ttl: Duration) {
        let updated_at = entry.updated_at;
        self.entries.insert_stamped(key, entry, ttl, updated_at);
    }
}

struct CacheInner {
    state: Mutex<CacheState>,
    transport: Arc<dyn HttpTransport>,
}

enum SubscribeAction {
    InFlight,
    Start,
    Bypass,
    Revalidate,
    Fresh,
}

/// Collapses identical requests into one cached, single-flight result per key.
///
/// Each key keeps exactly one callback: the one installed by the latest
/// `subscribe`. Fetch failures are stored in the entry, never returned.
#[derive(Clone)]
pub struct RequestCache {
    inner: Arc<CacheInner>,
}

impl fmt::Debug for RequestCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCache")
            .field("keys", &self.inner.state.lock().slots.len())
            .finish()
    }
}

impl RequestCache {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState::default()),
                transport,
            }),
        }
    }

    /// Register a request; equivalent descriptors share one observer.
    pub fn register(&self, descriptor: RequestDescriptor) -> CacheObserver {
        let key = descriptor.key();
        let mut state = self.inner.state.lock();

        if !state.slots.contains_key(&key) {
            debug!(%key, url = %descriptor.url, "cache key registered");
            state.slots.insert(
                key.clone(),
                SubscriberSlot {
                    descriptor,
                    callback: Arc::new(|_: &CacheEntry| {}),
                },
            );
        }

        CacheObserver {
            key,
            inner: self.inner.clone(),
        }
    }

    /// Snapshot of the entry for `key`
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.state.lock().entries.get(key).cloned()
    }

    /// Number of registered keys
    pub fn len(&self) -> usize {
        self.inner.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by [`RequestCache::register`]
#[derive(Clone)]
pub struct CacheObserver {
    key: CacheKey,
    inner: Arc<CacheInner>,
}

impl fmt::Debug for CacheObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheObserver").field("key", &self.key).finish()
    }
}

impl CacheObserver {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Install `callback` for this key and fetch if the entry is missing,
    /// stale or caching is disabled. A fresh entry is delivered right away.
    ///
    /// Outside a tokio runtime nothing is installed and nothing is fetched.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&CacheEntry) + Send + Sync + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            warn!(key = %self.key, "subscribe outside tokio runtime ignored");
            return;
        };
        let callback: CacheCallback = Arc::new(callback);

        let (notify, fetch) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            let Some(slot) = state.slots.get_mut(&self.key) else {
                warn!(key = %self.key, "subscribe on unknown cache key");
                return;
            };
            slot.callback = callback.clone();
            let descriptor = slot.descriptor.clone();

            let action = match state.entries.get(&self.key) {
                None => SubscribeAction::Start,
                Some(entry) if entry.calling => SubscribeAction::InFlight,
                Some(_) if descriptor.disable => SubscribeAction::Bypass,
                Some(_) if state.entries.is_stale(&self.key) => SubscribeAction::Revalidate,
                Some(_) => SubscribeAction::Fresh,
            };

            match action {
                SubscribeAction::InFlight => {
                    debug!(key = %self.key, "fetch already in flight");
                    return;
                }
                SubscribeAction::Start => {
                    let entry = CacheEntry::pending();
                    state.put(self.key.clone(), entry.clone(), descriptor.timeout);
                    (entry, Some(descriptor))
                }
                SubscribeAction::Bypass => {
                    let Some(entry) = state.entries.get_mut(&self.key) else {
                        return;
                    };
                    entry.calling = true;
                    (entry.clone(), Some(descriptor))
                }
                SubscribeAction::Revalidate => {
                    let Some(entry) = state.entries.get(&self.key).map(CacheEntry::revalidating)
                    else {
                        return;
                    };
                    state.put(self.key.clone(), entry.clone(), descriptor.timeout);
                    (entry, Some(descriptor))
                }
                SubscribeAction::Fresh => {
                    let Some(entry) = state.entries.get(&self.key).cloned() else {
                        return;
                    };
                    let age = state.entries.age(&self.key).unwrap_or_default();
                    debug!(key = %self.key, age_ms = age.as_millis() as u64, "serving fresh entry");
                    (entry, None)
                }
            }
        };

        callback(&notify);

        if let Some(descriptor) = fetch {
            spawn_fetch(&runtime, self.inner.clone(), self.key.clone(), descriptor);
        }
    }
}

/// Fetch in the background and settle the entry whatever happens.
///
/// The transport call runs in its own task so a panic inside it still
/// settles the key as a failure instead of leaving it in flight.
fn spawn_fetch(
    runtime: &Handle,
    inner: Arc<CacheInner>,
    key: CacheKey,
    descriptor: RequestDescriptor,
) {
    runtime.spawn(async move {
        debug!(%key, method = %descriptor.method, url = %descriptor.url, "fetch started");

        let request = {
            let transport = inner.transport.clone();
            let descriptor = descriptor.clone();
            tokio::spawn(async move {
                match descriptor.method {
                    RequestMethod::Get => transport.get(&descriptor.url).await,
                    RequestMethod::Post => {
                        transport
                            .post(&descriptor.url, descriptor.body.as_ref())
                            .await
                    }
                }
            })
        };

        let entry = match request.await {
            Ok(Ok(response)) => CacheEntry::success(response),
            Ok(Err(err)) => {
                warn!(%key, url = %descriptor.url, error = %err, "fetch failed");
                CacheEntry::failure(FetchError::from(&err))
            }
            Err(err) => {
                warn!(%key, url = %descriptor.url, error = %err, "fetch task aborted");
                CacheEntry::failure(FetchError {
                    message: format!("fetch aborted: {err}"),
                    status: None,
                })
            }
        };

        let callback = {
            let mut state = inner.state.lock();
            state.put(key.clone(), entry.clone(), descriptor.timeout);
            state.slots.get(&key).map(|slot| slot.callback.clone())
        };

        if let Some(callback) = callback {
            callback(&entry);
        }
    });
}
