/*
[INPUT]:  Subscriber registrations, SUBSCRIBE payloads, one StreamTransport
[OUTPUT]: One physical connection fanned out to many subscribers + symbol state
[POS]:    Multiplexer - shared streaming channel for every UI consumer
[UPDATE]: When changing dedup, pacing, fan-out or reconnect semantics
*/

//! Connection multiplexer.
//!
//! Registry, requested params, outbound queue and symbol store sit behind one
//! mutex; the physical connection lives only inside the worker task started by
//! [`Multiplexer::connect`]. Callbacks are invoked outside the lock.

pub mod reconnect;
mod worker;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::http::ChartfeedError;
use crate::store::{SymbolState, SymbolStateStore};
use crate::ws::client::truncate_for_log;
use crate::ws::{ControlMessage, StreamMessage, StreamTransport};

pub use reconnect::{ReconnectConfig, ReconnectPolicy};

const MESSAGE_SAMPLE_LIMIT: usize = 3;
const PARSE_FAIL_LOG_LIMIT: usize = 3;
const RAW_LOG_MAX_BYTES: usize = 1024;

static MESSAGE_SAMPLE_COUNT: AtomicUsize = AtomicUsize::new(0);
static PARSE_FAIL_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Callback receiving every inbound stream message
pub type StreamCallback = Arc<dyn Fn(&StreamMessage) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Multiplexer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MultiplexerConfig {
    /// Pace of outbound control messages once open
    pub send_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_secs(1),
            reconnect: ReconnectConfig::default(),
        }
    }
}

struct Subscriber {
    params: Vec<String>,
    callback: StreamCallback,
}

#[derive(Default)]
struct Registry {
    subscribers: IndexMap<String, Subscriber>,
    global_params: IndexSet<String>,
    outbound: VecDeque<ControlMessage>,
    store: SymbolStateStore,
}

struct MuxInner {
    registry: Mutex<Registry>,
    transport: Arc<dyn StreamTransport>,
    config: MultiplexerConfig,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    next_request_id: AtomicU64,
}

impl MuxInner {
    fn send(&self, payload: &str) {
        match ControlMessage::parse(payload) {
            Ok(message) => self.enqueue(message),
            Err(err) => {
                let preview = truncate_for_log(payload, RAW_LOG_MAX_BYTES);
                warn!(error = %err, payload = %preview, "dropping malformed control payload");
            }
        }
    }

    /// Keep only params never requested before; enqueue if any remain.
    fn enqueue(&self, mut message: ControlMessage) {
        let mut registry = self.registry.lock();

        let mut fresh = Vec::with_capacity(message.params.len());
        for param in message.params.drain(..) {
            if registry.global_params.insert(param.clone()) {
                fresh.push(param);
            }
        }

        if fresh.is_empty() {
            debug!(id = message.id, "control message carries no new params");
            return;
        }

        debug!(id = message.id, params = ?fresh, "control message queued");
        message.params = fresh;
        registry.outbound.push_back(message);
    }

    fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Put every requested param not already waiting in the queue at its head.
    fn queue_resubscribe(&self, generation: u64) {
        let mut registry = self.registry.lock();

        let missing: Vec<String> = {
            let pending: HashSet<&String> = registry
                .outbound
                .iter()
                .flat_map(|message| message.params.iter())
                .collect();
            registry
                .global_params
                .iter()
                .filter(|param| !pending.contains(param))
                .cloned()
                .collect()
        };

        if missing.is_empty() {
            return;
        }

        info!(generation, params = missing.len(), "re-requesting subscriptions on new connection");
        let message = ControlMessage::subscribe(missing, self.next_request_id());
        registry.outbound.push_front(message);
    }

    fn pop_outbound(&self) -> Option<ControlMessage> {
        self.registry.lock().outbound.pop_front()
    }

    fn requeue_front(&self, message: ControlMessage) {
        self.registry.lock().outbound.push_front(message);
    }

    /// Update symbol state, then fan out in registration order.
    fn dispatch(&self, text: &str) {
        let message = match StreamMessage::parse(text) {
            Ok(message) => message,
            Err(err) => {
                log_parse_fail_once(&err, text);
                return;
            }
        };
        log_message_sample_once(&message);

        let callbacks: Vec<(String, StreamCallback)> = {
            let mut registry = self.registry.lock();
            if let (Some(symbol), Some(Value::Object(payload))) = (message.symbol(), message.payload())
            {
                registry.store.update(symbol, payload);
            }
            registry
                .subscribers
                .iter()
                .map(|(id, subscriber)| (id.clone(), subscriber.callback.clone()))
                .collect()
        };

        for (id, callback) in callbacks {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&message)));
            if let Err(payload) = outcome {
                warn!(subscriber = %id, panic = %panic_message(payload.as_ref()), "subscriber callback panicked");
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }
}

/// Owner of the single streaming connection.
///
/// Construct once and share by `Arc`; dropping it shuts the worker down.
pub struct Multiplexer {
    inner: Arc<MuxInner>,
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("state", &*self.inner.state_tx.borrow())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Multiplexer {
    pub fn new(transport: Arc<dyn StreamTransport>, config: MultiplexerConfig) -> Self {
        let (state_tx, _rx) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(MuxInner {
                registry: Mutex::new(Registry::default()),
                transport,
                config,
                state_tx,
                shutdown: CancellationToken::new(),
                worker: Mutex::new(None),
                next_request_id: AtomicU64::new(1),
            }),
        }
    }

    /// Start the connection worker. No-op while one is running.
    pub fn connect(&self) {
        let mut worker = self.inner.worker.lock();

        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("multiplexer already connecting or open");
            return;
        }

        if self.inner.shutdown.is_cancelled() {
            warn!("multiplexer is shut down; connect ignored");
            return;
        }

        if tokio::runtime::Handle::try_current().is_err() {
            warn!("multiplexer connect called without Tokio runtime; worker not started");
            return;
        }

        let inner = self.inner.clone();
        *worker = Some(tokio::spawn(worker::ConnectionWorker::new(inner).run()));
    }

    /// Register (or overwrite) a subscriber with a no-op callback.
    pub fn add_subscriber(&self, id: impl Into<String>, params: Vec<String>) -> SubscriberHandle {
        let id = id.into();
        debug!(subscriber = %id, params = ?params, "subscriber added");

        self.inner.registry.lock().subscribers.insert(
            id.clone(),
            Subscriber {
                params,
                callback: Arc::new(|_: &StreamMessage| {}),
            },
        );

        SubscriberHandle {
            id,
            inner: self.inner.clone(),
        }
    }

    /// Queue a `SUBSCRIBE` payload; params already requested are dropped from it.
    pub fn send(&self, payload: &str) {
        self.inner.send(payload);
    }

    /// Same as [`Multiplexer::send`] with an id from the multiplexer's counter.
    pub fn subscribe_params(&self, params: Vec<String>) {
        let message = ControlMessage::subscribe(params, self.inner.next_request_id());
        self.inner.enqueue(message);
    }

    /// Stop local fan-out for `id`. Remote params stay requested.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let removed = self.inner.registry.lock().subscribers.shift_remove(id).is_some();
        debug!(subscriber = %id, removed, "subscriber removed");
        removed
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn symbol_state(&self, symbol: &str) -> Option<SymbolState> {
        self.inner.registry.lock().store.get(symbol).cloned()
    }

    pub fn symbol_states(&self) -> HashMap<String, SymbolState> {
        self.inner.registry.lock().store.get_all().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.lock().subscribers.len()
    }

    pub fn subscriber_params(&self, id: &str) -> Option<Vec<String>> {
        self.inner
            .registry
            .lock()
            .subscribers
            .get(id)
            .map(|subscriber| subscriber.params.clone())
    }

    /// Control messages waiting for delivery
    pub fn pending_requests(&self) -> usize {
        self.inner.registry.lock().outbound.len()
    }

    /// Every param requested so far, in request order
    pub fn global_params(&self) -> Vec<String> {
        self.inner.registry.lock().global_params.iter().cloned().collect()
    }

    /// Stop the worker and close the connection.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Per-subscriber handle returned by [`Multiplexer::add_subscriber`]
#[derive(Clone)]
pub struct SubscriberHandle {
    id: String,
    inner: Arc<MuxInner>,
}

impl fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberHandle").field("id", &self.id).finish()
    }
}

impl SubscriberHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn send(&self, payload: &str) {
        self.inner.send(payload);
    }

    /// Replace this subscriber's callback.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        let mut registry = self.inner.registry.lock();
        match registry.subscribers.get_mut(&self.id) {
            Some(subscriber) => subscriber.callback = Arc::new(callback),
            None => debug!(subscriber = %self.id, "subscribe on removed subscriber ignored"),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn log_message_sample_once(message: &StreamMessage) {
    let count = MESSAGE_SAMPLE_COUNT.fetch_add(1, Ordering::Relaxed);
    if count >= MESSAGE_SAMPLE_LIMIT {
        return;
    }

    match message {
        StreamMessage::Data { stream, .. } => {
            info!(
                sample_index = count + 1,
                sample_limit = MESSAGE_SAMPLE_LIMIT,
                stream = stream.as_deref().unwrap_or("-"),
                event = message.event_type().unwrap_or("-"),
                "ws message sample"
            );
        }
        StreamMessage::Ack { id, .. } => {
            info!(
                sample_index = count + 1,
                sample_limit = MESSAGE_SAMPLE_LIMIT,
                ack_id = id,
                "ws message sample"
            );
        }
    }
}

fn log_parse_fail_once(err: &ChartfeedError, raw: &str) {
    let count = PARSE_FAIL_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < PARSE_FAIL_LOG_LIMIT {
        info!(
            sample_index = count + 1,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            error = %err,
            bytes = raw.len(),
            "ws message parse failed"
        );
        let preview = truncate_for_log(raw, RAW_LOG_MAX_BYTES);
        debug!(
            sample_index = count + 1,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            error = %err,
            bytes = raw.len(),
            message = %preview,
            "ws message parse failed"
        );
    }
}
