/*
[INPUT]:  Shared multiplexer state and its StreamTransport
[OUTPUT]: Connection lifecycle: connect, paced delivery, fan-out, reconnect
[POS]:    Multiplexer - the only owner of the physical connection
[UPDATE]: When changing state transitions, pacing or backoff wiring
*/

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::multiplexer::reconnect::ReconnectPolicy;
use crate::multiplexer::{ConnectionState, MuxInner};
use crate::timers;
use crate::ws::{StreamConnection, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionExit {
    Disconnected,
    Shutdown,
}

pub(super) struct ConnectionWorker {
    inner: Arc<MuxInner>,
    policy: ReconnectPolicy,
    shutdown: CancellationToken,
}

impl ConnectionWorker {
    pub(super) fn new(inner: Arc<MuxInner>) -> Self {
        let policy = ReconnectPolicy::new(inner.config.reconnect.clone());
        let shutdown = inner.shutdown.clone();
        Self {
            inner,
            policy,
            shutdown,
        }
    }

    pub(super) async fn run(mut self) {
        let mut generation: u64 = 0;

        'run: loop {
            if self.shutdown.is_cancelled() {
                break 'run;
            }

            self.inner.set_state(ConnectionState::Connecting);

            let connected = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break 'run,
                result = self.inner.transport.connect() => result,
            };

            match connected {
                Ok(connection) => {
                    generation += 1;
                    self.policy.reset();
                    self.inner.set_state(ConnectionState::Open);
                    info!(generation, "stream connection open");

                    let exit = self.run_session(connection, generation).await;
                    self.inner.set_state(ConnectionState::Closing);
                    if exit == SessionExit::Shutdown {
                        break 'run;
                    }
                }
                Err(err) => {
                    warn!(attempt = self.policy.attempt_count() + 1, error = %err, "stream connect failed");
                }
            }

            self.inner.set_state(ConnectionState::Disconnected);

            let Some(delay) = self.policy.next_delay() else {
                warn!(attempts = self.policy.attempt_count(), "stream reconnect gave up");
                break 'run;
            };

            info!(?delay, "stream reconnecting after backoff");
            if !self.wait_backoff(delay).await {
                break 'run;
            }
        }

        self.inner.set_state(ConnectionState::Disconnected);
        debug!("multiplexer worker stopped");
    }

    /// False when shutdown interrupted the wait.
    async fn wait_backoff(&self, delay: Duration) -> bool {
        let (fire_tx, fire_rx) = oneshot::channel();
        let timer = timers::timeout(delay, move || {
            let _ = fire_tx.send(());
        });

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                timer.unsubscribe();
                false
            }
            _ = fire_rx => true,
        }
    }

    async fn run_session(&self, connection: StreamConnection, generation: u64) -> SessionExit {
        let StreamConnection {
            outbound,
            mut inbound,
        } = connection;

        self.inner.queue_resubscribe(generation);
        if !self.deliver_next(&outbound).await {
            return SessionExit::Disconnected;
        }

        let (tick_tx, mut tick_rx) = mpsc::unbounded_channel();
        let pacer = timers::interval(self.inner.config.send_interval, move || {
            let _ = tick_tx.send(());
        });

        let exit = loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break SessionExit::Shutdown,
                event = inbound.recv() => match event {
                    Some(TransportEvent::Message(text)) => self.inner.dispatch(&text),
                    Some(TransportEvent::Error(err)) => {
                        warn!(generation, error = %err, "stream transport error");
                        break SessionExit::Disconnected;
                    }
                    Some(TransportEvent::Closed) | None => {
                        info!(generation, "stream connection closed");
                        break SessionExit::Disconnected;
                    }
                },
                Some(()) = tick_rx.recv() => {
                    if !self.deliver_next(&outbound).await {
                        break SessionExit::Disconnected;
                    }
                }
            }
        };

        pacer.unsubscribe();
        exit
    }

    /// Hand the head of the queue to the connection. False if the connection is gone.
    async fn deliver_next(&self, outbound: &mpsc::Sender<String>) -> bool {
        let Some(message) = self.inner.pop_outbound() else {
            return true;
        };

        let text = match message.to_text() {
            Ok(text) => text,
            Err(err) => {
                warn!(id = message.id, error = %err, "control message not serializable; dropped");
                return true;
            }
        };

        if outbound.send(text).await.is_err() {
            warn!(id = message.id, "connection closed before control message was delivered");
            self.inner.requeue_front(message);
            return false;
        }

        debug!(id = message.id, params = message.params.len(), "control message delivered");
        true
    }
}
