/*
[INPUT]:  Delays, periods and fixed item sequences
[OUTPUT]: Spawned timer tasks with a cancellation Subscription
[POS]:    Scheduling primitives - reconnect backoff and outbound pacing
[UPDATE]: When adding timer shapes or changing cancellation semantics
*/

//! Non-blocking scheduling primitives running on the tokio runtime.
//!
//! All three must be called from within a runtime. Emissions of one timer are
//! strictly ordered in time; nothing is guaranteed across timers.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Cancellation handle returned by every timer.
///
/// Dropping it does not cancel the timer.
#[derive(Debug, Clone)]
pub struct Subscription {
    token: CancellationToken,
}

impl Subscription {
    fn new() -> (Self, CancellationToken) {
        let token = CancellationToken::new();
        (
            Self {
                token: token.clone(),
            },
            token,
        )
    }

    /// Stop the timer. No emission happens after this returns.
    pub fn unsubscribe(&self) {
        self.token.cancel();
    }

    /// True once the timer was cancelled or has completed.
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Fire `on_fire` once after `delay`.
pub fn timeout<F>(delay: Duration, on_fire: F) -> Subscription
where
    F: FnOnce() + Send + 'static,
{
    let (subscription, token) = Subscription::new();

    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(delay) => {
                on_fire();
                token.cancel();
            }
        }
    });

    subscription
}

/// Fire `on_tick` every `period`, first after one full period.
pub fn interval<F>(period: Duration, mut on_tick: F) -> Subscription
where
    F: FnMut() + Send + 'static,
{
    let (subscription, token) = Subscription::new();
    let period = period.max(MIN_PERIOD);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => on_tick(),
            }
        }
    });

    subscription
}

/// Emit `items` in order, item `i` at `i * spacing`, then call `on_complete` once.
pub fn from_sequence<T, N, C>(
    items: Vec<T>,
    spacing: Duration,
    mut on_next: N,
    on_complete: C,
) -> Subscription
where
    T: Send + 'static,
    N: FnMut(T) + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    let (subscription, token) = Subscription::new();

    tokio::spawn(async move {
        let start = Instant::now();

        for (index, item) in items.into_iter().enumerate() {
            let at = start + spacing.saturating_mul(index as u32);
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep_until(at) => on_next(item),
            }
        }

        if !token.is_cancelled() {
            on_complete();
            token.cancel();
        }
    });

    subscription
}
