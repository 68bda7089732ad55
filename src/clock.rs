//! Time sources and deferred callbacks.
//!
//! The engine never reads the wall clock or sleeps directly. It asks a
//! [`Clock`] for the current time and a [`Scheduler`] for cancelable
//! deferred callbacks, so tests and the replay tool can drive time by hand.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use crate::error::{Error, Result};

/// Monotonic millisecond time source.
pub trait Clock: Send + Sync {
    /// Milliseconds since this clock's origin. Never decreases.
    fn now_ms(&self) -> u64;
}

/// A deferred callback.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Facility for running a callback after a delay.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, callback: Callback) -> TimerHandle;
}

/// Handle to a scheduled callback. Dropping or canceling it cancels the callback.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancel the callback if it has not run yet.
    pub fn cancel(mut self) {
        self.fire_cancel();
    }

    fn fire_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.fire_cancel();
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Tokio
// ---------------------------------------------------------------------------

/// Clock backed by `tokio::time::Instant`, so it follows paused test time.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        millis(self.origin.elapsed())
    }
}

/// Scheduler that spawns a sleeping task per callback and aborts it on cancel.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Capture the runtime the caller is running on.
    pub fn current() -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Other(format!("no tokio runtime for reveal timers: {e}")))?;
        Ok(Self::new(handle))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, callback: Callback) -> TimerHandle {
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        TimerHandle::new(move || task.abort())
    }
}

// ---------------------------------------------------------------------------
// Manual
// ---------------------------------------------------------------------------

/// Hand-driven clock that is also its own scheduler.
///
/// Time only moves through [`ManualClock::advance`] / [`ManualClock::advance_to`],
/// which fire due callbacks in deadline order (ties in scheduling order).
/// While a callback runs, `now_ms()` reports that callback's deadline.
#[derive(Clone, Default)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    now: u64,
    next_id: u64,
    pending: BTreeMap<(u64, u64), Callback>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the clock at `now` instead of zero.
    pub fn starting_at(now: u64) -> Self {
        let clock = Self::new();
        lock(&clock.inner).now = now;
        clock
    }

    /// Move time forward by `ms`, firing every callback that falls due.
    pub fn advance(&self, ms: u64) {
        let target = lock(&self.inner).now.saturating_add(ms);
        self.advance_to(target);
    }

    /// Move time forward to `target`. Targets in the past leave time unchanged.
    pub fn advance_to(&self, target: u64) {
        loop {
            let callback = {
                let mut state = lock(&self.inner);
                let due = state
                    .pending
                    .keys()
                    .next()
                    .copied()
                    .filter(|(deadline, _)| *deadline <= target);
                match due {
                    Some(key) => {
                        state.now = state.now.max(key.0);
                        state.pending.remove(&key)
                    }
                    None => {
                        state.now = state.now.max(target);
                        return;
                    }
                }
            };
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    /// Number of callbacks scheduled and not yet fired or canceled.
    pub fn pending_timers(&self) -> usize {
        lock(&self.inner).pending.len()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        lock(&self.inner).now
    }
}

impl Scheduler for ManualClock {
    fn schedule(&self, delay: Duration, callback: Callback) -> TimerHandle {
        let key = {
            let mut state = lock(&self.inner);
            let key = (state.now.saturating_add(millis(delay)), state.next_id);
            state.next_id += 1;
            state.pending.insert(key, callback);
            key
        };
        let weak: Weak<Mutex<ManualState>> = Arc::downgrade(&self.inner);
        TimerHandle::new(move || {
            if let Some(inner) = weak.upgrade() {
                // Bind the removed callback so it drops after the guard is released.
                let removed = lock(&inner).pending.remove(&key);
                drop(removed);
            }
        })
    }
}

impl std::fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner);
        f.debug_struct("ManualClock")
            .field("now", &state.now)
            .field("pending", &state.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn recorder(clock: &ManualClock, log: &Arc<Mutex<Vec<u64>>>) -> Callback {
        let clock = clock.clone();
        let log = Arc::clone(log);
        Box::new(move || log.lock().unwrap().push(clock.now_ms()))
    }

    #[test]
    fn callbacks_fire_in_deadline_order_at_their_deadline() {
        let clock = ManualClock::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let _late = clock.schedule(Duration::from_millis(300), recorder(&clock, &log));
        let _early = clock.schedule(Duration::from_millis(100), recorder(&clock, &log));

        clock.advance(250);
        assert_eq!(*log.lock().unwrap(), vec![100]);
        assert_eq!(clock.now_ms(), 250);

        clock.advance(100);
        assert_eq!(*log.lock().unwrap(), vec![100, 300]);
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn canceled_callback_never_fires() {
        let clock = ManualClock::new();
        let fired = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&fired);

        let handle = clock.schedule(
            Duration::from_millis(50),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.cancel();

        clock.advance(1_000);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn dropping_handle_cancels() {
        let clock = ManualClock::new();
        drop(clock.schedule(Duration::from_millis(10), Box::new(|| {})));
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn advance_to_past_keeps_time() {
        let clock = ManualClock::starting_at(500);
        clock.advance_to(100);
        assert_eq!(clock.now_ms(), 500);
    }
}
