//! The loading engine: a reference-counted registry of busy operations.
//!
//! Callers `start` an operation, optionally `update` its message or
//! progress, and `stop` it. The engine folds the live set into one
//! [`Snapshot`]: whether the busy UI should be revealed, whether it is
//! still in its short variant, and what to display.
//!
//! Reveal is debounced. A fresh busy episode waits `reveal_delay_ms`
//! before showing, so work that finishes quickly never flashes a spinner.
//! An episode that begins within `rapid_resume_window_ms` of the previous
//! one settling shows at once, so back-to-back work does not blink off
//! and on.
//!
//! All state transitions go through here. Subscribers are notified
//! synchronously after each one, outside the engine lock, so a subscriber
//! may call back into the engine.

mod guard;

pub use guard::{LoadingGuard, OperationHandle};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::{Clock, ManualClock, Scheduler, TimerHandle, TokioClock, TokioScheduler, lock};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::messages::MessageCatalog;
use crate::model::{
    DisplayInfo, Operation, OperationPatch, ProgressDisplay, Snapshot, StartOptions, Token,
};
use crate::telemetry::metrics::{EngineMetrics, RevealMode};

/// Callback receiving every new snapshot.
pub type Listener = Arc<dyn Fn(&Snapshot) + Send + Sync + 'static>;

/// Shared handle to a loading engine. Clones refer to the same engine.
///
/// Create one per UI session and pass it to whoever needs it.
#[derive(Clone)]
pub struct LoadingEngine {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    config: EngineConfig,
    catalog: MessageCatalog,
    metrics: EngineMetrics,
}

#[derive(Default)]
struct State {
    operations: HashMap<Token, Operation>,
    next_seq: u64,
    /// Bumped on every 0 → 1 transition; stale timers compare against it.
    episode: u64,
    /// Deadline of the pending delayed reveal.
    reveal_at: Option<u64>,
    reveal_timer: Option<TimerHandle>,
    variant_timer: Option<TimerHandle>,
    should_reveal: bool,
    visible_since: Option<u64>,
    last_settled_at: Option<u64>,
    listeners: Vec<(u64, Listener)>,
    next_listener_id: u64,
    shut_down: bool,
}

impl State {
    fn clear_timers(&mut self) {
        self.reveal_at = None;
        self.reveal_timer = None;
        self.variant_timer = None;
    }
}

impl LoadingEngine {
    /// Create an engine with explicit time facilities.
    pub fn new(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self> {
        config.validate()?;
        let catalog = config.catalog()?;
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                clock,
                scheduler,
                config,
                catalog,
                metrics: EngineMetrics::new(),
            }),
        })
    }

    /// Create an engine on the current tokio runtime.
    pub fn with_tokio(config: EngineConfig) -> Result<Self> {
        let scheduler = TokioScheduler::current()?;
        Self::new(config, Arc::new(TokioClock::new()), Arc::new(scheduler))
    }

    /// Create an engine driven by a hand-advanced clock.
    pub fn manual(config: EngineConfig, clock: &ManualClock) -> Result<Self> {
        Self::new(config, Arc::new(clock.clone()), Arc::new(clock.clone()))
    }

    /// Register a new busy operation and return its token.
    pub fn start(&self, options: StartOptions) -> Token {
        let now = self.now();
        let mut state = self.lock();

        let mut token = Token::new();
        if state.shut_down {
            warn!(%token, "start on a shut down loading engine, ignoring");
            return token;
        }
        while state.operations.contains_key(&token) {
            token = Token::new();
        }

        self.apply_due_reveal(&mut state, now);

        let seq = state.next_seq;
        state.next_seq += 1;
        let scope = options.scope;
        state.operations.insert(
            token,
            Operation {
                token,
                scope,
                started_at: now,
                message: options.message,
                message_key: options.message_key,
                progress: options.progress,
                seq,
            },
        );
        self.shared.metrics.operation_started(scope);
        debug!(
            %token,
            %scope,
            active = state.operations.len(),
            "operation started"
        );

        if state.operations.len() == 1 {
            self.begin_episode(&mut state, now);
        }

        self.commit(state, now);
        token
    }

    /// Patch a live operation. Returns `false` if the token is not live.
    pub fn update(&self, token: Token, patch: OperationPatch) -> bool {
        let now = self.now();
        let mut state = self.lock();
        let revealed = self.apply_due_reveal(&mut state, now);

        let Some(op) = state.operations.get_mut(&token) else {
            debug!(%token, "update for unknown operation ignored");
            if revealed {
                self.commit(state, now);
            }
            return false;
        };
        if let Some(message) = patch.message {
            op.message = Some(message);
        }
        if let Some(key) = patch.message_key {
            op.message_key = Some(key);
        }
        if let Some(progress) = patch.progress {
            op.progress = Some(progress);
        }
        debug!(%token, progress = ?op.progress, "operation updated");

        self.commit(state, now);
        true
    }

    /// Remove a live operation. Returns `false` if the token is not live.
    pub fn stop(&self, token: Token) -> bool {
        let now = self.now();
        let mut state = self.lock();
        let revealed = self.apply_due_reveal(&mut state, now);

        let Some(op) = state.operations.remove(&token) else {
            debug!(%token, "stop for unknown operation ignored");
            if revealed {
                self.commit(state, now);
            }
            return false;
        };
        let duration_ms = now.saturating_sub(op.started_at);
        self.shared.metrics.operation_stopped(op.scope, duration_ms);
        debug!(
            %token,
            scope = %op.scope,
            duration_ms,
            active = state.operations.len(),
            "operation stopped"
        );

        if state.operations.is_empty() {
            self.settle(&mut state, now);
        }

        self.commit(state, now);
        true
    }

    /// Current view of the engine.
    ///
    /// A reveal that came due before its timer ran is applied here, and
    /// subscribers hear about it before this returns.
    pub fn snapshot(&self) -> Snapshot {
        let now = self.now();
        let mut state = self.lock();
        if self.apply_due_reveal(&mut state, now) {
            return self.commit(state, now);
        }
        self.build_snapshot(&state, now)
    }

    /// Whether the busy UI is revealed right now.
    pub(crate) fn is_revealed(&self) -> bool {
        let now = self.now();
        let mut state = self.lock();
        if self.apply_due_reveal(&mut state, now) {
            return self.commit(state, now).should_reveal;
        }
        state.should_reveal
    }

    pub fn active_count(&self) -> usize {
        self.lock().operations.len()
    }

    /// Register a listener for every state change.
    ///
    /// The listener stays registered until [`Subscription::unsubscribe`] is
    /// called or the engine shuts down; dropping the handle does not remove it.
    pub fn subscribe(&self, listener: impl Fn(&Snapshot) + Send + Sync + 'static) -> Subscription {
        let mut state = self.lock();
        let id = state.next_listener_id;
        state.next_listener_id += 1;
        state.listeners.push((id, Arc::new(listener)));
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Tear down: cancel timers, drop all operations and listeners.
    ///
    /// Later `start` calls hand out untracked tokens; `update` and `stop`
    /// return `false`.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if state.shut_down {
            return;
        }
        let dropped = state.operations.len();
        state.shut_down = true;
        state.clear_timers();
        state.operations.clear();
        state.listeners.clear();
        state.should_reveal = false;
        state.visible_since = None;
        info!(dropped, "loading engine shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    // -----------------------------------------------------------------------
    // Reveal cycle
    // -----------------------------------------------------------------------

    fn begin_episode(&self, state: &mut State, now: u64) {
        state.episode += 1;
        let config = &self.shared.config;

        let rapid_resume = state
            .last_settled_at
            .is_some_and(|settled| now.saturating_sub(settled) <= config.rapid_resume_window_ms);

        if rapid_resume || config.reveal_delay_ms == 0 {
            self.reveal(state, now, now, RevealMode::Immediate);
            return;
        }

        state.reveal_at = Some(now.saturating_add(config.reveal_delay_ms));
        let episode = state.episode;
        state.reveal_timer = Some(self.schedule(config.reveal_delay(), move |engine| {
            engine.on_reveal_timer(episode)
        }));
        debug!(episode, delay_ms = config.reveal_delay_ms, "reveal scheduled");
    }

    /// Apply a delayed reveal whose deadline has passed.
    ///
    /// Returns `true` if the reveal was applied; the caller must then
    /// notify subscribers, since the pending timer is cancelled.
    fn apply_due_reveal(&self, state: &mut State, now: u64) -> bool {
        let Some(deadline) = state.reveal_at else {
            return false;
        };
        if deadline > now || state.operations.is_empty() {
            return false;
        }
        self.reveal(state, deadline, now, RevealMode::Delayed);
        true
    }

    fn reveal(&self, state: &mut State, visible_since: u64, now: u64, mode: RevealMode) {
        state.reveal_at = None;
        state.reveal_timer = None;
        state.should_reveal = true;
        state.visible_since = Some(visible_since);
        self.shared.metrics.revealed(mode);
        info!(
            episode = state.episode,
            mode = mode.as_str(),
            visible_since,
            "busy indicator revealed"
        );

        let short_until =
            visible_since.saturating_add(self.shared.config.short_variant_threshold_ms);
        let remaining = short_until.saturating_sub(now);
        if remaining > 0 {
            let episode = state.episode;
            state.variant_timer = Some(self.schedule(
                Duration::from_millis(remaining),
                move |engine| engine.on_variant_timer(episode),
            ));
        }
    }

    fn settle(&self, state: &mut State, now: u64) {
        if !state.should_reveal {
            self.shared.metrics.flicker_suppressed();
        }
        let visible_for_ms = state.visible_since.map(|since| now.saturating_sub(since));
        state.clear_timers();
        state.should_reveal = false;
        state.visible_since = None;
        state.last_settled_at = Some(now);
        info!(episode = state.episode, ?visible_for_ms, "busy episode settled");
    }

    fn on_reveal_timer(&self, episode: u64) {
        let mut state = self.lock();
        if state.shut_down || state.episode != episode || state.operations.is_empty() {
            return;
        }
        let now = match state.reveal_at {
            Some(deadline) => self.now().max(deadline),
            None => self.now(),
        };
        self.apply_due_reveal(&mut state, now);
        self.commit(state, now);
    }

    fn on_variant_timer(&self, episode: u64) {
        let state = self.lock();
        if state.shut_down || state.episode != episode || !state.should_reveal {
            return;
        }
        let now = self.now();
        debug!(episode, "short variant elapsed");
        self.commit(state, now);
    }

    fn schedule(
        &self,
        delay: Duration,
        callback: impl FnOnce(LoadingEngine) + Send + 'static,
    ) -> TimerHandle {
        let weak = Arc::downgrade(&self.shared);
        self.shared.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    callback(LoadingEngine { shared });
                }
            }),
        )
    }

    // -----------------------------------------------------------------------
    // Snapshots & notification
    // -----------------------------------------------------------------------

    fn build_snapshot(&self, state: &State, now: u64) -> Snapshot {
        let config = &self.shared.config;
        let is_short_visible = state.should_reveal
            && state.visible_since.is_some_and(|since| {
                now.saturating_sub(since) < config.short_variant_threshold_ms
            });

        let display = state
            .operations
            .values()
            .max_by_key(|op| (op.started_at, op.seq))
            .map(|op| DisplayInfo {
                token: op.token,
                scope: op.scope,
                message: self.shared.catalog.resolve(
                    op.scope,
                    op.message.as_deref(),
                    op.message_key.as_deref(),
                ),
                progress: op.progress.map(ProgressDisplay::from),
            });

        Snapshot {
            active_count: state.operations.len(),
            is_active: !state.operations.is_empty(),
            should_reveal: state.should_reveal,
            is_short_visible,
            visible_since: state.visible_since,
            last_settled_at: state.last_settled_at,
            reveal_delay_ms: config.reveal_delay_ms,
            short_variant_threshold_ms: config.short_variant_threshold_ms,
            display,
        }
    }

    /// Release the lock, then hand the new snapshot to every listener.
    fn commit(&self, state: MutexGuard<'_, State>, now: u64) -> Snapshot {
        let snapshot = self.build_snapshot(&state, now);
        let listeners: Vec<Listener> = state
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        drop(state);

        for listener in listeners {
            listener(&snapshot);
        }
        snapshot
    }

    fn now(&self) -> u64 {
        self.shared.clock.now_ms()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.shared.state)
    }
}

impl std::fmt::Debug for LoadingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("LoadingEngine")
            .field("active", &state.operations.len())
            .field("should_reveal", &state.should_reveal)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

/// Handle returned by [`LoadingEngine::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    shared: Weak<Shared>,
}

impl Subscription {
    /// Remove the listener. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let mut state = lock(&shared.state);
        let before = state.listeners.len();
        state.listeners.retain(|(id, _)| *id != self.id);
        state.listeners.len() != before
    }
}
