//! Per-session watcher bookkeeping: throttles, cooldowns, smoothing, and
//! the latest-input-only mailbox.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::detector::SensorInput;

#[derive(Default)]
struct SessionState {
    active: bool,
    last_analysis: Option<Instant>,
    /// Per-watcher throttle clocks, keyed by watcher key.
    last_run: HashMap<String, Instant>,
    /// Per-event cooldown clocks.
    last_event: HashMap<String, Instant>,
    /// EMA state for continuous signals.
    smoothed: HashMap<String, f64>,
    busy: bool,
    pending: Option<SensorInput>,
}

/// One input session (one camera feed, one microphone, one API consumer).
///
/// Each session carries its own lock; cross-session state is never shared.
pub struct WatcherSession {
    id: String,
    state: Mutex<SessionState>,
}

impl WatcherSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(SessionState {
                active: true,
                ..Default::default()
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn set_active(&self, active: bool) {
        self.lock().active = active;
    }

    /// When this session last ran any analysis.
    pub fn last_analysis(&self) -> Option<Instant> {
        self.lock().last_analysis
    }

    /// Per-watcher throttle: true when `interval` has elapsed since the
    /// watcher last ran (or it never ran). Passing marks the watcher as run.
    pub fn try_claim_run(&self, watcher_key: &str, interval: Duration) -> bool {
        let mut state = self.lock();
        let now = Instant::now();
        if let Some(last) = state.last_run.get(watcher_key) {
            if now.duration_since(*last) < interval {
                trace!(session = %self.id, watcher = watcher_key, "watcher_throttled");
                return false;
            }
        }
        state.last_run.insert(watcher_key.to_string(), now);
        state.last_analysis = Some(now);
        true
    }

    /// Per-event cooldown: true when `cooldown` has elapsed since this
    /// event last fired. Passing records the new fire time.
    pub fn try_claim_event(&self, event: &str, cooldown: Duration) -> bool {
        let mut state = self.lock();
        let now = Instant::now();
        if let Some(last) = state.last_event.get(event) {
            if now.duration_since(*last) < cooldown {
                trace!(session = %self.id, event, "event_cooldown");
                return false;
            }
        }
        state.last_event.insert(event.to_string(), now);
        true
    }

    /// Exponential moving average update for a continuous signal.
    pub fn smooth(&self, key: &str, value: f64, alpha: f64) -> f64 {
        let mut state = self.lock();
        let smoothed = match state.smoothed.get(key) {
            Some(prev) => alpha * value + (1.0 - alpha) * prev,
            None => value,
        };
        state.smoothed.insert(key.to_string(), smoothed);
        smoothed
    }

    // =========================================================================
    // Latest-input-only mailbox
    // =========================================================================

    /// Claim the processing slot. Returns the input to process, or `None`
    /// when another analysis is in flight — in which case the input
    /// replaces any previously pending one (no queueing).
    pub fn begin_or_enqueue(&self, input: SensorInput) -> Option<SensorInput> {
        let mut state = self.lock();
        if state.busy {
            trace!(session = %self.id, "mailbox_replace_pending");
            state.pending = Some(input);
            None
        } else {
            state.busy = true;
            Some(input)
        }
    }

    /// After processing one input: take the newest pending input, or
    /// release the slot when nothing newer arrived.
    pub fn next_or_finish(&self) -> Option<SensorInput> {
        let mut state = self.lock();
        match state.pending.take() {
            Some(input) => Some(input),
            None => {
                state.busy = false;
                None
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().expect("watcher session lock")
    }
}

/// Sessions keyed by id, created on demand.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, std::sync::Arc<WatcherSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, id: &str) -> std::sync::Arc<WatcherSession> {
        let mut sessions = self.sessions.lock().expect("session registry lock");
        sessions
            .entry(id.to_string())
            .or_insert_with(|| std::sync::Arc::new(WatcherSession::new(id)))
            .clone()
    }

    pub fn remove(&self, id: &str) {
        self.sessions
            .lock()
            .expect("session registry lock")
            .remove(id);
    }
}
