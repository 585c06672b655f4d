//! The rule engine: current state, event dispatch, timers, render schedule.
//!
//! The engine owns the states collection, the rule table, the shared data
//! store, and the single outstanding render timer. Everything that mutates
//! machine state funnels through the internal `_locked` helpers under one
//! mutex, so a timer firing can never interleave with a tool call halfway
//! through a transition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lumo_core::{ClockTime, DataStore, OutputDevice, Rgb};
use lumo_expr::{ActionProgram, Condition, RenderNext, StoreHooks};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{MachineError, MachineResult};
use crate::executor::Executor;
use crate::pipeline::{run_pipeline, Pipeline};
use crate::rule::{
    parse_schedule_time, Rule, RuleId, RuleSpec, TriggerConfig, EVENT_STATE_COMPLETE,
};
use crate::scheduler::{Scheduler, TimerId};
use crate::state::{ReactiveConfig, SensorKind, State};
use crate::states::States;

/// Longest chain of immediate transitions (completions, zero-length
/// durations) followed from a single entry point.
const MAX_CHAIN: usize = 8;

/// The default toggle event between `off` and `on`.
pub const EVENT_BUTTON_CLICK: &str = "button_click";

/// A watcher that should be running for the current state.
#[derive(Debug, Clone)]
pub struct ActiveWatcher {
    /// Stable identity for per-watcher throttling.
    pub key: String,
    pub kind: SensorKind,
    pub config: ReactiveConfig,
}

/// Criteria for bulk rule deletion. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    pub source: Option<String>,
    pub trigger: Option<String>,
    pub target: Option<String>,
}

impl RuleFilter {
    fn matches(&self, rule: &Rule) -> bool {
        self.source
            .as_deref()
            .is_none_or(|s| rule.source.as_str() == s)
            && self.trigger.as_deref().is_none_or(|t| rule.trigger == t)
            && self
                .target
                .as_deref()
                .is_none_or(|t| rule.target.as_deref() == Some(t))
    }
}

struct Core {
    states: States,
    rules: Vec<Rule>,
    current: String,
    executor: Executor,
    pipelines: HashMap<String, Pipeline>,

    state_epoch: u64,
    render_timer: Option<TimerId>,
    duration_timer: Option<TimerId>,
    rule_timers: HashMap<RuleId, TimerId>,
    legacy_timer: Option<TimerId>,
    legacy_epoch: u64,
    next_rule_id: u64,
}

struct EngineInner {
    core: Mutex<Core>,
    data: DataStore,
    scheduler: Scheduler,
    device: Arc<dyn OutputDevice>,
    config: EngineConfig,
}

/// Cheaply-cloneable handle to the lamp state machine.
///
/// Construction requires a running tokio runtime (the scheduler task is
/// spawned onto it). All public methods are synchronous and callable from
/// both sync and async contexts; none of them block on I/O.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine over an output device. The machine starts in the
    /// configured default state without rendering; call [`Engine::set_state`]
    /// or use [`Engine::with_defaults`] to light up.
    pub fn new(device: Arc<dyn OutputDevice>, config: EngineConfig) -> Self {
        let core = Core {
            states: States::new(),
            rules: Vec::new(),
            current: config.default_state.clone(),
            executor: Executor::new(),
            pipelines: HashMap::new(),
            state_epoch: 0,
            render_timer: None,
            duration_timer: None,
            rule_timers: HashMap::new(),
            legacy_timer: None,
            legacy_epoch: 0,
            next_rule_id: 1,
        };
        Self {
            inner: Arc::new(EngineInner {
                core: Mutex::new(core),
                data: DataStore::new(),
                scheduler: Scheduler::spawn(),
                device,
                config,
            }),
        }
    }

    /// Create an engine with the default config, the built-in
    /// `off <-> on` toggle rules, and the default state entered.
    pub fn with_defaults(device: Arc<dyn OutputDevice>) -> Self {
        let engine = Self::new(device, EngineConfig::default());
        engine.install_default_rules();
        let default_state = engine.inner.config.default_state.clone();
        engine.set_state(&default_state);
        engine
    }

    /// Add the built-in `off --button_click--> on --button_click--> off`
    /// toggle rules.
    pub fn install_default_rules(&self) {
        let mut core = self.lock_core();
        self.install_default_rules_locked(&mut core);
    }

    pub fn data(&self) -> DataStore {
        self.inner.data.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn current_state(&self) -> String {
        self.lock_core().current.clone()
    }

    /// The primary color currently showing.
    pub fn current_color(&self) -> Rgb {
        self.lock_core().executor.current_color()
    }

    /// Stop the scheduler task. The engine is unusable afterwards.
    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
    }

    // =========================================================================
    // States
    // =========================================================================

    /// Insert or replace a state definition. Replacing the current state
    /// does not re-enter it; the new definition applies on next entry.
    pub fn add_state(&self, state: State) -> bool {
        self.lock_core().states.add(state)
    }

    /// Remove a state by name. Protection of built-ins is the tool layer's
    /// job; the engine itself will delete anything.
    pub fn delete_state(&self, name: &str) -> bool {
        self.lock_core().states.delete(name)
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.lock_core().states.contains(name)
    }

    /// Name + description pairs for agent context.
    pub fn states_listing(&self) -> Vec<(String, String)> {
        self.lock_core().states.listing()
    }

    /// Human-readable state parameter dump for LLM prompts.
    pub fn states_prompt_dump(&self) -> String {
        self.lock_core().states.prompt_dump()
    }

    /// The current state's full parameter dict.
    pub fn get_state(&self) -> Value {
        let core = self.lock_core();
        match core.states.get(&core.current) {
            Some(state) => serde_json::to_value(state).unwrap_or(Value::Null),
            None => json!({
                "name": core.current,
                "builtin": self.inner.config.is_protected(&core.current),
            }),
        }
    }

    /// All states and rules, for agent context-building.
    pub fn get_details(&self) -> Value {
        let core = self.lock_core();
        json!({
            "current_state": core.current,
            "states": core.states.iter().collect::<Vec<_>>(),
            "rules": core.rules,
        })
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Switch to a state by name.
    ///
    /// Unknown names are not an error: built-ins `on`/`off` fall back to
    /// solid white/black, anything else holds the current color.
    pub fn set_state(&self, name: &str) {
        let mut core = self.lock_core();
        self.set_state_locked(&mut core, name, 0);
    }

    /// Dispatch an event against the rule table. Returns whether any rule
    /// fired; no match is a logged no-op.
    pub fn execute_transition(&self, event: &str) -> bool {
        let mut core = self.lock_core();
        self.execute_transition_locked(&mut core, event, 0)
    }

    /// Write a value into the shared data store.
    pub fn set_variable(&self, key: impl Into<String>, value: Value) {
        self.inner.data.set(key, value);
    }

    // =========================================================================
    // Rules
    // =========================================================================

    /// Normalize and add a rule. A rule with an existing
    /// `(source, trigger, condition)` key replaces the old one in place and
    /// cancels its timer. Timer-backed triggers are armed immediately.
    pub fn add_rule(&self, spec: RuleSpec) -> MachineResult<RuleId> {
        let mut core = self.lock_core();
        self.add_rule_locked(&mut core, spec)
    }

    /// Add several rules; stops at the first invalid one.
    pub fn add_rules(&self, specs: Vec<RuleSpec>) -> MachineResult<Vec<RuleId>> {
        let mut core = self.lock_core();
        specs
            .into_iter()
            .map(|spec| self.add_rule_locked(&mut core, spec))
            .collect()
    }

    /// Remove a rule by position in the table.
    pub fn remove_rule(&self, index: usize) -> MachineResult<()> {
        let mut core = self.lock_core();
        if index >= core.rules.len() {
            return Err(MachineError::RuleIndexOutOfRange {
                index,
                len: core.rules.len(),
            });
        }
        let rule = core.rules.remove(index);
        self.cancel_rule_timer(&mut core, rule.id);
        info!(rule = %rule.id, "rule_removed");
        Ok(())
    }

    /// Remove every rule matching the filter. Returns how many went.
    pub fn delete_rules(&self, filter: &RuleFilter) -> usize {
        let mut core = self.lock_core();
        let doomed: Vec<Rule> = core
            .rules
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        core.rules.retain(|r| !filter.matches(r));
        for rule in &doomed {
            self.cancel_rule_timer(&mut core, rule.id);
        }
        if !doomed.is_empty() {
            info!(count = doomed.len(), "rules_deleted");
        }
        doomed.len()
    }

    /// Remove all rules and their timers.
    pub fn clear_rules(&self) {
        let mut core = self.lock_core();
        let ids: Vec<RuleId> = core.rules.iter().map(|r| r.id).collect();
        core.rules.clear();
        for id in ids {
            self.cancel_rule_timer(&mut core, id);
        }
        info!("rules_cleared");
    }

    /// Snapshot of the rule table in insertion order.
    pub fn rules(&self) -> Vec<Rule> {
        self.lock_core().rules.clone()
    }

    // =========================================================================
    // Pipelines
    // =========================================================================

    /// Register a pipeline for rules to launch by name.
    pub fn register_pipeline(&self, pipeline: Pipeline) {
        self.lock_core()
            .pipelines
            .insert(pipeline.name.clone(), pipeline);
    }

    /// Launch a registered pipeline, fire-and-forget.
    pub fn launch_pipeline(&self, name: &str) -> MachineResult<()> {
        let pipeline = self
            .lock_core()
            .pipelines
            .get(name)
            .cloned()
            .ok_or_else(|| MachineError::UnknownPipeline {
                name: name.to_string(),
            })?;
        let engine = self.clone();
        tokio::spawn(run_pipeline(engine, pipeline));
        Ok(())
    }

    // =========================================================================
    // Watchers
    // =========================================================================

    /// Watchers that should be running right now for a sensor kind: the
    /// current state's reactive block plus enabled rule-level watchers whose
    /// source pattern matches the current state.
    pub fn active_watchers(&self, kind: SensorKind) -> Vec<ActiveWatcher> {
        let core = self.lock_core();
        let mut out = Vec::new();

        if let Some(state) = core.states.get(&core.current) {
            if let Some(config) = state.reactive(kind) {
                if config.enabled {
                    out.push(ActiveWatcher {
                        key: format!("state:{}:{}", state.name, kind.label()),
                        kind,
                        config: config.clone(),
                    });
                }
            }
        }

        for rule in &core.rules {
            if let TriggerConfig::Watcher {
                kind: rule_kind,
                config,
            } = &rule.trigger_config
            {
                if *rule_kind == kind
                    && rule.enabled
                    && config.enabled
                    && rule.source.matches(&core.current)
                {
                    let mut config = config.clone();
                    // The rule's trigger is the event the watcher emits.
                    if config.event.is_none() {
                        config.event = Some(rule.trigger.clone());
                    }
                    out.push(ActiveWatcher {
                        key: format!("rule:{}", rule.id.0),
                        kind,
                        config,
                    });
                }
            }
        }

        out
    }

    // =========================================================================
    // Legacy free-running interval loop
    // =========================================================================

    /// Start the legacy free-running animation loop: `callback` runs every
    /// `interval_ms` until [`Engine::stop_interval`]. Only one loop runs at
    /// a time; starting a new one replaces the old. Callback errors are
    /// logged per tick and the loop continues.
    pub fn start_interval<F>(&self, callback: F, interval_ms: u64)
    where
        F: FnMut() -> MachineResult<()> + Send + 'static,
    {
        let mut core = self.lock_core();
        if let Some(timer) = core.legacy_timer.take() {
            self.inner.scheduler.cancel(timer);
        }
        core.legacy_epoch += 1;
        let epoch = core.legacy_epoch;
        let callback: Arc<Mutex<dyn FnMut() -> MachineResult<()> + Send>> =
            Arc::new(Mutex::new(callback));
        let engine = self.clone();
        let cb = callback.clone();
        let timer = self
            .inner
            .scheduler
            .schedule_after(Duration::from_millis(interval_ms), move || {
                engine.legacy_tick(epoch, cb, interval_ms);
            });
        core.legacy_timer = Some(timer);
        debug!(interval_ms, "interval_loop_started");
    }

    /// Stop the legacy animation loop, if running.
    pub fn stop_interval(&self) {
        let mut core = self.lock_core();
        core.legacy_epoch += 1;
        if let Some(timer) = core.legacy_timer.take() {
            self.inner.scheduler.cancel(timer);
            debug!("interval_loop_stopped");
        }
    }

    fn legacy_tick(
        &self,
        epoch: u64,
        callback: Arc<Mutex<dyn FnMut() -> MachineResult<()> + Send>>,
        interval_ms: u64,
    ) {
        {
            let core = self.lock_core();
            if core.legacy_epoch != epoch || core.legacy_timer.is_none() {
                return;
            }
        }

        // Run the callback outside the core lock; it may call back in.
        let result = {
            let mut cb = callback.lock().expect("interval callback lock");
            (&mut *cb)()
        };
        if let Err(e) = result {
            warn!(error = %e, "interval_callback_error");
        }

        let mut core = self.lock_core();
        if core.legacy_epoch != epoch {
            return;
        }
        let engine = self.clone();
        let cb = callback.clone();
        let timer = self
            .inner
            .scheduler
            .schedule_after(Duration::from_millis(interval_ms), move || {
                engine.legacy_tick(epoch, cb, interval_ms);
            });
        core.legacy_timer = Some(timer);
    }

    // =========================================================================
    // Reset
    // =========================================================================

    /// Stop all timers and renders and clear the data store. With
    /// `restore_defaults`, also drop every user state and rule, reinstall
    /// the built-in toggle rules, and re-enter the default state.
    pub fn reset(&self, restore_defaults: bool) {
        let mut core = self.lock_core();
        info!(restore_defaults, "engine_reset");

        // Cancel everything before touching state, so a just-fired timer
        // cannot act on stale rules.
        self.inner.scheduler.cancel_all();
        core.render_timer = None;
        core.duration_timer = None;
        core.rule_timers.clear();
        core.legacy_timer = None;
        core.legacy_epoch += 1;
        core.state_epoch += 1;
        self.inner.data.clear();

        if restore_defaults {
            core.states = States::new();
            core.rules.clear();
            self.install_default_rules_locked(&mut core);
            let default_state = self.inner.config.default_state.clone();
            self.set_state_locked(&mut core, &default_state, 0);
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.inner.core.lock().expect("engine core lock")
    }

    fn guard_hooks(&self) -> StoreHooks {
        StoreHooks::with_clock(self.inner.data.clone())
    }

    fn render_hooks(&self) -> StoreHooks {
        StoreHooks::new(self.inner.data.clone())
    }

    fn install_default_rules_locked(&self, core: &mut Core) {
        for (from, to) in [("off", "on"), ("on", "off")] {
            let spec = RuleSpec::transition(from, EVENT_BUTTON_CLICK, to);
            if let Err(e) = self.add_rule_locked(core, spec) {
                warn!(error = %e, "default_rule_install_failed");
            }
        }
    }

    fn set_state_locked(&self, core: &mut Core, name: &str, depth: usize) {
        if depth >= MAX_CHAIN {
            warn!(state = name, depth, "transition_chain_cut");
            return;
        }

        core.state_epoch += 1;
        if let Some(timer) = core.render_timer.take() {
            self.inner.scheduler.cancel(timer);
        }
        if let Some(timer) = core.duration_timer.take() {
            self.inner.scheduler.cancel(timer);
        }

        let previous = std::mem::replace(&mut core.current, name.to_string());
        info!(from = %previous, to = name, "engine_transition");

        let state = core.states.get(name).cloned();
        match &state {
            Some(state) => core.executor.enter(state),
            None => {
                let fallback = match name {
                    "on" => Some(Rgb::WHITE),
                    "off" => Some(Rgb::BLACK),
                    _ => None,
                };
                if fallback.is_none() {
                    debug!(state = name, "set_state_unknown_name");
                }
                core.executor.enter_fallback(name, fallback);
            }
        }

        self.render_once_locked(core, depth);

        // Arm the fixed-duration auto-transition, if configured.
        if let Some(state) = state {
            if let (Some(duration_ms), Some(then)) = (state.duration_ms, state.then.clone()) {
                let epoch = core.state_epoch;
                let engine = self.clone();
                let timer = self
                    .inner
                    .scheduler
                    .schedule_after(Duration::from_millis(duration_ms), move || {
                        engine.duration_fired(epoch, &then);
                    });
                core.duration_timer = Some(timer);
            }
        }
    }

    /// Render one frame for the current state and act on the report:
    /// push output, schedule the next tick, dispatch completion.
    fn render_once_locked(&self, core: &mut Core, depth: usize) {
        let hooks = self.render_hooks();
        let report = core.executor.render_frame(&hooks);

        if report.changed {
            self.inner.device.push_frame(&report.frame);
        }

        match report.next {
            RenderNext::After(ms) => {
                let ms = ms.max(self.inner.config.render_floor_ms);
                let epoch = core.state_epoch;
                let engine = self.clone();
                let timer = self
                    .inner
                    .scheduler
                    .schedule_after(Duration::from_millis(ms), move || {
                        engine.render_tick(epoch);
                    });
                core.render_timer = Some(timer);
            }
            RenderNext::Static => {}
            RenderNext::Complete => {}
        }

        if report.completed_now {
            self.execute_transition_locked(core, EVENT_STATE_COMPLETE, depth + 1);
        }
    }

    fn render_tick(&self, epoch: u64) {
        let mut core = self.lock_core();
        if core.state_epoch != epoch {
            // A transition happened after this tick was armed.
            return;
        }
        core.render_timer = None;
        self.render_once_locked(&mut core, 0);
    }

    fn duration_fired(&self, epoch: u64, target: &str) {
        let mut core = self.lock_core();
        if core.state_epoch != epoch {
            return;
        }
        core.duration_timer = None;
        debug!(target, "state_duration_elapsed");
        self.set_state_locked(&mut core, target, 0);
    }

    fn execute_transition_locked(&self, core: &mut Core, event: &str, depth: usize) -> bool {
        if depth >= MAX_CHAIN {
            warn!(event, depth, "transition_chain_cut");
            return false;
        }

        let mut candidates: Vec<usize> = core
            .rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| {
                rule.enabled && rule.trigger == event && rule.source.matches(&core.current)
            })
            .map(|(index, _)| index)
            .collect();
        // Stable sort: priority descending, insertion order breaks ties.
        candidates.sort_by_key(|&index| std::cmp::Reverse(core.rules[index].priority));

        for index in candidates {
            let rule = core.rules[index].clone();
            if !self.condition_passes(&rule) {
                continue;
            }
            debug!(rule = %rule.id, event, "rule_selected");
            self.fire_rule_locked(core, &rule, depth);
            return true;
        }

        debug!(event, state = %core.current, "transition_no_match");
        false
    }

    /// Evaluate a rule's guard. Failures pass (fail-open): a bad condition
    /// must not freeze the machine.
    fn condition_passes(&self, rule: &Rule) -> bool {
        let Some(condition) = &rule.condition else {
            return true;
        };
        let hooks = self.guard_hooks();
        match Condition::compile(condition).and_then(|c| c.eval(&hooks)) {
            Ok(passed) => passed,
            Err(e) => {
                warn!(rule = %rule.id, error = %e, "condition_error_fail_open");
                true
            }
        }
    }

    fn fire_rule_locked(&self, core: &mut Core, rule: &Rule, depth: usize) {
        if let Some(action) = &rule.action {
            let hooks = self.guard_hooks();
            if let Err(e) = ActionProgram::compile(action).and_then(|p| p.run(&hooks)) {
                warn!(rule = %rule.id, error = %e, "action_error_ignored");
            }
        }

        if let Some(pipeline) = &rule.pipeline {
            match core.pipelines.get(pipeline).cloned() {
                Some(pipeline) => {
                    let engine = self.clone();
                    tokio::spawn(run_pipeline(engine, pipeline));
                }
                None => warn!(rule = %rule.id, pipeline = %pipeline, "pipeline_unknown"),
            }
        }

        if let Some(target) = &rule.target {
            let target = target.clone();
            self.set_state_locked(core, &target, depth + 1);
        }
    }

    fn add_rule_locked(&self, core: &mut Core, spec: RuleSpec) -> MachineResult<RuleId> {
        let id = RuleId(core.next_rule_id);
        core.next_rule_id += 1;
        let rule = spec.into_rule(id)?;

        if let Some(position) = core.rules.iter().position(|r| r.same_key(&rule)) {
            let old = core.rules[position].clone();
            self.cancel_rule_timer(core, old.id);
            core.rules[position] = rule.clone();
            info!(rule = %rule.id, replaced = %old.id, "rule_replaced");
        } else {
            core.rules.push(rule.clone());
            debug!(rule = %rule.id, trigger = %rule.trigger, "rule_added");
        }

        self.arm_rule_trigger(core, &rule);
        Ok(id)
    }

    fn cancel_rule_timer(&self, core: &mut Core, id: RuleId) {
        if let Some(timer) = core.rule_timers.remove(&id) {
            self.inner.scheduler.cancel(timer);
        }
    }

    fn arm_rule_trigger(&self, core: &mut Core, rule: &Rule) {
        let delay = match &rule.trigger_config {
            TriggerConfig::Timer { delay_ms, .. } => Duration::from_millis(*delay_ms),
            TriggerConfig::Interval { period_ms, .. } => Duration::from_millis(*period_ms),
            TriggerConfig::Schedule { at, .. } => match parse_schedule_time(at) {
                Ok((hour, minute)) => {
                    Duration::from_secs(ClockTime::now().seconds_until(hour, minute))
                }
                Err(e) => {
                    warn!(rule = %rule.id, error = %e, "schedule_arm_failed");
                    return;
                }
            },
            TriggerConfig::None | TriggerConfig::Watcher { .. } => return,
        };

        let id = rule.id;
        let engine = self.clone();
        let timer = self
            .inner
            .scheduler
            .schedule_after(delay, move || engine.rule_timer_fired(id));
        core.rule_timers.insert(id, timer);
    }

    fn rule_timer_fired(&self, id: RuleId) {
        let mut core = self.lock_core();
        core.rule_timers.remove(&id);

        let Some(rule) = core.rules.iter().find(|r| r.id == id).cloned() else {
            // Removed after the timer was armed; nothing to do.
            return;
        };

        // Re-check the source still matches at fire time, guarding against
        // stale fires after the user moved on.
        let state_matches = rule.source.matches(&core.current);
        if rule.enabled && state_matches && self.condition_passes(&rule) {
            debug!(rule = %rule.id, trigger = %rule.trigger, "rule_timer_fire");
            self.fire_rule_locked(&mut core, &rule, 0);
        } else {
            debug!(rule = %rule.id, state_matches, "rule_timer_skip");
        }

        match &rule.trigger_config {
            TriggerConfig::Timer { auto_cleanup, .. } => {
                if *auto_cleanup {
                    core.rules.retain(|r| r.id != id);
                    debug!(rule = %rule.id, "rule_auto_cleanup");
                }
            }
            TriggerConfig::Interval { repeat, .. } => {
                if *repeat && core.rules.iter().any(|r| r.id == id) {
                    self.arm_rule_trigger(&mut core, &rule);
                }
            }
            TriggerConfig::Schedule { repeat_daily, .. } => {
                if *repeat_daily {
                    self.arm_rule_trigger(&mut core, &rule);
                } else {
                    core.rules.retain(|r| r.id != id);
                    debug!(rule = %rule.id, "schedule_rule_spent");
                }
            }
            TriggerConfig::None | TriggerConfig::Watcher { .. } => {}
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.lock_core();
        f.debug_struct("Engine")
            .field("current", &core.current)
            .field("states", &core.states.len())
            .field("rules", &core.rules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumo_core::RecordingDevice;

    fn engine_with_device() -> (Engine, Arc<RecordingDevice>) {
        let device = Arc::new(RecordingDevice::new());
        let engine = Engine::with_defaults(device.clone());
        (engine, device)
    }

    #[tokio::test]
    async fn test_default_toggle_sequence() {
        let (engine, _device) = engine_with_device();
        assert_eq!(engine.current_state(), "off");

        assert!(engine.execute_transition(EVENT_BUTTON_CLICK));
        assert_eq!(engine.current_state(), "on");

        assert!(engine.execute_transition(EVENT_BUTTON_CLICK));
        assert_eq!(engine.current_state(), "off");
    }

    #[tokio::test]
    async fn test_builtin_colors() {
        let (engine, device) = engine_with_device();
        engine.set_state("on");
        assert_eq!(device.last(), Some(Rgb::WHITE));
        engine.set_state("off");
        assert_eq!(device.last(), Some(Rgb::BLACK));
    }

    #[tokio::test]
    async fn test_unmapped_event_is_noop() {
        let (engine, _device) = engine_with_device();
        assert!(!engine.execute_transition("quadruple_click"));
        assert_eq!(engine.current_state(), "off");
    }

    #[tokio::test]
    async fn test_static_code_state_renders_and_stays() {
        let (engine, device) = engine_with_device();
        engine.add_state(State::code("red", "return rgb(255, 0, 0)"));
        engine.set_state("red");
        assert_eq!(engine.current_state(), "red");
        assert_eq!(device.last(), Some(Rgb(255, 0, 0)));
    }

    #[tokio::test]
    async fn test_priority_order_and_ties() {
        let (engine, _device) = engine_with_device();
        engine.clear_rules();
        engine.add_state(State::code("low", "return rgb(1,1,1)"));
        engine.add_state(State::code("high", "return rgb(2,2,2)"));
        engine.add_state(State::code("first", "return rgb(3,3,3)"));

        engine
            .add_rules(vec![
                serde_json::from_value(serde_json::json!(
                    {"from": "off", "on": "go", "to": "low", "priority": 0}
                ))
                .unwrap(),
                serde_json::from_value(serde_json::json!(
                    {"from": "off", "on": "go", "to": "high", "priority": 5}
                ))
                .unwrap(),
            ])
            .unwrap();

        engine.execute_transition("go");
        assert_eq!(engine.current_state(), "high");

        // Tie on priority: insertion order wins. Conditions differ so the
        // rules occupy distinct dedup slots.
        engine.set_state("off");
        engine.clear_rules();
        engine
            .add_rules(vec![
                serde_json::from_value(serde_json::json!(
                    {"from": "off", "on": "go", "to": "first", "condition": "1 == 1"}
                ))
                .unwrap(),
                RuleSpec::transition("off", "go", "low"),
            ])
            .unwrap();
        engine.execute_transition("go");
        assert_eq!(engine.current_state(), "first");
    }

    #[tokio::test]
    async fn test_condition_gates_and_fails_open() {
        let (engine, _device) = engine_with_device();
        engine.clear_rules();
        engine.add_state(State::code("bright", "return rgb(9,9,9)"));

        engine
            .add_rule(
                serde_json::from_value(serde_json::json!({
                    "from": "off", "on": "auto", "to": "bright",
                    "condition": "getData(\"lux\", 100) < 10",
                }))
                .unwrap(),
            )
            .unwrap();

        // Condition false: no transition.
        engine.set_variable("lux", json!(50));
        assert!(!engine.execute_transition("auto"));
        assert_eq!(engine.current_state(), "off");

        // Condition true: fires.
        engine.set_variable("lux", json!(3));
        assert!(engine.execute_transition("auto"));
        assert_eq!(engine.current_state(), "bright");

        // Broken condition: fail-open.
        engine.set_state("off");
        engine.clear_rules();
        engine
            .add_rule(
                serde_json::from_value(serde_json::json!({
                    "from": "off", "on": "auto", "to": "bright",
                    "condition": "nonsense(((",
                }))
                .unwrap(),
            )
            .unwrap();
        assert!(engine.execute_transition("auto"));
        assert_eq!(engine.current_state(), "bright");
    }

    #[tokio::test]
    async fn test_action_side_effect_runs_before_transition() {
        let (engine, _device) = engine_with_device();
        engine.clear_rules();
        engine
            .add_rule(
                serde_json::from_value(serde_json::json!({
                    "from": "*", "on": "count",
                    "action": "setData(\"clicks\", getData(\"clicks\", 0) + 1)",
                }))
                .unwrap(),
            )
            .unwrap();

        engine.execute_transition("count");
        engine.execute_transition("count");
        assert_eq!(engine.data().get("clicks"), Some(json!(2.0)));
        // Side-effect-only rule keeps the current state.
        assert_eq!(engine.current_state(), "off");
    }

    #[tokio::test]
    async fn test_dedup_replaces_and_count_stable() {
        let (engine, _device) = engine_with_device();
        engine.clear_rules();

        engine
            .add_rule(RuleSpec::transition("off", "go", "a"))
            .unwrap();
        let before = engine.rules().len();
        engine
            .add_rule(RuleSpec::transition("off", "go", "b"))
            .unwrap();
        let rules = engine.rules();
        assert_eq!(rules.len(), before);
        assert_eq!(rules[0].target.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_wildcard_and_prefix_sources() {
        let (engine, _device) = engine_with_device();
        engine.clear_rules();
        engine.add_state(State::code("night/dim", "return rgb(5,5,5)"));
        engine.add_state(State::code("panic", "return rgb(255,0,0)"));

        engine
            .add_rules(vec![
                RuleSpec::transition("*", "alarm", "panic"),
                RuleSpec::transition("night/*", "dawn", "off"),
            ])
            .unwrap();

        engine.set_state("night/dim");
        assert!(engine.execute_transition("dawn"));
        assert_eq!(engine.current_state(), "off");

        engine.set_state("night/dim");
        assert!(engine.execute_transition("alarm"));
        assert_eq!(engine.current_state(), "panic");

        // Prefix pattern does not match unrelated states.
        assert!(!engine.execute_transition("dawn"));
    }

    #[tokio::test]
    async fn test_state_complete_dispatch() {
        let (engine, _device) = engine_with_device();
        engine.clear_rules();
        engine.add_state(State::code("flash", "return rgb(255,255,255), 0"));
        engine
            .add_rule(RuleSpec::transition("flash", EVENT_STATE_COMPLETE, "off"))
            .unwrap();

        engine.set_state("flash");
        // Completion fires synchronously from the first render.
        assert_eq!(engine.current_state(), "off");
    }

    #[tokio::test(start_paused = true)]
    async fn test_animated_state_schedules_renders() {
        let (engine, device) = engine_with_device();
        engine.add_state(State::code(
            "fade",
            "return rgb(clamp(t * 1000, 0, 255), 0, 0), 20",
        ));
        engine.set_state("fade");
        let initial = device.push_count();

        tokio::time::sleep(Duration::from_millis(100)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(device.push_count() > initial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_rule_auto_cleanup() {
        let (engine, _device) = engine_with_device();
        engine.clear_rules();
        engine
            .add_rule(
                serde_json::from_value(serde_json::json!({
                    "from": "*", "on": "timer", "to": "off",
                    "trigger_config": {"delay_ms": 100, "auto_cleanup": true},
                }))
                .unwrap(),
            )
            .unwrap();
        engine.set_state("on");
        assert_eq!(engine.rules().len(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(engine.current_state(), "off");
        assert!(engine.rules().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_skips_when_state_moved_on() {
        let (engine, _device) = engine_with_device();
        engine.clear_rules();
        engine.add_state(State::code("read", "return rgb(255,200,120)"));
        engine
            .add_rule(
                serde_json::from_value(serde_json::json!({
                    "from": "on", "on": "timer", "to": "off",
                    "trigger_config": {"delay_ms": 100},
                }))
                .unwrap(),
            )
            .unwrap();
        engine.set_state("on");

        // User moves on before the timer fires.
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.set_state("read");

        tokio::time::sleep(Duration::from_millis(100)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(engine.current_state(), "read");
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_rule_repeats_until_removed() {
        let (engine, _device) = engine_with_device();
        engine.clear_rules();
        engine
            .add_rule(
                serde_json::from_value(serde_json::json!({
                    "from": "*", "on": "interval",
                    "action": "setData(\"ticks\", getData(\"ticks\", 0) + 1)",
                    "trigger_config": {"period_ms": 50},
                }))
                .unwrap(),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(175)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        let ticks = engine.data().get("ticks").unwrap().as_f64().unwrap();
        assert!(ticks >= 2.0);

        engine.clear_rules();
        tokio::time::sleep(Duration::from_millis(200)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        let after = engine.data().get("ticks").unwrap().as_f64().unwrap();
        // One in-flight fire may land; no further reschedules happen.
        assert!(after <= ticks + 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_auto_transition() {
        let (engine, _device) = engine_with_device();
        engine.add_state(
            State::code("flash", "return rgb(255,255,255)").with_duration(200, "off"),
        );
        engine.set_state("flash");
        assert_eq!(engine.current_state(), "flash");

        tokio::time::sleep(Duration::from_millis(250)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(engine.current_state(), "off");
    }

    #[tokio::test]
    async fn test_color_continuity_through_set_state() {
        let (engine, device) = engine_with_device();
        engine.add_state(State::code("red", "return rgb(200, 0, 0)"));
        engine.add_state(State::code("hold", "return prev"));

        engine.set_state("red");
        engine.set_state("hold");
        assert_eq!(device.last(), Some(Rgb(200, 0, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_interval_loop_continues_after_error() {
        let (engine, _device) = engine_with_device();
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let c = count.clone();
        engine.start_interval(
            move || {
                let n = c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n == 1 {
                    Err(MachineError::Callback {
                        message: "transient".to_string(),
                    })
                } else {
                    Ok(())
                }
            },
            50,
        );

        tokio::time::sleep(Duration::from_millis(260)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        // The error tick did not kill the loop.
        assert!(count.load(std::sync::atomic::Ordering::SeqCst) >= 4);

        engine.stop_interval();
        let stopped_at = count.load(std::sync::atomic::Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(count.load(std::sync::atomic::Ordering::SeqCst) <= stopped_at + 1);
    }

    #[tokio::test]
    async fn test_reset_restores_defaults() {
        let (engine, _device) = engine_with_device();
        engine.add_state(State::code("party", "return hsv(t * 120, 1, 1), 33"));
        engine
            .add_rule(RuleSpec::transition("party", "stop", "off"))
            .unwrap();
        engine.set_variable("mood", json!("wild"));
        engine.set_state("party");

        engine.reset(true);

        assert_eq!(engine.current_state(), "off");
        assert!(engine.data().is_empty());
        assert!(engine.states_listing().is_empty());
        // Only the two toggle rules remain.
        assert_eq!(engine.rules().len(), 2);
        assert!(engine.execute_transition(EVENT_BUTTON_CLICK));
        assert_eq!(engine.current_state(), "on");
    }

    #[tokio::test]
    async fn test_get_state_and_details() {
        let (engine, _device) = engine_with_device();
        engine.add_state(State::code("glow", "return rgb(3,3,3)").with_description("soft glow"));
        engine.set_state("glow");

        let params = engine.get_state();
        assert_eq!(params["name"], "glow");
        assert_eq!(params["description"], "soft glow");

        engine.set_state("off");
        let params = engine.get_state();
        assert_eq!(params["builtin"], true);

        let details = engine.get_details();
        assert_eq!(details["current_state"], "off");
        assert!(details["states"].as_array().unwrap().len() == 1);
        assert!(details["rules"].as_array().unwrap().len() >= 2);
    }

    #[tokio::test]
    async fn test_active_watchers_collection() {
        let (engine, _device) = engine_with_device();
        engine.add_state(
            State::code("watchful", "return prev").with_reactive(
                SensorKind::Vision,
                ReactiveConfig {
                    enabled: true,
                    detector: Some("motion".to_string()),
                    interval_ms: 500,
                    event: Some("vision_motion".to_string()),
                    ..Default::default()
                },
            ),
        );
        engine
            .add_rule(
                serde_json::from_value(serde_json::json!({
                    "from": "*", "on": "vision_person", "to": "on",
                    "watcher": {"kind": "vision", "enabled": true, "detector": "llm",
                                "prompt": "is someone there?"},
                }))
                .unwrap(),
            )
            .unwrap();

        engine.set_state("watchful");
        let watchers = engine.active_watchers(SensorKind::Vision);
        assert_eq!(watchers.len(), 2);
        // The rule-level watcher inherits its event from the rule trigger.
        let rule_watcher = watchers.iter().find(|w| w.key.starts_with("rule:")).unwrap();
        assert_eq!(rule_watcher.config.event.as_deref(), Some("vision_person"));

        engine.set_state("off");
        let watchers = engine.active_watchers(SensorKind::Vision);
        // Only the wildcard rule watcher remains active.
        assert_eq!(watchers.len(), 1);
    }

    #[tokio::test]
    async fn test_rule_timer_replaced_on_dedup() {
        let (engine, _device) = engine_with_device();
        engine.clear_rules();
        engine
            .add_rule(
                serde_json::from_value(serde_json::json!({
                    "from": "*", "on": "timer", "to": "on",
                    "trigger_config": {"delay_ms": 60_000},
                }))
                .unwrap(),
            )
            .unwrap();
        // Same dedup key, fresh timer config.
        engine
            .add_rule(
                serde_json::from_value(serde_json::json!({
                    "from": "*", "on": "timer", "to": "off",
                    "trigger_config": {"delay_ms": 120_000},
                }))
                .unwrap(),
            )
            .unwrap();
        assert_eq!(engine.rules().len(), 1);
        assert_eq!(engine.rules()[0].target.as_deref(), Some("off"));
    }
}
