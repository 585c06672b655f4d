//! Rule engine, state renderer, and scheduler for the Lumo lamp.
//!
//! This crate is the interpreter at the heart of the lamp: it stores named
//! [`State`]s (static colors or animated render functions), conditional
//! transition [`Rule`]s triggered by discrete events, and drives a render
//! loop that feeds RGB frames to an output device.
//!
//! ## Core Concepts
//!
//! - **State**: a named behavior; render code or legacy channel expressions
//! - **Rule**: `(source, trigger) -> target` with optional guard, action,
//!   priority, and scheduling config
//! - **Engine**: owns the current state, dispatches events, and schedules
//!   renders and timers through one scheduler task
//! - **Executor**: compiles the current state and produces frames with
//!   color continuity across transitions
//! - **Pipeline**: fire-and-forget side-effect sequences launched by rules
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumo_core::NullDevice;
//! use lumo_machine::{Engine, RuleSpec, State};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let engine = Engine::with_defaults(Arc::new(NullDevice));
//!
//! engine.add_state(State::code(
//!     "pulse_blue",
//!     "let w = (sin(t * tau) + 1) / 2\n\
//!      return lerp_color(rgb(0,0,40), rgb(0,0,255), w), 33",
//! ));
//! engine.add_rule(RuleSpec::transition("on", "double_click", "pulse_blue"))?;
//!
//! engine.execute_transition("button_click"); // off -> on
//! engine.execute_transition("double_click"); // on -> pulse_blue
//! # Ok(())
//! # }
//! ```

mod config;
mod engine;
mod error;
mod executor;
mod pipeline;
mod rule;
mod scheduler;
mod state;
mod states;
pub mod store;

pub use config::{EngineConfig, CONFIG_FILENAME};
pub use engine::{ActiveWatcher, Engine, RuleFilter, EVENT_BUTTON_CLICK};
pub use error::{MachineError, MachineResult};
pub use executor::{Executor, FrameReport};
pub use pipeline::{run_pipeline, Pipeline, PipelineStep};
pub use rule::{
    parse_schedule_time, RawTriggerConfig, Rule, RuleBody, RuleId, RuleSpec, SourcePattern,
    TriggerConfig, WatcherSpec, EVENT_STATE_COMPLETE, TRIGGER_INTERVAL, TRIGGER_SCHEDULE,
    TRIGGER_TIMER,
};
pub use state::{ReactiveConfig, SensorKind, State, StateRepr};
pub use states::States;
pub use store::{JsonStore, MemoryStore, PipelineStore};
