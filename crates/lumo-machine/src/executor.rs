//! State executor: compiles a state into a running render program.
//!
//! Lifecycle per state entry: Uncompiled -> Compiled -> Rendering ->
//! (Completed | Replaced). The executor owns color continuity: the previous
//! state's last primary color seeds the next state's `prev`, so behaviors
//! like "brighten the current color" read what was actually showing.

use lumo_core::{Frame, Rgb};
use lumo_expr::{ExprError, HostHooks, LegacyProgram, RenderNext, RenderProgram};
// tokio's Instant so paused-clock tests see the same time the scheduler does;
// outside a runtime it falls back to the system clock.
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::state::{State, StateRepr};

enum Compiled {
    Code(RenderProgram),
    Legacy(LegacyProgram),
    /// Holds a fixed color; produced by fallback entry or compile failure.
    Inert,
}

/// Result of one render tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame: Frame,
    /// The frame differs from the previously pushed one.
    pub changed: bool,
    pub next: RenderNext,
    /// Completion latched this tick (at most once per state entry).
    pub completed_now: bool,
}

/// Compiles states and drives their render functions over elapsed time.
pub struct Executor {
    compiled: Compiled,
    prev: Rgb,
    last_frame: Option<Frame>,
    entered_at: Instant,
    completed: bool,
    last_interval: Option<u64>,
    state_name: String,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self {
            compiled: Compiled::Inert,
            prev: Rgb::BLACK,
            last_frame: None,
            entered_at: Instant::now(),
            completed: false,
            last_interval: None,
            state_name: String::new(),
        }
    }

    /// The primary color of the most recent frame.
    pub fn current_color(&self) -> Rgb {
        self.prev
    }

    /// Enter a state with a stored definition.
    ///
    /// Compile failures leave the executor inert (holding the previous
    /// color); state entry itself never fails.
    pub fn enter(&mut self, state: &State) {
        self.compiled = match compile(&state.repr) {
            Ok(compiled) => compiled,
            Err(e) => {
                warn!(state = %state.name, error = %e, "state_compile_failed");
                Compiled::Inert
            }
        };
        self.begin(&state.name);
    }

    /// Enter a name with no stored definition. `color` overrides the
    /// carried-forward seed (used for the built-in on/off colors); `None`
    /// holds the previous output.
    pub fn enter_fallback(&mut self, name: &str, color: Option<Rgb>) {
        self.compiled = Compiled::Inert;
        if let Some(color) = color {
            self.prev = color;
        }
        self.begin(name);
    }

    fn begin(&mut self, name: &str) {
        self.state_name = name.to_string();
        self.last_frame = None;
        self.entered_at = Instant::now();
        self.completed = false;
        self.last_interval = None;
        debug!(state = name, seed = %self.prev, "executor_enter");
    }

    /// Render one frame at the current elapsed time.
    ///
    /// Runtime errors hold the previous color and keep the last cadence, so
    /// one bad frame never tears the loop down.
    pub fn render_frame(&mut self, hooks: &dyn HostHooks) -> FrameReport {
        if self.completed {
            return FrameReport {
                frame: Frame::solid(self.prev),
                changed: false,
                next: RenderNext::Static,
                completed_now: false,
            };
        }

        let t = self.entered_at.elapsed().as_secs_f64();
        let result = match &self.compiled {
            Compiled::Code(program) => program.render(self.prev, t, hooks),
            Compiled::Legacy(program) => program.render(self.prev, t, hooks),
            Compiled::Inert => Ok(lumo_expr::FrameOutput {
                frame: Frame::solid(self.prev),
                next: RenderNext::Static,
            }),
        };

        match result {
            Ok(out) => {
                if let RenderNext::After(ms) = out.next {
                    self.last_interval = Some(ms);
                }
                let completed_now = out.next == RenderNext::Complete;
                if completed_now {
                    self.completed = true;
                    debug!(state = %self.state_name, "state_render_complete");
                }
                let changed = self.last_frame.as_ref() != Some(&out.frame);
                self.prev = out.frame.primary;
                self.last_frame = Some(out.frame.clone());
                FrameReport {
                    frame: out.frame,
                    changed,
                    next: out.next,
                    completed_now,
                }
            }
            Err(e) => {
                warn!(state = %self.state_name, error = %e, "render_frame_error");
                let next = match self.last_interval {
                    Some(ms) => RenderNext::After(ms),
                    None => RenderNext::Static,
                };
                FrameReport {
                    frame: Frame::solid(self.prev),
                    changed: false,
                    next,
                    completed_now: false,
                }
            }
        }
    }
}

fn compile(repr: &StateRepr) -> Result<Compiled, ExprError> {
    match repr {
        StateRepr::Code { code } => Ok(Compiled::Code(RenderProgram::compile(code)?)),
        StateRepr::Channels { r, g, b, speed } => Ok(Compiled::Legacy(LegacyProgram::compile(
            r, g, b, *speed,
        )?)),
    }
}
