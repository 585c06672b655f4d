//! Pipelines: multi-step side-effect sequences triggered by rules.
//!
//! Pipelines run on their own spawned task, fire-and-forget from the
//! engine's perspective: `execute_transition` never blocks on one, and a
//! failing step is logged and skipped without touching machine state.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use lumo_expr::{ActionProgram, StoreHooks};

use crate::engine::Engine;

/// A named sequence of side-effect steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Pipeline {
    pub name: String,
    pub steps: Vec<PipelineStep>,
}

/// One pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum PipelineStep {
    /// Write a value into the shared data store.
    SetData { key: String, value: Value },

    /// Sleep for a fixed time.
    Wait { ms: u64 },

    /// Switch the machine to a state.
    SetState { state: String },

    /// Dispatch an event against the rule table.
    Fire { event: String },

    /// Run a sandbox action body.
    Eval { code: String },
}

/// Run a pipeline to completion on the current task.
///
/// Spawned by the engine via `tokio::spawn`; step failures are logged and
/// the remaining steps still run.
pub async fn run_pipeline(engine: Engine, pipeline: Pipeline) {
    info!(pipeline = %pipeline.name, steps = pipeline.steps.len(), "pipeline_start");

    for (index, step) in pipeline.steps.iter().enumerate() {
        debug!(pipeline = %pipeline.name, index, "pipeline_step");
        match step {
            PipelineStep::SetData { key, value } => {
                engine.data().set(key.clone(), value.clone());
            }
            PipelineStep::Wait { ms } => {
                tokio::time::sleep(std::time::Duration::from_millis(*ms)).await;
            }
            PipelineStep::SetState { state } => {
                engine.set_state(state);
            }
            PipelineStep::Fire { event } => {
                engine.execute_transition(event);
            }
            PipelineStep::Eval { code } => {
                let hooks = StoreHooks::with_clock(engine.data());
                match ActionProgram::compile(code) {
                    Ok(program) => {
                        if let Err(e) = program.run(&hooks) {
                            warn!(pipeline = %pipeline.name, index, error = %e, "pipeline_eval_error");
                        }
                    }
                    Err(e) => {
                        warn!(pipeline = %pipeline.name, index, error = %e, "pipeline_eval_compile_error");
                    }
                }
            }
        }
    }

    info!(pipeline = %pipeline.name, "pipeline_done");
}
