//! Agent-facing tool registry for the Lumo lamp engine.
//!
//! A thin validation + dispatch layer: each exposed operation validates its
//! arguments, translates into the corresponding [`lumo_machine::Engine`]
//! call, and returns a structured `{"success": ...}` JSON value. Nothing
//! here panics or raises to the caller; failures come back as text the LLM
//! can react to.
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumo_core::NullDevice;
//! use lumo_machine::Engine;
//! use lumo_tools::ToolRegistry;
//! use serde_json::json;
//!
//! # fn demo() {
//! let tools = ToolRegistry::new(Engine::with_defaults(Arc::new(NullDevice)));
//! let result = tools.dispatch(
//!     "create_state",
//!     json!({"name": "pulse_blue", "code": "return rgb(0,0,255), 33"}),
//! );
//! assert_eq!(result["success"], json!(true));
//! # }
//! ```

mod args;
mod registry;

pub use args::{
    AppendRulesArgs, CreatePipelineArgs, CreateStateArgs, DeleteRulesArgs, DeleteStateArgs,
    EmptyArgs, RunPipelineArgs, SetStateArgs, SetVariableArgs,
};
pub use registry::{ToolRegistry, ToolSpec};
