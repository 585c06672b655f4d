//! Parameter structs for the tool surface.
//!
//! Each tool's arguments derive `JsonSchema` so the agent's tool-calling
//! loop can introspect them via [`crate::ToolRegistry::tool_specs`].

use lumo_machine::{Pipeline, RuleSpec, State};
use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateStateArgs {
    #[serde(flatten)]
    pub state: State,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteStateArgs {
    pub name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetStateArgs {
    pub name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AppendRulesArgs {
    pub rules: Vec<RuleSpec>,
}

/// Deletion selector: `index` for one rule, `all` for everything, or any
/// combination of match fields.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct DeleteRulesArgs {
    #[serde(default)]
    pub index: Option<usize>,

    #[serde(default)]
    pub all: bool,

    #[serde(default, alias = "state1", alias = "from")]
    pub source: Option<String>,

    #[serde(default, alias = "transition", alias = "on")]
    pub trigger: Option<String>,

    #[serde(default, alias = "state2", alias = "to")]
    pub target: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetVariableArgs {
    pub key: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreatePipelineArgs {
    #[serde(flatten)]
    pub pipeline: Pipeline,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunPipelineArgs {
    pub name: String,
}

/// Tools that take no parameters.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct EmptyArgs {}
