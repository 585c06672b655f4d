//! Tool dispatch: validation + translation into engine calls.

use std::sync::OnceLock;

use lumo_machine::{Engine, RuleFilter, RuleSpec, EVENT_BUTTON_CLICK};
use regex::Regex;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::args::{
    AppendRulesArgs, CreatePipelineArgs, CreateStateArgs, DeleteRulesArgs, DeleteStateArgs,
    EmptyArgs, RunPipelineArgs, SetStateArgs, SetVariableArgs,
};

/// Description of one tool for the agent's tool-calling loop.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: Value,
}

/// Agent-facing mutation surface over an [`Engine`].
///
/// Every operation returns a structured `{"success": true, ...}` or
/// `{"success": false, "error": ...}` value and never panics or raises:
/// errors become text for the LLM to react to.
pub struct ToolRegistry {
    engine: Engine,
}

fn ok(mut extra: Value) -> Value {
    if let Value::Object(fields) = &mut extra {
        fields.insert("success".to_string(), json!(true));
        return extra;
    }
    json!({"success": true})
}

fn err(message: impl std::fmt::Display) -> Value {
    json!({"success": false, "error": message.to_string()})
}

fn valid_state_name(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_/\-]*$").expect("name regex"));
    re.is_match(name)
}

/// Accept both snake_case and camelCase tool names.
fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn parse<T: DeserializeOwned>(args: Value) -> Result<T, Value> {
    serde_json::from_value(args).map_err(|e| err(format!("invalid arguments: {e}")))
}

impl ToolRegistry {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Dispatch a tool call by name.
    pub fn dispatch(&self, name: &str, args: Value) -> Value {
        let normalized = normalize_name(name);
        info!(tool = %normalized, "tool_call");
        match normalized.as_str() {
            "create_state" => match parse::<CreateStateArgs>(args) {
                Ok(args) => self.create_state(args),
                Err(e) => e,
            },
            "delete_state" => match parse::<DeleteStateArgs>(args) {
                Ok(args) => self.delete_state(args),
                Err(e) => e,
            },
            "set_state" => match parse::<SetStateArgs>(args) {
                Ok(args) => self.set_state(args),
                Err(e) => e,
            },
            "append_rules" => match parse::<AppendRulesArgs>(args) {
                Ok(args) => self.append_rules(args),
                Err(e) => e,
            },
            "delete_rules" => match parse::<DeleteRulesArgs>(args) {
                Ok(args) => self.delete_rules(args),
                Err(e) => e,
            },
            "set_variable" => match parse::<SetVariableArgs>(args) {
                Ok(args) => self.set_variable(args),
                Err(e) => e,
            },
            "create_pipeline" => match parse::<CreatePipelineArgs>(args) {
                Ok(args) => self.create_pipeline(args),
                Err(e) => e,
            },
            "run_pipeline" => match parse::<RunPipelineArgs>(args) {
                Ok(args) => self.run_pipeline(args),
                Err(e) => e,
            },
            "get_state" => self.get_state(),
            "get_details" => self.get_details(),
            "run_safety_check" => self.run_safety_check(),
            "reset" => self.reset(),
            other => {
                warn!(tool = other, "tool_unknown");
                err(format!("unknown tool: {other}"))
            }
        }
    }

    /// Specs for every tool, for prompt/context building.
    pub fn tool_specs() -> Vec<ToolSpec> {
        fn spec<T: JsonSchema>(name: &'static str, description: &'static str) -> ToolSpec {
            ToolSpec {
                name,
                description,
                schema: serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null),
            }
        }
        vec![
            spec::<CreateStateArgs>(
                "create_state",
                "Create or replace a named lamp state (render code or r/g/b expressions)",
            ),
            spec::<DeleteStateArgs>("delete_state", "Delete a state by name (on/off are protected)"),
            spec::<SetStateArgs>("set_state", "Switch the lamp to a state immediately"),
            spec::<AppendRulesArgs>(
                "append_rules",
                "Add transition rules; duplicates replace by (source, trigger, condition)",
            ),
            spec::<DeleteRulesArgs>(
                "delete_rules",
                "Delete rules by index, by matching criteria, or all",
            ),
            spec::<SetVariableArgs>("set_variable", "Write a value into the shared data store"),
            spec::<CreatePipelineArgs>("create_pipeline", "Register a named side-effect pipeline"),
            spec::<RunPipelineArgs>("run_pipeline", "Launch a registered pipeline"),
            spec::<EmptyArgs>("get_state", "Get the current state's full parameters"),
            spec::<EmptyArgs>("get_details", "Get all states and rules"),
            spec::<EmptyArgs>(
                "run_safety_check",
                "Add a button_click->off escape rule to any state with no exit",
            ),
            spec::<EmptyArgs>("reset", "Stop everything and restore the default configuration"),
        ]
    }

    // =========================================================================
    // Operations
    // =========================================================================

    pub fn create_state(&self, args: CreateStateArgs) -> Value {
        if !valid_state_name(&args.state.name) {
            return err(format!("invalid state name: {:?}", args.state.name));
        }
        let replaced = self.engine.add_state(args.state);
        ok(json!({"replaced": replaced}))
    }

    pub fn delete_state(&self, args: DeleteStateArgs) -> Value {
        if self.engine.config().is_protected(&args.name) {
            return err(format!("state {:?} is protected", args.name));
        }
        if self.engine.delete_state(&args.name) {
            ok(json!({"deleted": args.name}))
        } else {
            err(format!("unknown state: {}", args.name))
        }
    }

    pub fn set_state(&self, args: SetStateArgs) -> Value {
        if !valid_state_name(&args.name) {
            return err(format!("invalid state name: {:?}", args.name));
        }
        self.engine.set_state(&args.name);
        ok(json!({"state": args.name}))
    }

    pub fn append_rules(&self, args: AppendRulesArgs) -> Value {
        match self.engine.add_rules(args.rules) {
            Ok(ids) => {
                let ids: Vec<u64> = ids.iter().map(|id| id.0).collect();
                ok(json!({"rule_ids": ids}))
            }
            Err(e) => err(e),
        }
    }

    pub fn delete_rules(&self, args: DeleteRulesArgs) -> Value {
        if let Some(index) = args.index {
            return match self.engine.remove_rule(index) {
                Ok(()) => ok(json!({"deleted": 1})),
                Err(e) => err(e),
            };
        }
        if args.all {
            let count = self.engine.rules().len();
            self.engine.clear_rules();
            return ok(json!({"deleted": count}));
        }
        if args.source.is_none() && args.trigger.is_none() && args.target.is_none() {
            return err("delete_rules needs index, all, or matching criteria");
        }
        let filter = RuleFilter {
            source: args.source,
            trigger: args.trigger,
            target: args.target,
        };
        ok(json!({"deleted": self.engine.delete_rules(&filter)}))
    }

    pub fn set_variable(&self, args: SetVariableArgs) -> Value {
        self.engine.set_variable(args.key.clone(), args.value);
        ok(json!({"key": args.key}))
    }

    pub fn create_pipeline(&self, args: CreatePipelineArgs) -> Value {
        let name = args.pipeline.name.clone();
        self.engine.register_pipeline(args.pipeline);
        ok(json!({"pipeline": name}))
    }

    pub fn run_pipeline(&self, args: RunPipelineArgs) -> Value {
        match self.engine.launch_pipeline(&args.name) {
            Ok(()) => ok(json!({"launched": args.name})),
            Err(e) => err(e),
        }
    }

    pub fn get_state(&self) -> Value {
        ok(json!({"state": self.engine.get_state()}))
    }

    pub fn get_details(&self) -> Value {
        ok(json!({"details": self.engine.get_details()}))
    }

    pub fn reset(&self) -> Value {
        self.engine.reset(true);
        ok(json!({"state": self.engine.current_state()}))
    }

    /// Scan for "unreachable exit" states: any non-`off` state with no rule
    /// whose source matches it gets a `(state, button_click, off)` escape
    /// rule, so generated configurations can never strand the user.
    /// Idempotent: the added rule itself satisfies the scan next time.
    pub fn run_safety_check(&self) -> Value {
        let rules = self.engine.rules();
        let mut escaped = Vec::new();

        for (name, _) in self.engine.states_listing() {
            if name == "off" {
                continue;
            }
            let has_exit = rules.iter().any(|rule| rule.source.matches(&name));
            if has_exit {
                continue;
            }
            let spec = RuleSpec::transition(name.clone(), EVENT_BUTTON_CLICK, "off");
            match self.engine.add_rule(spec) {
                Ok(_) => {
                    info!(state = %name, "safety_escape_added");
                    escaped.push(name);
                }
                Err(e) => warn!(state = %name, error = %e, "safety_escape_failed"),
            }
        }

        ok(json!({"escape_rules_added": escaped}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumo_core::NullDevice;
    use lumo_machine::State;
    use std::sync::Arc;

    fn registry() -> ToolRegistry {
        let engine = Engine::with_defaults(Arc::new(NullDevice));
        ToolRegistry::new(engine)
    }

    #[tokio::test]
    async fn test_create_and_set_state() {
        let tools = registry();
        let result = tools.dispatch(
            "create_state",
            json!({"name": "red", "code": "return rgb(255, 0, 0)"}),
        );
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["replaced"], json!(false));

        let result = tools.dispatch("set_state", json!({"name": "red"}));
        assert_eq!(result["success"], json!(true));
        assert_eq!(tools.engine().current_state(), "red");
    }

    #[tokio::test]
    async fn test_camel_case_names_accepted() {
        let tools = registry();
        let result = tools.dispatch(
            "createState",
            json!({"name": "blue", "code": "return rgb(0, 0, 255)"}),
        );
        assert_eq!(result["success"], json!(true));
    }

    #[tokio::test]
    async fn test_protected_states_refuse_deletion() {
        let tools = registry();
        let result = tools.dispatch("delete_state", json!({"name": "off"}));
        assert_eq!(result["success"], json!(false));
        assert!(result["error"].as_str().unwrap().contains("protected"));
    }

    #[tokio::test]
    async fn test_delete_missing_state_is_structured_error() {
        let tools = registry();
        let result = tools.dispatch("delete_state", json!({"name": "ghost"}));
        assert_eq!(result["success"], json!(false));
        assert!(result["error"].as_str().unwrap().contains("unknown state"));
    }

    #[tokio::test]
    async fn test_invalid_name_rejected() {
        let tools = registry();
        let result = tools.dispatch(
            "create_state",
            json!({"name": "../etc", "code": "return prev"}),
        );
        assert_eq!(result["success"], json!(false));
    }

    #[tokio::test]
    async fn test_append_and_delete_rules() {
        let tools = registry();
        let result = tools.dispatch(
            "append_rules",
            json!({"rules": [
                ["off", "go", "on"],
                {"from": "on", "on": "timer", "to": "off",
                 "trigger_config": {"delay_ms": 60000}},
            ]}),
        );
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["rule_ids"].as_array().unwrap().len(), 2);

        let result = tools.dispatch("delete_rules", json!({"trigger": "timer"}));
        assert_eq!(result["deleted"], json!(1));

        let result = tools.dispatch("delete_rules", json!({}));
        assert_eq!(result["success"], json!(false));

        let result = tools.dispatch("delete_rules", json!({"all": true}));
        assert_eq!(result["success"], json!(true));
        assert!(tools.engine().rules().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_not_panic() {
        let tools = registry();
        let result = tools.dispatch("order_pizza", json!({}));
        assert_eq!(result["success"], json!(false));
        assert!(result["error"].as_str().unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn test_malformed_args_are_reported() {
        let tools = registry();
        let result = tools.dispatch("set_state", json!({"nom": "typo"}));
        assert_eq!(result["success"], json!(false));
        assert!(result["error"].as_str().unwrap().contains("invalid arguments"));
    }

    #[tokio::test]
    async fn test_safety_check_adds_escape_once() {
        let tools = registry();
        tools.engine().add_state(State::code("trap", "return rgb(1,1,1)"));
        tools.engine().add_state(State::code("fine", "return rgb(2,2,2)"));
        tools
            .engine()
            .add_rule(RuleSpec::transition("fine", "leave", "off"))
            .unwrap();

        let result = tools.run_safety_check();
        assert_eq!(result["escape_rules_added"], json!(["trap"]));

        // Idempotent: nothing added the second time.
        let result = tools.run_safety_check();
        assert_eq!(result["escape_rules_added"], json!([]));

        // The escape actually works.
        tools.engine().set_state("trap");
        tools.engine().execute_transition(EVENT_BUTTON_CLICK);
        assert_eq!(tools.engine().current_state(), "off");
    }

    #[tokio::test]
    async fn test_get_state_and_details() {
        let tools = registry();
        tools.dispatch(
            "create_state",
            json!({"name": "glow", "code": "return rgb(9,9,9)", "description": "soft"}),
        );
        tools.dispatch("set_state", json!({"name": "glow"}));

        let state = tools.dispatch("get_state", json!({}));
        assert_eq!(state["state"]["name"], json!("glow"));

        let details = tools.dispatch("get_details", json!({}));
        assert_eq!(details["details"]["current_state"], json!("glow"));
    }

    #[tokio::test]
    async fn test_set_variable() {
        let tools = registry();
        let result = tools.dispatch("set_variable", json!({"key": "mood", "value": "cozy"}));
        assert_eq!(result["success"], json!(true));
        assert_eq!(tools.engine().data().get("mood"), Some(json!("cozy")));
    }

    #[tokio::test]
    async fn test_reset_tool() {
        let tools = registry();
        tools.dispatch(
            "create_state",
            json!({"name": "x", "code": "return prev"}),
        );
        tools.dispatch("set_variable", json!({"key": "k", "value": 1}));
        let result = tools.dispatch("reset", json!({}));
        assert_eq!(result["success"], json!(true));
        assert!(tools.engine().states_listing().is_empty());
        assert!(tools.engine().data().is_empty());
    }

    #[test]
    fn test_tool_specs_have_schemas() {
        let specs = ToolRegistry::tool_specs();
        assert!(specs.len() >= 10);
        let create = specs.iter().find(|s| s.name == "create_state").unwrap();
        assert!(create.schema.is_object());
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("createState"), "create_state");
        assert_eq!(normalize_name("runSafetyCheck"), "run_safety_check");
        assert_eq!(normalize_name("get_details"), "get_details");
    }
}
