//! The states collection: insertion-ordered, name-unique.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::state::{State, StateRepr};

/// Ordered collection of states, unique by name.
///
/// Inserting a duplicate name replaces the value while keeping the
/// original position, so listings stay stable as the agent iterates on a
/// behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct States {
    items: Vec<State>,
}

impl States {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Returns `true` when an existing state was
    /// overwritten.
    pub fn add(&mut self, state: State) -> bool {
        if let Some(existing) = self.items.iter_mut().find(|s| s.name == state.name) {
            info!(name = %state.name, "state_replaced");
            *existing = state;
            true
        } else {
            debug!(name = %state.name, "state_added");
            self.items.push(state);
            false
        }
    }

    /// Remove by name. Returns `false` (and logs) when absent.
    pub fn delete(&mut self, name: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|s| s.name != name);
        let removed = self.items.len() < before;
        if removed {
            info!(name, "state_deleted");
        } else {
            debug!(name, "state_delete_missing");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<&State> {
        self.items.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &State> {
        self.items.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Name + description pairs, for agent context-building.
    pub fn listing(&self) -> Vec<(String, String)> {
        self.items
            .iter()
            .map(|s| (s.name.clone(), s.description.clone()))
            .collect()
    }

    /// Human-readable parameter dump for LLM prompts.
    pub fn prompt_dump(&self) -> String {
        let mut out = String::new();
        for state in &self.items {
            out.push_str(&format!("- {}", state.name));
            if !state.description.is_empty() {
                out.push_str(&format!(": {}", state.description));
            }
            out.push('\n');
            match &state.repr {
                StateRepr::Code { code } => {
                    out.push_str(&format!("    code: {}\n", code.replace('\n', " / ")));
                }
                StateRepr::Channels { r, g, b, speed } => {
                    out.push_str(&format!("    r: {r}  g: {g}  b: {b}\n"));
                    match speed {
                        Some(ms) => out.push_str(&format!("    speed: every {ms} ms\n")),
                        None => out.push_str("    speed: static\n"),
                    }
                }
            }
            if let (Some(duration), Some(then)) = (state.duration_ms, &state.then) {
                out.push_str(&format!("    after {duration} ms -> {then}\n"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_replaces_in_place() {
        let mut states = States::new();
        states.add(State::code("a", "return rgb(1,1,1)"));
        states.add(State::code("b", "return rgb(2,2,2)"));
        states.add(State::code("c", "return rgb(3,3,3)"));

        let replaced = states.add(State::code("b", "return rgb(9,9,9)"));
        assert!(replaced);
        assert_eq!(states.len(), 3);
        assert_eq!(states.names(), vec!["a", "b", "c"]);
        match &states.get("b").unwrap().repr {
            StateRepr::Code { code } => assert!(code.contains("9,9,9")),
            _ => panic!("expected code repr"),
        }
    }

    #[test]
    fn test_delete_missing_is_reported_noop() {
        let mut states = States::new();
        states.add(State::code("a", "return prev"));
        assert!(!states.delete("ghost"));
        assert!(states.delete("a"));
        assert!(states.is_empty());
    }

    #[test]
    fn test_prompt_dump_mentions_every_state() {
        let mut states = States::new();
        states.add(State::code("pulse", "return prev, 40").with_description("pulsing"));
        states.add(State::channels("solid", "255", "0", "0", None));
        let dump = states.prompt_dump();
        assert!(dump.contains("pulse: pulsing"));
        assert!(dump.contains("solid"));
        assert!(dump.contains("static"));
    }
}
