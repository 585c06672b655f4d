//! Host bindings and evaluation environments.

use std::collections::HashMap;

use lumo_core::{ClockTime, DataStore};
use serde_json::Value as Json;

use crate::value::Value;

/// Host capabilities injected into an evaluation.
///
/// This is the entire surface the sandbox can reach outside itself: the
/// shared data store and, where the caller allows it, the wall clock.
/// No filesystem, network, process, or import access exists.
pub trait HostHooks: Send + Sync {
    /// Read a key from the shared data store.
    fn get_data(&self, key: &str) -> Option<Json>;

    /// Write a key to the shared data store.
    fn set_data(&self, key: &str, value: Json);

    /// Wall-clock snapshot, if exposed in this context.
    fn clock(&self) -> Option<ClockTime> {
        None
    }
}

/// Hooks for pure evaluations (tests, constant folding): no store, no clock.
#[derive(Debug, Default, Clone)]
pub struct NoHooks;

impl HostHooks for NoHooks {
    fn get_data(&self, _key: &str) -> Option<Json> {
        None
    }

    fn set_data(&self, _key: &str, _value: Json) {}
}

/// Hooks bound to a [`DataStore`], optionally exposing the clock.
///
/// Render code gets `with_clock = false`; guards and actions get `true`.
#[derive(Debug, Clone)]
pub struct StoreHooks {
    data: DataStore,
    with_clock: bool,
}

impl StoreHooks {
    pub fn new(data: DataStore) -> Self {
        Self {
            data,
            with_clock: false,
        }
    }

    pub fn with_clock(data: DataStore) -> Self {
        Self {
            data,
            with_clock: true,
        }
    }
}

impl HostHooks for StoreHooks {
    fn get_data(&self, key: &str) -> Option<Json> {
        self.data.get(key)
    }

    fn set_data(&self, key: &str, value: Json) {
        self.data.set(key, value);
    }

    fn clock(&self) -> Option<ClockTime> {
        if self.with_clock {
            Some(ClockTime::now())
        } else {
            None
        }
    }
}

/// A lexical environment: named variables over a set of host hooks.
pub struct Env<'h> {
    vars: HashMap<String, Value>,
    hooks: &'h dyn HostHooks,
}

impl<'h> Env<'h> {
    pub fn new(hooks: &'h dyn HostHooks) -> Self {
        Self {
            vars: HashMap::new(),
            hooks,
        }
    }

    /// Bind a variable (used for `prev`, `t`, and `let`).
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn hooks(&self) -> &'h dyn HostHooks {
        self.hooks
    }
}
