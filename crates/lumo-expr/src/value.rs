//! Runtime values.

use std::collections::BTreeMap;

use lumo_core::Rgb;
use serde_json::Value as Json;

use crate::error::{ExprError, ExprResult};

/// A sandbox runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Color(Rgb),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Truthiness: `null`, `false`, `0`, `""`, and empty collections are false.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Color(_) => true,
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
        }
    }

    /// Short type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Color(_) => "color",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Require a number.
    pub fn as_num(&self) -> ExprResult<f64> {
        match self {
            Value::Num(n) => Ok(*n),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            other => Err(ExprError::type_err(format!(
                "expected number, got {}",
                other.type_name()
            ))),
        }
    }

    /// Require a string.
    pub fn as_str(&self) -> ExprResult<&str> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(ExprError::type_err(format!(
                "expected string, got {}",
                other.type_name()
            ))),
        }
    }

    /// Interpret the value as an RGB color.
    ///
    /// Accepts a color value or a 3-element numeric list.
    pub fn as_color(&self) -> ExprResult<Rgb> {
        match self {
            Value::Color(c) => Ok(*c),
            Value::List(items) if items.len() == 3 => {
                let r = items[0].as_num()?;
                let g = items[1].as_num()?;
                let b = items[2].as_num()?;
                Ok(Rgb::from_f64(r, g, b))
            }
            other => Err(ExprError::type_err(format!(
                "expected color or [r,g,b] list, got {}",
                other.type_name()
            ))),
        }
    }

    /// Render as display text (used by string concatenation).
    pub fn display(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Value::Str(s) => s.clone(),
            Value::Color(c) => c.to_string(),
            Value::List(_) | Value::Map(_) => self.to_json().to_string(),
        }
    }

    /// Convert to JSON (colors become `[r, g, b]` arrays).
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Num(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Str(s) => Json::String(s.clone()),
            Value::Color(c) => serde_json::json!([c.r(), c.g(), c.b()]),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Convert from JSON.
    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Num(n.as_f64().unwrap_or(0.0)),
            Json::String(s) => Value::Str(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            Json::Object(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Rgb> for Value {
    fn from(color: Rgb) -> Self {
        Value::Color(color)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}
