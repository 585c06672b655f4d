//! State model: a named lamp behavior plus its reactive configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which sensor runtime a reactive block or watcher rule targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Voice,
    Vision,
    Audio,
    Volume,
    Api,
}

impl SensorKind {
    /// The fixed data-store key this sensor writes under (unless the
    /// config overrides it with `key`).
    pub fn data_key(&self) -> &'static str {
        match self {
            SensorKind::Voice => "voice",
            SensorKind::Vision => "vision",
            SensorKind::Audio => "audio",
            SensorKind::Volume => "volume",
            SensorKind::Api => "api",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SensorKind::Voice => "voice",
            SensorKind::Vision => "vision",
            SensorKind::Audio => "audio",
            SensorKind::Volume => "volume",
            SensorKind::Api => "api",
        }
    }
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_cooldown_ms() -> u64 {
    5000
}

/// Configuration for one sensor watcher.
///
/// Attached either to a state (as a `*_reactive` block) or to a rule (as a
/// rule-level watcher). Unused fields are simply left unset; which fields
/// matter depends on the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReactiveConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Detection engine name ("luminance", "motion", "keyword", "level",
    /// "fetch", "llm", ...).
    #[serde(default)]
    pub detector: Option<String>,

    /// Prompt for LLM-backed detectors, or the keyword list for local
    /// transcript matching.
    #[serde(default)]
    pub prompt: Option<String>,

    /// Model name for LLM-backed detectors.
    #[serde(default)]
    pub model: Option<String>,

    /// Minimum milliseconds between detection runs for this watcher.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Minimum milliseconds between dispatches of this watcher's event.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Event to fire into the rule engine when the detector reports one.
    #[serde(default)]
    pub event: Option<String>,

    /// Data-store key override (API fetches often want their own key).
    #[serde(default)]
    pub key: Option<String>,

    /// URL for API fetch watchers.
    #[serde(default)]
    pub url: Option<String>,

    /// Trigger threshold for continuous signals (volume level).
    #[serde(default)]
    pub threshold: Option<f64>,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            detector: None,
            prompt: None,
            model: None,
            interval_ms: default_interval_ms(),
            cooldown_ms: default_cooldown_ms(),
            event: None,
            key: None,
            url: None,
            threshold: None,
        }
    }
}

/// How a state produces output: render code or legacy channel expressions.
///
/// Exactly one representation is active per state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum StateRepr {
    /// A `render(prev, t)` body in the sandbox language.
    Code { code: String },

    /// Legacy mode: one scalar expression of `t` per channel.
    /// `speed = None` is static; `speed = N` re-renders every N ms.
    Channels {
        r: String,
        g: String,
        b: String,
        #[serde(default)]
        speed: Option<f64>,
    },
}

/// A named lamp behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct State {
    /// Unique key within the states collection.
    pub name: String,

    #[serde(flatten)]
    pub repr: StateRepr,

    /// Auto-transition: after this many milliseconds in the state...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// ...switch to this state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_reactive: Option<ReactiveConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_reactive: Option<ReactiveConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_reactive: Option<ReactiveConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_reactive: Option<ReactiveConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_reactive: Option<ReactiveConfig>,
}

impl State {
    /// Create a code-mode state.
    pub fn code(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repr: StateRepr::Code { code: code.into() },
            duration_ms: None,
            then: None,
            description: String::new(),
            voice_reactive: None,
            vision_reactive: None,
            audio_reactive: None,
            volume_reactive: None,
            api_reactive: None,
        }
    }

    /// Create a legacy channel-expression state.
    pub fn channels(
        name: impl Into<String>,
        r: impl Into<String>,
        g: impl Into<String>,
        b: impl Into<String>,
        speed: Option<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            repr: StateRepr::Channels {
                r: r.into(),
                g: g.into(),
                b: b.into(),
                speed,
            },
            duration_ms: None,
            then: None,
            description: String::new(),
            voice_reactive: None,
            vision_reactive: None,
            audio_reactive: None,
            volume_reactive: None,
            api_reactive: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Auto-transition to `then` after `duration_ms`.
    pub fn with_duration(mut self, duration_ms: u64, then: impl Into<String>) -> Self {
        self.duration_ms = Some(duration_ms);
        self.then = Some(then.into());
        self
    }

    pub fn with_reactive(mut self, kind: SensorKind, config: ReactiveConfig) -> Self {
        match kind {
            SensorKind::Voice => self.voice_reactive = Some(config),
            SensorKind::Vision => self.vision_reactive = Some(config),
            SensorKind::Audio => self.audio_reactive = Some(config),
            SensorKind::Volume => self.volume_reactive = Some(config),
            SensorKind::Api => self.api_reactive = Some(config),
        }
        self
    }

    /// The reactive block for a sensor kind, if any.
    pub fn reactive(&self, kind: SensorKind) -> Option<&ReactiveConfig> {
        match kind {
            SensorKind::Voice => self.voice_reactive.as_ref(),
            SensorKind::Vision => self.vision_reactive.as_ref(),
            SensorKind::Audio => self.audio_reactive.as_ref(),
            SensorKind::Volume => self.volume_reactive.as_ref(),
            SensorKind::Api => self.api_reactive.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_code_state_deserializes() {
        let state: State = serde_json::from_value(json!({
            "name": "pulse_blue",
            "code": "return rgb(0, 0, 255), 33",
            "description": "pulsing blue",
        }))
        .unwrap();
        assert!(matches!(state.repr, StateRepr::Code { .. }));
        assert_eq!(state.description, "pulsing blue");
    }

    #[test]
    fn test_channels_state_deserializes() {
        let state: State = serde_json::from_value(json!({
            "name": "amber",
            "r": "255", "g": "160", "b": "0",
        }))
        .unwrap();
        match state.repr {
            StateRepr::Channels { speed, .. } => assert_eq!(speed, None),
            _ => panic!("expected channels repr"),
        }
    }

    #[test]
    fn test_reactive_block_roundtrip() {
        let state: State = serde_json::from_value(json!({
            "name": "watchful",
            "code": "return prev",
            "vision_reactive": {
                "enabled": true,
                "detector": "motion",
                "interval_ms": 500,
                "event": "vision_motion",
            },
        }))
        .unwrap();
        let cfg = state.reactive(SensorKind::Vision).unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.interval_ms, 500);
        assert_eq!(cfg.event.as_deref(), Some("vision_motion"));
        assert_eq!(cfg.cooldown_ms, 5000);
        assert!(state.reactive(SensorKind::Audio).is_none());
    }

    #[test]
    fn test_duration_builder() {
        let state = State::code("flash", "return rgb(255,255,255), 0").with_duration(2000, "off");
        assert_eq!(state.duration_ms, Some(2000));
        assert_eq!(state.then.as_deref(), Some("off"));
    }
}
