//! Rule model: conditional transitions between states.

use std::sync::OnceLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{MachineError, MachineResult};
use crate::state::{ReactiveConfig, SensorKind};

/// Trigger names with scheduler-backed semantics.
pub const TRIGGER_TIMER: &str = "timer";
pub const TRIGGER_INTERVAL: &str = "interval";
pub const TRIGGER_SCHEDULE: &str = "schedule";

/// The event synthesized when a render function reports completion.
pub const EVENT_STATE_COMPLETE: &str = "state_complete";

/// Unique identifier for a rule, assigned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub u64);

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rule#{}", self.0)
    }
}

/// A source-state pattern: exact name, `*`, or `prefix/*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePattern(String);

impl SourcePattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `*` matches everything; `foo/*` matches names starting with `foo/`;
    /// otherwise exact equality.
    pub fn matches(&self, state: &str) -> bool {
        if self.0 == "*" {
            return true;
        }
        if let Some(prefix) = self.0.strip_suffix('*') {
            if prefix.ends_with('/') {
                return state.starts_with(prefix);
            }
        }
        self.0 == state
    }
}

impl From<&str> for SourcePattern {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Scheduling/watcher parameters attached to a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerConfig {
    #[default]
    None,

    /// One-shot: fire after `delay_ms`.
    Timer { delay_ms: u64, auto_cleanup: bool },

    /// Repeating: fire every `period_ms` while the rule is present.
    Interval { period_ms: u64, repeat: bool },

    /// Fire at the next local `HH:MM`, optionally daily.
    Schedule { at: String, repeat_daily: bool },

    /// Sensor watcher: the rule's trigger is the event the watcher emits.
    Watcher {
        kind: SensorKind,
        config: ReactiveConfig,
    },
}

/// A conditional transition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub source: SourcePattern,
    pub trigger: String,
    pub target: Option<String>,
    pub condition: Option<String>,
    pub action: Option<String>,
    pub priority: i32,
    pub enabled: bool,
    pub pipeline: Option<String>,
    pub trigger_config: TriggerConfig,
}

impl Rule {
    /// Whether `other` occupies the same dedup slot:
    /// `(source, trigger, condition)` with literal condition equality.
    pub fn same_key(&self, other: &Rule) -> bool {
        self.source == other.source
            && self.trigger == other.trigger
            && self.condition == other.condition
    }
}

// =============================================================================
// Incoming rule specifications
// =============================================================================

fn default_true() -> bool {
    true
}

/// Raw trigger parameters as supplied by callers.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct RawTriggerConfig {
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub auto_cleanup: Option<bool>,
    #[serde(default, alias = "interval_ms")]
    pub period_ms: Option<u64>,
    #[serde(default)]
    pub repeat: Option<bool>,
    #[serde(default, alias = "time")]
    pub at: Option<String>,
    #[serde(default)]
    pub repeat_daily: Option<bool>,
}

/// Rule-level watcher attachment.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WatcherSpec {
    pub kind: SensorKind,
    #[serde(flatten)]
    pub config: ReactiveConfig,
}

/// A rule as supplied by callers: the full form with `from`/`on`/`to`
/// aliases, or the legacy `[source, trigger, target]` 3-tuple shorthand.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RuleSpec {
    Triple(String, String, String),
    Full(RuleBody),
}

/// The full rule form.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RuleBody {
    #[serde(alias = "from", alias = "state1")]
    pub source: String,

    #[serde(alias = "on", alias = "transition")]
    pub trigger: String,

    #[serde(default, alias = "to", alias = "state2")]
    pub target: Option<String>,

    #[serde(default)]
    pub condition: Option<String>,

    #[serde(default)]
    pub action: Option<String>,

    #[serde(default)]
    pub priority: i32,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub pipeline: Option<String>,

    #[serde(default)]
    pub trigger_config: Option<RawTriggerConfig>,

    #[serde(default)]
    pub watcher: Option<WatcherSpec>,
}

impl RuleSpec {
    /// Shorthand for a plain `(source, trigger, target)` rule.
    pub fn transition(
        source: impl Into<String>,
        trigger: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        RuleSpec::Triple(source.into(), trigger.into(), target.into())
    }

    /// Normalize into a [`Rule`] (without an id; the engine assigns one).
    pub fn into_rule(self, id: RuleId) -> MachineResult<Rule> {
        let body = match self {
            RuleSpec::Triple(source, trigger, target) => RuleBody {
                source,
                trigger,
                target: Some(target),
                condition: None,
                action: None,
                priority: 0,
                enabled: true,
                pipeline: None,
                trigger_config: None,
                watcher: None,
            },
            RuleSpec::Full(body) => body,
        };

        if body.source.is_empty() {
            return Err(MachineError::InvalidRule {
                message: "source state must not be empty".to_string(),
            });
        }
        if body.trigger.is_empty() {
            return Err(MachineError::InvalidRule {
                message: "trigger must not be empty".to_string(),
            });
        }

        let trigger_config = resolve_trigger_config(&body.trigger, body.trigger_config, body.watcher)?;

        Ok(Rule {
            id,
            source: SourcePattern::new(body.source),
            trigger: body.trigger,
            target: body.target,
            condition: body.condition,
            action: body.action,
            priority: body.priority,
            enabled: body.enabled,
            pipeline: body.pipeline,
            trigger_config,
        })
    }
}

fn resolve_trigger_config(
    trigger: &str,
    raw: Option<RawTriggerConfig>,
    watcher: Option<WatcherSpec>,
) -> MachineResult<TriggerConfig> {
    if let Some(watcher) = watcher {
        return Ok(TriggerConfig::Watcher {
            kind: watcher.kind,
            config: watcher.config,
        });
    }

    let raw = raw.unwrap_or_default();
    match trigger {
        TRIGGER_TIMER => Ok(TriggerConfig::Timer {
            delay_ms: raw.delay_ms.unwrap_or(1000),
            auto_cleanup: raw.auto_cleanup.unwrap_or(false),
        }),
        TRIGGER_INTERVAL => Ok(TriggerConfig::Interval {
            period_ms: raw.period_ms.or(raw.delay_ms).unwrap_or(1000),
            repeat: raw.repeat.unwrap_or(true),
        }),
        TRIGGER_SCHEDULE => {
            let at = raw.at.ok_or_else(|| MachineError::InvalidRule {
                message: "schedule rules require `at` (HH:MM)".to_string(),
            })?;
            parse_schedule_time(&at)?;
            Ok(TriggerConfig::Schedule {
                at,
                repeat_daily: raw.repeat_daily.unwrap_or(false),
            })
        }
        _ => Ok(TriggerConfig::None),
    }
}

/// Parse an `HH:MM` schedule time into `(hour, minute)`.
pub fn parse_schedule_time(value: &str) -> MachineResult<(u32, u32)> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| Regex::new(r"^([01]?\d|2[0-3]):([0-5]\d)$").expect("schedule regex"));
    let caps = re
        .captures(value)
        .ok_or_else(|| MachineError::InvalidScheduleTime {
            value: value.to_string(),
        })?;
    let hour = caps[1].parse().expect("regex-validated hour");
    let minute = caps[2].parse().expect("regex-validated minute");
    Ok((hour, minute))
}
