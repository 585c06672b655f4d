//! The detection backend seam.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use lumo_machine::ReactiveConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{WatchError, WatchResult};

/// One camera frame: packed RGB8, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl FrameData {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// A solid-color test frame.
    pub fn solid(width: u32, height: u32, r: u8, g: u8, b: u8) -> Self {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..width * height {
            pixels.extend_from_slice(&[r, g, b]);
        }
        Self::new(width, height, pixels)
    }

    /// Mean perceived brightness over all pixels, 0.0..=1.0.
    pub fn mean_luminance(&self) -> f64 {
        if self.pixels.len() < 3 {
            return 0.0;
        }
        let mut sum = 0.0;
        for px in self.pixels.chunks_exact(3) {
            sum += 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64;
        }
        sum / (self.pixels.len() / 3) as f64 / 255.0
    }
}

/// Input handed to a detector, one variant per sensor family.
#[derive(Debug, Clone)]
pub enum SensorInput {
    Frame(FrameData),
    Transcript(String),
    /// Continuous signal sample: raw reading and its per-session EMA.
    Level { raw: f64, smoothed: f64 },
    Fetch { url: String },
}

/// Per-call context a detector may use for session-scoped bookkeeping.
#[derive(Debug, Clone, Copy)]
pub struct DetectContext<'a> {
    pub session_id: &'a str,
}

/// A detection result.
///
/// `observed` carries the value/metric(s) seen; `detector` names the engine
/// that produced it; `event` optionally asks the rule engine to dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub observed: Value,
    pub detector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl Detection {
    pub fn new(detector: impl Into<String>, observed: Value) -> Self {
        Self {
            observed,
            detector: detector.into(),
            event: None,
        }
    }

    pub fn with_event(mut self, event: Option<String>) -> Self {
        self.event = event;
        self
    }

    /// The record written into the shared data store: observed fields
    /// flattened when they form an object, with the detector name attached.
    pub fn into_record(self) -> Value {
        match self.observed {
            Value::Object(mut fields) => {
                fields.insert("detector".to_string(), json!(self.detector));
                if let Some(event) = &self.event {
                    fields.insert("event".to_string(), json!(event));
                }
                Value::Object(fields)
            }
            other => json!({
                "value": other,
                "detector": self.detector,
                "event": self.event,
            }),
        }
    }
}

/// A pluggable detection engine.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Engine name configs refer to.
    fn name(&self) -> &str;

    /// Remote/LLM-backed engines are throttled to a higher interval floor.
    fn is_remote(&self) -> bool {
        false
    }

    async fn detect(
        &self,
        input: &SensorInput,
        config: &ReactiveConfig,
        ctx: &DetectContext<'_>,
    ) -> WatchResult<Detection>;
}

/// Named detector registry with a per-runtime default.
pub struct DetectorSet {
    default_name: String,
    detectors: HashMap<String, Arc<dyn Detector>>,
}

impl DetectorSet {
    pub fn new(default_name: impl Into<String>) -> Self {
        Self {
            default_name: default_name.into(),
            detectors: HashMap::new(),
        }
    }

    pub fn register(&mut self, detector: Arc<dyn Detector>) {
        self.detectors.insert(detector.name().to_string(), detector);
    }

    pub fn with(mut self, detector: Arc<dyn Detector>) -> Self {
        self.register(detector);
        self
    }

    /// Resolve a config's detector, falling back to the runtime default.
    pub fn resolve(&self, config: &ReactiveConfig) -> WatchResult<Arc<dyn Detector>> {
        let name = config.detector.as_deref().unwrap_or(&self.default_name);
        self.detectors
            .get(name)
            .cloned()
            .ok_or_else(|| WatchError::UnknownDetector {
                name: name.to_string(),
            })
    }
}
