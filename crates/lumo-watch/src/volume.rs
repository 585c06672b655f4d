//! Volume runtime: continuous level samples, EMA-smoothed per session.

use std::sync::Arc;

use async_trait::async_trait;
use lumo_machine::{Engine, ReactiveConfig, SensorKind};
use serde_json::json;

use crate::detector::{DetectContext, Detection, Detector, DetectorSet, SensorInput};
use crate::error::{WatchError, WatchResult};
use crate::runtime::run_cycle;
use crate::session::{SessionRegistry, WatcherSession};

/// Reports raw and smoothed level; fires the configured event while the
/// smoothed level is at or above the threshold.
#[derive(Debug, Default)]
pub struct LevelDetector;

#[async_trait]
impl Detector for LevelDetector {
    fn name(&self) -> &str {
        "level"
    }

    async fn detect(
        &self,
        input: &SensorInput,
        config: &ReactiveConfig,
        _ctx: &DetectContext<'_>,
    ) -> WatchResult<Detection> {
        let SensorInput::Level { raw, smoothed } = input else {
            return Err(WatchError::detector(self.name(), "expected a level sample"));
        };
        let triggered = config.threshold.is_some_and(|t| *smoothed >= t);
        let event = if triggered { config.event.clone() } else { None };
        Ok(Detection::new(
            self.name(),
            json!({"level": raw, "smoothed": smoothed, "triggered": triggered}),
        )
        .with_event(event))
    }
}

/// The level-sample-facing runtime (microphone RMS, ambient light, ...).
pub struct VolumeRuntime {
    engine: Engine,
    detectors: DetectorSet,
    sessions: SessionRegistry,
}

impl VolumeRuntime {
    pub fn new(engine: Engine) -> Self {
        let detectors = DetectorSet::new("level").with(Arc::new(LevelDetector));
        Self {
            engine,
            detectors,
            sessions: SessionRegistry::new(),
        }
    }

    pub fn register_detector(&mut self, detector: Arc<dyn Detector>) {
        self.detectors.register(detector);
    }

    pub fn session(&self, id: &str) -> Arc<WatcherSession> {
        self.sessions.get_or_create(id)
    }

    /// Ingest one level sample (typically 0.0..=1.0) for a session.
    pub async fn ingest_level(&self, session_id: &str, level: f64) {
        let session = self.sessions.get_or_create(session_id);
        let alpha = self.engine.config().ema_alpha;
        let smoothed = session.smooth(SensorKind::Volume.data_key(), level, alpha);
        let input = SensorInput::Level {
            raw: level,
            smoothed,
        };
        run_cycle(
            &self.engine,
            &session,
            SensorKind::Volume,
            &self.detectors,
            &input,
        )
        .await;
    }
}
