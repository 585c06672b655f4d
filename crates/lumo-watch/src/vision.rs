//! Vision runtime: camera frames in, detections out.
//!
//! Frame ingestion uses a latest-frame-only mailbox per session: if a frame
//! arrives while another is being analyzed it replaces the pending one
//! rather than queueing, so at most one analysis is in flight and at most
//! one frame waits behind it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lumo_machine::{Engine, ReactiveConfig, SensorKind};
use serde_json::json;

use crate::detector::{
    DetectContext, Detection, Detector, DetectorSet, FrameData, SensorInput,
};
use crate::error::{WatchError, WatchResult};
use crate::runtime::run_cycle;
use crate::session::{SessionRegistry, WatcherSession};

/// Reports mean frame brightness; fires the configured event when it
/// crosses the config threshold.
#[derive(Debug, Default)]
pub struct LuminanceDetector;

#[async_trait]
impl Detector for LuminanceDetector {
    fn name(&self) -> &str {
        "luminance"
    }

    async fn detect(
        &self,
        input: &SensorInput,
        config: &ReactiveConfig,
        _ctx: &DetectContext<'_>,
    ) -> WatchResult<Detection> {
        let SensorInput::Frame(frame) = input else {
            return Err(WatchError::detector(self.name(), "expected a frame input"));
        };
        let luminance = frame.mean_luminance();
        let triggered = config.threshold.is_some_and(|t| luminance >= t);
        let event = if triggered { config.event.clone() } else { None };
        Ok(
            Detection::new(self.name(), json!({"luminance": luminance, "triggered": triggered}))
                .with_event(event),
        )
    }
}

/// Tracks per-session brightness deltas; fires on sudden change.
#[derive(Debug, Default)]
pub struct MotionDetector {
    last_luminance: Mutex<HashMap<String, f64>>,
}

impl MotionDetector {
    /// Default luminance delta treated as motion.
    pub const DEFAULT_THRESHOLD: f64 = 0.08;
}

#[async_trait]
impl Detector for MotionDetector {
    fn name(&self) -> &str {
        "motion"
    }

    async fn detect(
        &self,
        input: &SensorInput,
        config: &ReactiveConfig,
        ctx: &DetectContext<'_>,
    ) -> WatchResult<Detection> {
        let SensorInput::Frame(frame) = input else {
            return Err(WatchError::detector(self.name(), "expected a frame input"));
        };
        let luminance = frame.mean_luminance();
        let delta = {
            let mut last = self.last_luminance.lock().expect("motion detector lock");
            let delta = last
                .get(ctx.session_id)
                .map(|prev| (luminance - prev).abs());
            last.insert(ctx.session_id.to_string(), luminance);
            delta
        };

        let threshold = config.threshold.unwrap_or(Self::DEFAULT_THRESHOLD);
        let moved = delta.is_some_and(|d| d >= threshold);
        let event = if moved { config.event.clone() } else { None };
        Ok(Detection::new(
            self.name(),
            json!({"luminance": luminance, "delta": delta, "motion": moved}),
        )
        .with_event(event))
    }
}

/// The camera-facing runtime.
pub struct VisionRuntime {
    engine: Engine,
    detectors: DetectorSet,
    sessions: SessionRegistry,
}

impl VisionRuntime {
    pub fn new(engine: Engine) -> Self {
        let detectors = DetectorSet::new("luminance")
            .with(Arc::new(LuminanceDetector))
            .with(Arc::new(MotionDetector::default()));
        Self {
            engine,
            detectors,
            sessions: SessionRegistry::new(),
        }
    }

    /// Add or replace a detection engine.
    pub fn register_detector(&mut self, detector: Arc<dyn Detector>) {
        self.detectors.register(detector);
    }

    pub fn session(&self, id: &str) -> Arc<WatcherSession> {
        self.sessions.get_or_create(id)
    }

    /// Ingest one camera frame for a session.
    ///
    /// Processes the frame through every active vision watcher, looping
    /// through newer frames that arrived meanwhile. Concurrent callers for
    /// the same session coalesce through the mailbox.
    pub async fn ingest_frame(&self, session_id: &str, frame: FrameData) {
        let session = self.sessions.get_or_create(session_id);
        let mut current = match session.begin_or_enqueue(SensorInput::Frame(frame)) {
            Some(input) => input,
            // Another analysis is in flight; it will pick this frame up.
            None => return,
        };

        loop {
            run_cycle(
                &self.engine,
                &session,
                SensorKind::Vision,
                &self.detectors,
                &current,
            )
            .await;

            match session.next_or_finish() {
                Some(next) => current = next,
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumo_core::NullDevice;
    use lumo_machine::{EngineConfig, State};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn vision_engine() -> Engine {
        let engine = Engine::new(Arc::new(NullDevice), EngineConfig::default());
        engine.add_state(State::code("watchful", "return prev").with_reactive(
            SensorKind::Vision,
            ReactiveConfig {
                enabled: true,
                detector: Some("luminance".to_string()),
                interval_ms: 0,
                threshold: Some(0.5),
                event: Some("vision_bright".to_string()),
                cooldown_ms: 0,
                ..Default::default()
            },
        ));
        engine.set_state("watchful");
        engine
    }

    #[tokio::test]
    async fn test_frame_writes_vision_key() {
        let engine = vision_engine();
        let runtime = VisionRuntime::new(engine.clone());

        runtime
            .ingest_frame("cam0", FrameData::solid(8, 8, 255, 255, 255))
            .await;

        let record = engine.data().get("vision").unwrap();
        assert_eq!(record["detector"], json!("luminance"));
        assert!(record["luminance"].as_f64().unwrap() > 0.9);
        assert_eq!(record["triggered"], json!(true));
    }

    #[tokio::test]
    async fn test_event_fires_through_rules() {
        let engine = vision_engine();
        engine
            .add_rule(lumo_machine::RuleSpec::transition(
                "watchful",
                "vision_bright",
                "off",
            ))
            .unwrap();
        let runtime = VisionRuntime::new(engine.clone());

        runtime
            .ingest_frame("cam0", FrameData::solid(8, 8, 255, 255, 255))
            .await;
        assert_eq!(engine.current_state(), "off");
    }

    #[tokio::test]
    async fn test_no_active_watchers_is_noop() {
        let engine = Engine::new(Arc::new(NullDevice), EngineConfig::default());
        let runtime = VisionRuntime::new(engine.clone());
        runtime
            .ingest_frame("cam0", FrameData::solid(4, 4, 9, 9, 9))
            .await;
        assert_eq!(engine.data().get("vision"), None);
    }

    #[tokio::test]
    async fn test_motion_detector_needs_two_frames() {
        let engine = Engine::new(Arc::new(NullDevice), EngineConfig::default());
        engine.add_state(State::code("guard", "return prev").with_reactive(
            SensorKind::Vision,
            ReactiveConfig {
                enabled: true,
                detector: Some("motion".to_string()),
                interval_ms: 0,
                event: Some("vision_motion".to_string()),
                cooldown_ms: 0,
                ..Default::default()
            },
        ));
        engine.set_state("guard");
        let runtime = VisionRuntime::new(engine.clone());

        runtime
            .ingest_frame("cam0", FrameData::solid(4, 4, 0, 0, 0))
            .await;
        let first = engine.data().get("vision").unwrap();
        assert_eq!(first["motion"], json!(false));

        runtime
            .ingest_frame("cam0", FrameData::solid(4, 4, 255, 255, 255))
            .await;
        let second = engine.data().get("vision").unwrap();
        assert_eq!(second["motion"], json!(true));
    }

    /// Slow detector used to exercise the mailbox.
    struct SlowCountingDetector {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Detector for SlowCountingDetector {
        fn name(&self) -> &str {
            "slow"
        }

        async fn detect(
            &self,
            _input: &SensorInput,
            _config: &ReactiveConfig,
            _ctx: &DetectContext<'_>,
        ) -> WatchResult<Detection> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(Detection::new("slow", json!({"ok": true})))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mailbox_bounds_analyses() {
        let engine = Engine::new(Arc::new(NullDevice), EngineConfig::default());
        engine.add_state(State::code("s", "return prev").with_reactive(
            SensorKind::Vision,
            ReactiveConfig {
                enabled: true,
                detector: Some("slow".to_string()),
                interval_ms: 0,
                ..Default::default()
            },
        ));
        engine.set_state("s");

        let calls = Arc::new(AtomicUsize::new(0));
        let mut runtime = VisionRuntime::new(engine.clone());
        runtime.register_detector(Arc::new(SlowCountingDetector {
            calls: calls.clone(),
        }));
        let runtime = Arc::new(runtime);

        // Three frames submitted while the first is still processing:
        // frame 1 runs, frames 2 and 3 coalesce to just frame 3.
        let f1 = runtime.ingest_frame("cam0", FrameData::solid(2, 2, 1, 1, 1));
        let f2 = runtime.ingest_frame("cam0", FrameData::solid(2, 2, 2, 2, 2));
        let f3 = runtime.ingest_frame("cam0", FrameData::solid(2, 2, 3, 3, 3));
        tokio::join!(f1, f2, f3);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
