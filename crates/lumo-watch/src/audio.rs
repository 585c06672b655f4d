//! Audio runtime: transcripts in, keyword detections out.

use std::sync::Arc;

use async_trait::async_trait;
use lumo_machine::{Engine, ReactiveConfig, SensorKind};
use serde_json::json;

use crate::detector::{DetectContext, Detection, Detector, DetectorSet, SensorInput};
use crate::error::{WatchError, WatchResult};
use crate::runtime::run_cycle;
use crate::session::{SessionRegistry, WatcherSession};

/// Matches transcript text against the config's comma-separated keyword
/// list (`prompt`), case-insensitively.
#[derive(Debug, Default)]
pub struct KeywordDetector;

#[async_trait]
impl Detector for KeywordDetector {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn detect(
        &self,
        input: &SensorInput,
        config: &ReactiveConfig,
        _ctx: &DetectContext<'_>,
    ) -> WatchResult<Detection> {
        let SensorInput::Transcript(text) = input else {
            return Err(WatchError::detector(self.name(), "expected a transcript"));
        };
        let keywords = config.prompt.as_deref().unwrap_or("");
        let lower = text.to_lowercase();
        let matched = keywords
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .find(|k| lower.contains(&k.to_lowercase()))
            .map(str::to_string);

        let event = if matched.is_some() {
            config.event.clone()
        } else {
            None
        };
        Ok(Detection::new(
            self.name(),
            json!({"matched": matched, "transcript": text}),
        )
        .with_event(event))
    }
}

/// The microphone-transcript-facing runtime.
pub struct AudioRuntime {
    engine: Engine,
    detectors: DetectorSet,
    sessions: SessionRegistry,
}

impl AudioRuntime {
    pub fn new(engine: Engine) -> Self {
        let detectors = DetectorSet::new("keyword").with(Arc::new(KeywordDetector));
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

    /// Ingest one transcript chunk for a session.
    pub async fn ingest_transcript(&self, session_id: &str, text: impl Into<String>) {
        let session = self.sessions.get_or_create(session_id);
        let input = SensorInput::Transcript(text.into());
        run_cycle(
            &self.engine,
            &session,
            SensorKind::Audio,
            &self.detectors,
            &input,
        )
        .await;
    }
}
