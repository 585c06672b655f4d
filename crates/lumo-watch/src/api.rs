//! API runtime: polls configured URLs and stores the JSON responses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lumo_machine::{Engine, ReactiveConfig, SensorKind};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::detector::{DetectContext, Detection, Detector, DetectorSet, SensorInput};
use crate::error::{WatchError, WatchResult};
use crate::runtime::run_watcher;
use crate::session::{SessionRegistry, WatcherSession};

/// Fetches the watcher's URL and reports the response body as the
/// observation. Remote: subject to the remote interval floor.
pub struct FetchDetector {
    client: reqwest::Client,
}

impl FetchDetector {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for FetchDetector {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl Detector for FetchDetector {
    fn name(&self) -> &str {
        "fetch"
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn detect(
        &self,
        input: &SensorInput,
        config: &ReactiveConfig,
        _ctx: &DetectContext<'_>,
    ) -> WatchResult<Detection> {
        let SensorInput::Fetch { url } = input else {
            return Err(WatchError::detector(self.name(), "expected a fetch input"));
        };
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body: serde_json::Value = response.json().await?;
        debug!(url = %url, "api_fetch_ok");
        Ok(Detection::new(self.name(), body).with_event(config.event.clone()))
    }
}

/// The polling runtime for `api_reactive` watchers.
///
/// Unlike the push-driven runtimes, this one drives itself: a background
/// task ticks on a fixed cadence, and each tick runs whichever active API
/// watchers are due (per-watcher intervals still apply on top).
pub struct ApiRuntime {
    engine: Engine,
    detectors: Arc<DetectorSet>,
    sessions: Arc<SessionRegistry>,
    poll_ms: u64,
}

/// Handle to a spawned polling loop; aborts the task on [`ApiRuntimeHandle::stop`].
pub struct ApiRuntimeHandle {
    task: JoinHandle<()>,
}

impl ApiRuntimeHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

impl ApiRuntime {
    /// Default tick cadence; individual watchers throttle themselves on top.
    pub const DEFAULT_POLL_MS: u64 = 500;

    pub fn new(engine: Engine) -> Self {
        let detectors = DetectorSet::new("fetch").with(Arc::new(FetchDetector::default()));
        Self {
            engine,
            detectors: Arc::new(detectors),
            sessions: Arc::new(SessionRegistry::new()),
            poll_ms: Self::DEFAULT_POLL_MS,
        }
    }

    pub fn with_poll_ms(mut self, poll_ms: u64) -> Self {
        self.poll_ms = poll_ms.max(50);
        self
    }

    /// Replace the detector set (used to inject offline fakes in tests).
    pub fn with_detectors(mut self, detectors: DetectorSet) -> Self {
        self.detectors = Arc::new(detectors);
        self
    }

    pub fn session(&self, id: &str) -> Arc<WatcherSession> {
        self.sessions.get_or_create(id)
    }

    /// Run one polling tick: every due API watcher fetches its own URL.
    pub async fn tick(&self, session_id: &str) {
        let session = self.sessions.get_or_create(session_id);
        if !session.is_active() {
            return;
        }
        for watcher in self.engine.active_watchers(SensorKind::Api) {
            let Some(url) = watcher.config.url.clone() else {
                warn!(watcher = %watcher.key, "api_watcher_missing_url");
                continue;
            };
            let input = SensorInput::Fetch { url };
            run_watcher(&self.engine, &session, &self.detectors, &watcher, &input).await;
        }
    }

    /// Spawn the polling loop for a session.
    pub fn start(&self, session_id: impl Into<String>) -> ApiRuntimeHandle {
        let session_id = session_id.into();
        let runtime = ApiRuntime {
            engine: self.engine.clone(),
            detectors: self.detectors.clone(),
            sessions: self.sessions.clone(),
            poll_ms: self.poll_ms,
        };
        info!(session = %session_id, poll_ms = runtime.poll_ms, "api_runtime_start");
        let task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(runtime.poll_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                runtime.tick(&session_id).await;
            }
        });
        ApiRuntimeHandle { task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumo_core::NullDevice;
    use lumo_machine::{EngineConfig, State};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Offline stand-in for FetchDetector.
    struct FakeFetch {
        calls: Arc<AtomicUsize>,
        remote: bool,
    }

    #[async_trait]
    impl Detector for FakeFetch {
        fn name(&self) -> &str {
            "fetch"
        }

        fn is_remote(&self) -> bool {
            self.remote
        }

        async fn detect(
            &self,
            input: &SensorInput,
            config: &ReactiveConfig,
            _ctx: &DetectContext<'_>,
        ) -> WatchResult<Detection> {
            let SensorInput::Fetch { url } = input else {
                return Err(WatchError::detector("fetch", "expected fetch"));
            };
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Detection::new("fetch", json!({"url": url, "temp_c": 21}))
                .with_event(config.event.clone()))
        }
    }

    fn api_engine(interval_ms: u64) -> Engine {
        let engine = Engine::new(Arc::new(NullDevice), EngineConfig::default());
        engine.add_state(State::code("weather", "return prev").with_reactive(
            SensorKind::Api,
            ReactiveConfig {
                enabled: true,
                interval_ms,
                cooldown_ms: 0,
                url: Some("http://example.test/weather".to_string()),
                key: Some("weather".to_string()),
                ..Default::default()
            },
        ));
        engine.set_state("weather");
        engine
    }

    #[tokio::test]
    async fn test_tick_stores_under_configured_key() {
        let engine = api_engine(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let runtime = ApiRuntime::new(engine.clone()).with_detectors(
            DetectorSet::new("fetch").with(Arc::new(FakeFetch {
                calls: calls.clone(),
                remote: false,
            })),
        );

        runtime.tick("api0").await;

        let record = engine.data().get("weather").unwrap();
        assert_eq!(record["temp_c"], json!(21));
        assert_eq!(record["detector"], json!("fetch"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remote_floor_throttles_fast_intervals() {
        // Watcher asks for 10 ms but the engine floor is 2000 ms for
        // remote detectors: back-to-back ticks run once.
        let engine = api_engine(10);
        let calls = Arc::new(AtomicUsize::new(0));
        let runtime = ApiRuntime::new(engine.clone()).with_detectors(
            DetectorSet::new("fetch").with(Arc::new(FakeFetch {
                calls: calls.clone(),
                remote: true,
            })),
        );

        runtime.tick("api0").await;
        runtime.tick("api0").await;
        runtime.tick("api0").await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inactive_state_stops_polling_work() {
        let engine = api_engine(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let runtime = ApiRuntime::new(engine.clone()).with_detectors(
            DetectorSet::new("fetch").with(Arc::new(FakeFetch {
                calls: calls.clone(),
                remote: false,
            })),
        );

        engine.set_state("off");
        runtime.tick("api0").await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
