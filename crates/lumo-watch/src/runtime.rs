//! Shared watcher-cycle plumbing used by every runtime.

use std::time::Duration;

use lumo_machine::{ActiveWatcher, Engine, SensorKind};
use tracing::{debug, warn};

use crate::detector::{DetectContext, DetectorSet, SensorInput};
use crate::session::WatcherSession;

/// One detection cycle: run every active watcher for `kind` against a
/// single shared input (a frame, a transcript, a level sample).
pub(crate) async fn run_cycle(
    engine: &Engine,
    session: &WatcherSession,
    kind: SensorKind,
    detectors: &DetectorSet,
    input: &SensorInput,
) {
    if !session.is_active() {
        return;
    }
    for watcher in engine.active_watchers(kind) {
        run_watcher(engine, session, detectors, &watcher, input).await;
    }
}

/// One watcher step: throttle, detect, store, and fire the cooldown-limited
/// event. Detector failures skip the cycle for that watcher; the next tick
/// retries.
pub(crate) async fn run_watcher(
    engine: &Engine,
    session: &WatcherSession,
    detectors: &DetectorSet,
    watcher: &ActiveWatcher,
    input: &SensorInput,
) {
    let detector = match detectors.resolve(&watcher.config) {
        Ok(detector) => detector,
        Err(e) => {
            warn!(watcher = %watcher.key, error = %e, "watcher_detector_missing");
            return;
        }
    };

    // Remote engines enforce a higher floor to bound cost.
    let mut interval = Duration::from_millis(watcher.config.interval_ms);
    if detector.is_remote() {
        interval = interval.max(Duration::from_millis(
            engine.config().remote_interval_floor_ms,
        ));
    }
    if !session.try_claim_run(&watcher.key, interval) {
        return;
    }

    let ctx = DetectContext {
        session_id: session.id(),
    };
    match detector.detect(input, &watcher.config, &ctx).await {
        Ok(detection) => {
            let event = detection.event.clone();
            let data_key = watcher
                .config
                .key
                .clone()
                .unwrap_or_else(|| watcher.kind.data_key().to_string());
            engine.data().set(data_key, detection.into_record());

            if let Some(event) = event {
                let cooldown = Duration::from_millis(watcher.config.cooldown_ms);
                if session.try_claim_event(&event, cooldown) {
                    debug!(session = session.id(), event = %event, "watcher_event");
                    engine.execute_transition(&event);
                }
            }
        }
        Err(e) => {
            warn!(watcher = %watcher.key, error = %e, "watcher_detect_error");
        }
    }
}
