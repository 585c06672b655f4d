//! Reactive sensor watcher runtimes for the Lumo lamp engine.
//!
//! Each runtime polls or receives one kind of external signal, runs the
//! detection engines configured on the current state (or on rule-level
//! watchers), writes results into the shared data store, and fires
//! cooldown-limited events into the rule engine:
//!
//! - [`VisionRuntime`]: camera frames, with a latest-frame-only mailbox
//! - [`AudioRuntime`]: microphone transcripts
//! - [`VolumeRuntime`]: continuous level samples, EMA-smoothed per session
//! - [`ApiRuntime`]: self-driven HTTP polling of configured URLs
//!
//! Detection engines are pluggable via the [`Detector`] trait; the `llm`
//! feature adds a Rig-backed remote detector.
//!
//! ## Features
//!
//! - `llm` - LLM-powered detection using the [Rig](https://github.com/0xPlaygrounds/rig) library

mod api;
mod audio;
mod detector;
mod error;
mod runtime;
mod session;
mod vision;
mod volume;

// LLM detector (optional feature)
#[cfg(feature = "llm")]
pub mod llm;

pub use api::{ApiRuntime, ApiRuntimeHandle, FetchDetector};
pub use audio::{AudioRuntime, KeywordDetector};
pub use detector::{
    DetectContext, Detection, Detector, DetectorSet, FrameData, SensorInput,
};
pub use error::{WatchError, WatchResult};
pub use session::{SessionRegistry, WatcherSession};
pub use vision::{LuminanceDetector, MotionDetector, VisionRuntime};
pub use volume::{LevelDetector, VolumeRuntime};

#[cfg(feature = "llm")]
pub use llm::{create_agent, LlmDetector, LlmEndpoint, LlmVerdict};
