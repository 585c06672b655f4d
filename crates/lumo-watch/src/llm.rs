//! LLM-backed detection using Rig.
//!
//! An [`LlmDetector`] sends a compact description of the sensor input plus
//! the watcher's prompt to an LLM and expects a small JSON verdict back.
//! Works against any OpenAI-compatible endpoint (OpenAI, Ollama, vLLM).
//!
//! ## Example
//!
//! ```rust,ignore
//! use lumo_watch::llm::{create_agent, LlmDetector, LlmEndpoint};
//!
//! let endpoint = LlmEndpoint::ollama("llava");
//! let agent = create_agent(&endpoint);
//! let mut runtime = VisionRuntime::new(engine);
//! runtime.register_detector(Arc::new(LlmDetector::new(agent)));
//! ```

use std::env;

use async_trait::async_trait;
use lumo_machine::ReactiveConfig;
use rig::agent::Agent;
use rig::completion::{CompletionModel, Prompt};
use rig::providers::openai;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::detector::{DetectContext, Detection, Detector, SensorInput};
use crate::error::{WatchError, WatchResult};

/// Configuration for an OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmEndpoint {
    pub api_url: String,
    pub api_key: String,
    pub model_name: String,
}

impl LlmEndpoint {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            model_name: model_name.into(),
        }
    }

    /// Local Ollama endpoint.
    pub fn ollama(model_name: impl Into<String>) -> Self {
        Self {
            api_url: "http://localhost:11434/v1".to_string(),
            api_key: "ollama".to_string(),
            model_name: model_name.into(),
        }
    }

    /// Read from `LUMO_LLM_API_URL` / `LUMO_LLM_API_KEY` / `LUMO_LLM_MODEL`
    /// (falling back to the `OPENAI_*` names).
    pub fn from_env() -> Option<Self> {
        let api_url = env::var("LUMO_LLM_API_URL")
            .or_else(|_| env::var("OPENAI_API_URL"))
            .ok()?;
        let api_key = env::var("LUMO_LLM_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok()?;
        let model_name = env::var("LUMO_LLM_MODEL")
            .or_else(|_| env::var("OPENAI_MODEL_NAME"))
            .unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Some(Self {
            api_url,
            api_key,
            model_name,
        })
    }
}

/// Build an agent for an endpoint.
pub fn create_agent(endpoint: &LlmEndpoint) -> Agent<openai::CompletionModel> {
    let client = openai::Client::from_url(&endpoint.api_key, &endpoint.api_url);
    client.agent(&endpoint.model_name).build()
}

const SYSTEM_PROMPT: &str = r#"You are a sensor analyst for a smart lamp. Given an observation
summary and a question, answer ONLY with raw JSON matching:
{
  "answer": true or false,
  "confidence": number from 0.0 to 1.0,
  "detail": "one short sentence"
}
Do NOT include explanations, markdown, or code blocks."#;

/// The structured verdict expected from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmVerdict {
    pub answer: bool,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// A remote detector that asks an LLM the watcher's `prompt` about the
/// current input. Fires the configured event when the model answers yes.
pub struct LlmDetector<M: CompletionModel> {
    agent: Agent<M>,
    name: String,
}

impl<M: CompletionModel> LlmDetector<M> {
    pub fn new(agent: Agent<M>) -> Self {
        Self {
            agent,
            name: "llm".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn describe_input(input: &SensorInput) -> String {
        match input {
            SensorInput::Frame(frame) => format!(
                "camera frame {}x{}, mean luminance {:.3}",
                frame.width,
                frame.height,
                frame.mean_luminance()
            ),
            SensorInput::Transcript(text) => format!("microphone transcript: {text:?}"),
            SensorInput::Level { raw, smoothed } => {
                format!("signal level raw={raw:.3} smoothed={smoothed:.3}")
            }
            SensorInput::Fetch { url } => format!("api response from {url}"),
        }
    }

    /// Strip common LLM response artifacts before parsing.
    fn parse_verdict(&self, response: &str) -> WatchResult<LlmVerdict> {
        let cleaned = response
            .trim()
            .trim_matches('`')
            .trim_start_matches("json")
            .trim_start_matches("JSON")
            .trim_matches(['`', ' ', '\n', '\r'])
            .trim();
        serde_json::from_str(cleaned).map_err(WatchError::Serialization)
    }
}

#[async_trait]
impl<M: CompletionModel + Send + Sync> Detector for LlmDetector<M> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn detect(
        &self,
        input: &SensorInput,
        config: &ReactiveConfig,
        ctx: &DetectContext<'_>,
    ) -> WatchResult<Detection> {
        let question = config
            .prompt
            .as_deref()
            .ok_or_else(|| WatchError::InvalidConfig {
                message: "llm watcher requires a prompt".to_string(),
            })?;

        let full_prompt = format!(
            "{SYSTEM_PROMPT}\n\nObservation: {}\nQuestion: {question}",
            Self::describe_input(input)
        );

        debug!(session = ctx.session_id, "llm_detect_start");
        let response = self
            .agent
            .prompt(full_prompt)
            .await
            .map_err(|e| WatchError::detector(self.name.as_str(), e))?;
        debug!(
            session = ctx.session_id,
            response_len = response.len(),
            "llm_detect_complete"
        );

        let verdict = self.parse_verdict(&response)?;
        let event = if verdict.answer {
            config.event.clone()
        } else {
            None
        };
        Ok(Detection::new(
            self.name.clone(),
            json!({
                "answer": verdict.answer,
                "confidence": verdict.confidence,
                "detail": verdict.detail,
            }),
        )
        .with_event(event))
    }
}
