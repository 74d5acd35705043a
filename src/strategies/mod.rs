use url::Url;

use crate::browser::Session;
use crate::error::{AgentError, Result};
use crate::memory::Memory;
use crate::trace::writer::ActionLogger;

pub mod juice_shop;

/// Model configuration for adaptive strategies. The deterministic playbooks
/// never consult the model, but the credential check still runs at startup so
/// a misconfigured environment fails before a browser is launched.
pub struct LlmConfig {
    pub model: String,
    pub temperature: f64,
    api_key: String,
}

impl LlmConfig {
    pub fn new(model: String, temperature: f64, api_key: String) -> Self {
        LlmConfig {
            model,
            temperature,
            api_key,
        }
    }

    /// Read the credential from `OPENAI_API_KEY` or `LLM_API_KEY`.
    pub fn from_env(model: String, temperature: f64) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .or_else(|_| std::env::var("LLM_API_KEY"))
            .map_err(|_| {
                AgentError::Configuration(
                    "set OPENAI_API_KEY or LLM_API_KEY before launching the agent"
                        .to_string(),
                )
            })?;
        Ok(LlmConfig::new(model, temperature, api_key))
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Configuration bundle threaded through one strategy run.
pub struct AgentContext {
    pub base_url: Url,
    pub headless: bool,
    pub llm: LlmConfig,
    pub logger: ActionLogger,
    pub memory: Memory,
}

/// A site-specific playbook: a deterministic sequence of interaction steps
/// executed against one open session.
#[allow(async_fn_in_trait)]
pub trait Strategy {
    async fn run(&mut self, session: &mut Session) -> Result<()>;
}
