pub mod backend;
pub mod client;
pub mod ollama;
pub mod openai;
pub mod passthrough;
pub mod prompts;
pub mod retry;
pub mod validation;

pub use backend::*;
pub use client::{AnthropicClient, AnthropicConfig};
pub use ollama::{OllamaClient, OllamaConfig};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use passthrough::PassthroughBackend;
pub use prompts::*;
pub use retry::*;
pub use validation::*;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

/// Which generation service to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Anthropic,
    #[value(name = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
    Deepseek,
    Siliconflow,
    Ollama,
    /// Dry run: segments come back unchanged
    Passthrough,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Overrides the backend's default model
    pub model: Option<String>,
    /// Overrides the backend's default endpoint
    pub base_url: Option<String>,
    /// Request slots shared by all documents in one run
    pub slots: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Anthropic,
            model: None,
            base_url: None,
            slots: 1,
        }
    }
}

/// Build the configured backend behind a shared slot limit.
///
/// Credentials are read from the environment; a missing key is a
/// configuration error.
pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn GenerationBackend>> {
    let inner: Arc<dyn GenerationBackend> = match config.kind {
        BackendKind::Anthropic => {
            let mut settings = AnthropicConfig::from_env()?;
            if let Some(model) = &config.model {
                settings.model = model.clone();
            }
            if let Some(url) = &config.base_url {
                settings.base_url = url.clone();
            }
            Arc::new(AnthropicClient::new(settings))
        }
        BackendKind::OpenAi | BackendKind::Deepseek | BackendKind::Siliconflow => {
            let provider = match config.kind {
                BackendKind::Deepseek => "deepseek",
                BackendKind::Siliconflow => "siliconflow",
                _ => "openai",
            };
            let mut settings = OpenAiConfig::for_provider(provider)?;
            if let Some(model) = &config.model {
                settings.model = model.clone();
            }
            if let Some(url) = &config.base_url {
                settings = settings.with_base_url(url);
            }
            Arc::new(OpenAiClient::new(settings))
        }
        BackendKind::Ollama => {
            let mut settings = OllamaConfig::from_env();
            if let Some(model) = &config.model {
                settings.model = model.clone();
            }
            if let Some(url) = &config.base_url {
                settings.base_url = url.clone();
            }
            Arc::new(OllamaClient::new(settings))
        }
        BackendKind::Passthrough => Arc::new(PassthroughBackend::new()),
    };

    info!("Using {} backend with {} request slot(s)", inner.name(), config.slots.max(1));
    Ok(Arc::new(SlotLimitedBackend::new(inner, config.slots)))
}
