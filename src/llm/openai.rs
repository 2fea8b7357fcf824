use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::client::{check_status, Message};
use super::{GenerationBackend, GenerationRequest};
use crate::error::{BackendError, RefineError, Result};

/// Configuration for an OpenAI-compatible chat completions service
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    /// API root ending in `/v1`
    pub base_url: String,
    /// Provider name for logs
    pub provider: String,
}

impl OpenAiConfig {
    /// Known providers: `openai`, `deepseek`, `siliconflow`.
    ///
    /// The key comes from the provider's environment variable
    /// (`OPENAI_API_KEY`, `DEEPSEEK_API_KEY`, `SILICONFLOW_API_KEY`).
    pub fn for_provider(provider: &str) -> Result<Self> {
        let (env_key, base_url, model) = match provider {
            "openai" => ("OPENAI_API_KEY", "https://api.openai.com/v1", "gpt-4o-mini"),
            "deepseek" => ("DEEPSEEK_API_KEY", "https://api.deepseek.com/v1", "deepseek-chat"),
            "siliconflow" => (
                "SILICONFLOW_API_KEY",
                "https://api.siliconflow.cn/v1",
                "Qwen/Qwen2.5-72B-Instruct",
            ),
            other => {
                return Err(RefineError::Config(format!(
                    "unknown OpenAI-compatible provider: {}",
                    other
                )));
            }
        };

        let api_key = std::env::var(env_key).map_err(|_| {
            RefineError::Config(format!("{} environment variable not set", env_key))
        })?;

        Ok(Self {
            api_key,
            model: model.to_string(),
            base_url: base_url.to_string(),
            provider: provider.to_string(),
        })
    }

    /// Point at a custom endpoint; a missing `/v1` suffix is added
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let trimmed = base_url.trim().trim_end_matches('/');
        self.base_url = if trimmed.ends_with("/v1") {
            trimmed.to_string()
        } else {
            format!("{}/v1", trimmed)
        };
        self
    }
}

/// OpenAI-compatible chat completions backend
pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl GenerationBackend for OpenAiClient {
    async fn generate(&self, request: &GenerationRequest) -> std::result::Result<String, BackendError> {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(Message {
                role: "system".to_string(),
                content: request.system.clone(),
            });
        }
        messages.push(Message {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        let body = ChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: request.options.temperature,
            max_tokens: request.options.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        let response: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Malformed(format!("{} response: {}", self.config.provider, e)))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| BackendError::Malformed("no message content in response".to_string()))
    }

    fn name(&self) -> &str {
        &self.config.provider
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
