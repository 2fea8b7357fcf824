use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::client::{check_status, Message};
use super::{GenerationBackend, GenerationRequest};
use crate::error::BackendError;

/// Configuration for a local Ollama server
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "qwen3:8b".to_string(),
        }
    }
}

impl OllamaConfig {
    /// Defaults, with the server URL overridden by REDRAFT_OLLAMA_URL
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("REDRAFT_OLLAMA_URL") {
            config.base_url = url;
        }
        config
    }
}

/// Local model served by Ollama's `/api/chat`.
///
/// A loaded local model is one shared resource; wrap this client in a
/// `SlotLimitedBackend` when several documents run at once.
pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl GenerationBackend for OllamaClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError> {
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

        let body = OllamaChatRequest {
            model: self.config.model.clone(),
            messages,
            stream: false,
            options: OllamaOptions {
                temperature: request.options.temperature,
                num_predict: request.options.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.config.base_url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        let response: OllamaChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Malformed(format!("Ollama response: {}", e)))?;

        if let Some(error) = response.error {
            return Err(BackendError::Permanent(format!("Ollama: {}", error)));
        }

        response
            .message
            .map(|m| m.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| BackendError::Malformed("no message content in response".to_string()))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}
