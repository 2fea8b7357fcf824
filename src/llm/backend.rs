use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::BackendError;
use crate::models::{HeuristicEstimator, TokenEstimator};

/// Sampling options passed with every request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// Temperature (0-1, lower = more deterministic)
    pub temperature: f64,
    /// Maximum tokens in response
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 4096,
        }
    }
}

/// One generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>, options: &GenerationOptions) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            options: options.clone(),
        }
    }
}

/// A text-generation service.
///
/// Implementations may block for an unbounded time; callers apply their
/// own timeout.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError>;

    /// Short name for logs and reports
    fn name(&self) -> &str;

    /// Exact token count if the backend can provide one
    fn count_tokens(&self, _text: &str) -> Option<usize> {
        None
    }
}

#[async_trait]
impl<T: GenerationBackend + ?Sized> GenerationBackend for Arc<T> {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        (**self).generate(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn count_tokens(&self, text: &str) -> Option<usize> {
        (**self).count_tokens(text)
    }
}

/// Shares one backend between documents with a bounded number of
/// concurrent requests
pub struct SlotLimitedBackend {
    inner: Arc<dyn GenerationBackend>,
    slots: Arc<Semaphore>,
}

impl SlotLimitedBackend {
    pub fn new(inner: Arc<dyn GenerationBackend>, slots: usize) -> Self {
        Self {
            inner,
            slots: Arc::new(Semaphore::new(slots.max(1))),
        }
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

#[async_trait]
impl GenerationBackend for SlotLimitedBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| BackendError::Permanent("request slots closed".to_string()))?;
        debug!("{}: acquired request slot", self.inner.name());
        self.inner.generate(request).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn count_tokens(&self, text: &str) -> Option<usize> {
        self.inner.count_tokens(text)
    }
}

/// Uses the backend's own token count when it has one, otherwise the
/// character heuristic. A backend either always counts or never does, so
/// the estimate stays monotonic.
pub struct BackendTokenEstimator {
    backend: Arc<dyn GenerationBackend>,
    fallback: HeuristicEstimator,
}

impl BackendTokenEstimator {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            fallback: HeuristicEstimator::default(),
        }
    }
}

impl TokenEstimator for BackendTokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.backend
            .count_tokens(text)
            .unwrap_or_else(|| self.fallback.estimate(text))
    }
}
