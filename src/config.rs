use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RefineError, Result};
use crate::heuristics::CleaningConfig;
use crate::llm::BackendConfig;
use crate::models::PlanConfig;
use crate::stages::{validate_plan_config, RewriteConfig, SegmenterConfig, SummaryConfig};

/// What a run produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Rewritten document only
    Full,
    /// Summary only; the rewrite stage is skipped
    Summary,
    /// Rewritten document and its summary
    Both,
}

impl OutputMode {
    pub fn wants_document(self) -> bool {
        matches!(self, Self::Full | Self::Both)
    }

    pub fn wants_summary(self) -> bool {
        matches!(self, Self::Summary | Self::Both)
    }
}

/// Full configuration for a refine run.
///
/// Every section has defaults, so a config file only names what it changes:
///
/// ```json
/// { "chunking": { "max_tokens": 2000 }, "rewrite": { "retry": { "on_exhaustion": "fail_fast" } } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    pub mode: OutputMode,
    pub cleaning: CleaningConfig,
    pub segmenter: SegmenterConfig,
    pub chunking: PlanConfig,
    pub rewrite: RewriteConfig,
    pub summary: SummaryConfig,
    pub backend: BackendConfig,
    /// Documents refined at once by `refine_many`
    pub documents_concurrency: usize,
    /// Output filename templates; `{stem}` and `{timestamp}` are filled in
    pub document_filename: String,
    pub summary_filename: String,
    pub report_filename: String,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::Full,
            cleaning: CleaningConfig::default(),
            segmenter: SegmenterConfig::default(),
            chunking: PlanConfig::default(),
            rewrite: RewriteConfig::default(),
            summary: SummaryConfig::default(),
            backend: BackendConfig::default(),
            documents_concurrency: 1,
            document_filename: "{stem}_refined_{timestamp}.md".to_string(),
            summary_filename: "{stem}_summary_{timestamp}.md".to_string(),
            report_filename: "{stem}_report_{timestamp}.json".to_string(),
        }
    }
}

impl RefineConfig {
    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RefineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RefineError::Config(format!("invalid config: {}", e)))
    }

    /// Reject settings no run could succeed with
    pub fn validate(&self) -> Result<()> {
        validate_plan_config(&self.chunking)?;
        if self.rewrite.retry.max_attempts == 0 {
            return Err(config_error("rewrite.retry.max_attempts must be positive"));
        }
        if self.summary.retry.max_attempts == 0 {
            return Err(config_error("summary.retry.max_attempts must be positive"));
        }
        if self.summary.concurrency == 0 {
            return Err(config_error("summary.concurrency must be positive"));
        }
        if self.summary.max_tokens == 0 {
            return Err(config_error("summary.max_tokens must be positive"));
        }
        if self.documents_concurrency == 0 {
            return Err(config_error("documents_concurrency must be positive"));
        }
        if self.backend.slots == 0 {
            return Err(config_error("backend.slots must be positive"));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> RefineError {
    RefineError::Config(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{BackendKind, ExhaustionPolicy};

    #[test]
    fn test_defaults_are_valid() {
        let config = RefineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mode, OutputMode::Full);
        assert!(config.mode.wants_document());
        assert!(!config.mode.wants_summary());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RefineConfig::from_json(
            r#"{
                "mode": "both",
                "chunking": { "max_tokens": 2000 },
                "rewrite": { "retry": { "on_exhaustion": "fail_fast" } },
                "backend": { "kind": "ollama", "model": "qwen3:14b" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.mode, OutputMode::Both);
        assert_eq!(config.chunking.max_tokens, 2000);
        assert_eq!(config.chunking.overlap_tokens, 500);
        assert_eq!(config.rewrite.retry.on_exhaustion, ExhaustionPolicy::FailFast);
        assert_eq!(config.rewrite.retry.max_attempts, 3);
        assert_eq!(config.backend.kind, BackendKind::Ollama);
        assert!(config.cleaning.enabled);
    }

    #[test]
    fn test_validate_rejects_overlap_at_budget() {
        let mut config = RefineConfig::default();
        config.chunking.max_tokens = 100;
        config.chunking.overlap_tokens = 100;
        assert!(matches!(config.validate(), Err(RefineError::Planning(_))));

        config.chunking.max_tokens = 0;
        config.chunking.overlap_tokens = 0;
        assert!(matches!(config.validate(), Err(RefineError::Planning(_))));
    }

    #[test]
    fn test_validate_rejects_zero_attempts_and_concurrency() {
        let mut config = RefineConfig::default();
        config.rewrite.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = RefineConfig::default();
        config.summary.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = RefineConfig::default();
        config.documents_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redraft.json");
        std::fs::write(&path, r#"{ "documents_concurrency": 3 }"#).unwrap();
        let config = RefineConfig::from_file(&path).unwrap();
        assert_eq!(config.documents_concurrency, 3);

        assert!(RefineConfig::from_file(&dir.path().join("missing.json")).is_err());
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            RefineConfig::from_file(&path),
            Err(RefineError::Config(_))
        ));
    }
}
