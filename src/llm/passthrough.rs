use async_trait::async_trait;

use super::{GenerationBackend, GenerationRequest};
use crate::error::BackendError;

const SEGMENTS_HEADER: &str = "## Segments (EDITABLE)\n";
const CONTENT_HEADER: &str = "## Content\n";
const INSTRUCTIONS_HEADER: &str = "\n## Instructions";

/// Dry-run backend that never calls a model.
///
/// Rewrite prompts get their editable segments echoed back unchanged;
/// summary prompts get the first `summary_chars` characters of their
/// content, so map-reduce still converges.
#[derive(Debug, Clone)]
pub struct PassthroughBackend {
    pub summary_chars: usize,
}

impl Default for PassthroughBackend {
    fn default() -> Self {
        Self { summary_chars: 600 }
    }
}

impl PassthroughBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The echo this backend answers a prompt with
    pub fn respond(&self, prompt: &str) -> Result<String, BackendError> {
        if let Some(segments) = section(prompt, SEGMENTS_HEADER) {
            return Ok(segments.to_string());
        }
        if let Some(content) = section(prompt, CONTENT_HEADER) {
            return Ok(content.trim().chars().take(self.summary_chars).collect());
        }
        Err(BackendError::Permanent(
            "passthrough backend cannot answer this prompt".to_string(),
        ))
    }
}

fn section<'a>(prompt: &'a str, header: &str) -> Option<&'a str> {
    let start = prompt.find(header)? + header.len();
    let end = prompt[start..]
        .rfind(INSTRUCTIONS_HEADER)
        .map(|i| start + i)
        .unwrap_or(prompt.len());
    Some(&prompt[start..end])
}

#[async_trait]
impl GenerationBackend for PassthroughBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        self.respond(&request.prompt)
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}
