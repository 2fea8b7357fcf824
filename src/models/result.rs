use serde::{Deserialize, Serialize};

use super::Chunk;

/// Outcome of rewriting one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    /// Backend output accepted
    Success,
    /// Retries exhausted, original text substituted
    Degraded,
    /// No usable text (fail-fast escalation or cancellation)
    Failed,
}

/// Plan metadata for one fragment, carried alongside its rewritten text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentMeta {
    pub turn_index: usize,
    pub part: usize,
    pub parts: usize,
    pub speaker: Option<String>,
    /// Literal marker to re-emit at the start of the turn
    pub marker: String,
}

impl FragmentMeta {
    pub fn from_chunk(chunk: &Chunk) -> Vec<Self> {
        chunk
            .fragments
            .iter()
            .map(|f| Self {
                turn_index: f.turn_index,
                part: f.part,
                parts: f.parts,
                speaker: f.speaker.clone(),
                marker: chunk.fragment_marker(f).to_string(),
            })
            .collect()
    }
}

/// Result of one chunk, write-once
#[derive(Debug, Clone, Serialize)]
pub struct ChunkResult {
    pub chunk_index: usize,
    pub status: ChunkStatus,
    /// Backend output as received, or the fallback text when degraded
    pub rewritten_text: String,
    /// Rewritten body per fragment, aligned with `fragments`
    pub segments: Vec<String>,
    /// Fragment metadata copied from the plan
    pub fragments: Vec<FragmentMeta>,
    /// Turns in the whole plan, used for completeness checks
    pub total_turns: usize,
    /// Context fragments the prompt carried (excluded from output)
    pub overlap_fragments: usize,
    /// Backend calls made for this chunk
    pub attempts: u32,
    pub over_budget: bool,
    pub error: Option<String>,
}

impl ChunkResult {
    pub fn success(chunk: &Chunk, rewritten_text: String, segments: Vec<String>, attempts: u32) -> Self {
        Self::build(chunk, ChunkStatus::Success, rewritten_text, segments, attempts, None)
    }

    /// Substitute the original fragment bodies for the rewrite
    pub fn degraded(chunk: &Chunk, error: String, attempts: u32) -> Self {
        let segments: Vec<String> = chunk
            .fragments
            .iter()
            .map(|f| chunk.fragment_body(f).trim().to_string())
            .collect();
        let fallback = chunk.non_overlap_text().to_string();
        Self::build(chunk, ChunkStatus::Degraded, fallback, segments, attempts, Some(error))
    }

    pub fn failed(chunk: &Chunk, error: String, attempts: u32) -> Self {
        Self::build(chunk, ChunkStatus::Failed, String::new(), Vec::new(), attempts, Some(error))
    }

    fn build(
        chunk: &Chunk,
        status: ChunkStatus,
        rewritten_text: String,
        segments: Vec<String>,
        attempts: u32,
        error: Option<String>,
    ) -> Self {
        Self {
            chunk_index: chunk.index,
            status,
            rewritten_text,
            segments,
            fragments: FragmentMeta::from_chunk(chunk),
            total_turns: chunk.total_turns,
            overlap_fragments: chunk.overlap_fragment_count(),
            attempts,
            over_budget: chunk.over_budget,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ChunkStatus::Success
    }

    pub fn is_degraded(&self) -> bool {
        self.status == ChunkStatus::Degraded
    }

    pub fn is_failed(&self) -> bool {
        self.status == ChunkStatus::Failed
    }
}
