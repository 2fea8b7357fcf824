use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Configuration for chunk planning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Token budget for a chunk's own content (overlap excluded)
    pub max_tokens: usize,
    /// Token budget for the context carried from the previous chunk
    pub overlap_tokens: usize,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            max_tokens: 3000,
            overlap_tokens: 500,
        }
    }
}

/// A turn, or a sentence-aligned piece of one, placed in a chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnFragment {
    /// Index of the parent turn in the segmenter output
    pub turn_index: usize,
    /// Position of this piece within the parent turn
    pub part: usize,
    /// Number of pieces the parent turn was split into
    pub parts: usize,
    /// Speaker label inherited from the parent turn
    pub speaker: Option<String>,
    /// Marker bytes at the start of `range` (only on part 0)
    pub marker_len: usize,
    /// Byte range into the planned source
    pub range: Range<usize>,
    /// Estimated tokens of the fragment text
    pub estimated_tokens: usize,
}

impl TurnFragment {
    pub fn is_continuation(&self) -> bool {
        self.part > 0
    }

    fn body_range(&self) -> Range<usize> {
        self.range.start + self.marker_len..self.range.end
    }
}

/// Part of the previous chunk's tail carried as read-only context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapSpan {
    pub turn_index: usize,
    pub speaker: Option<String>,
    /// Marker bytes at the start of `range`, zero for partial tails
    pub marker_len: usize,
    pub range: Range<usize>,
}

/// A token-bounded unit of rewriting work.
///
/// Chunks share the planned source through an `Arc`; fragment and overlap
/// ranges are views into it, so the overlap is never owned twice.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position in the plan, 0-based
    pub index: usize,
    /// Number of chunks in the plan
    pub total_chunks: usize,
    /// Number of turns the plan was built from
    pub total_turns: usize,
    /// Own content, in order
    pub fragments: Vec<TurnFragment>,
    /// Context from the tail of the previous chunk, in order
    pub overlap: Vec<OverlapSpan>,
    /// Estimated tokens of own content
    pub estimated_tokens: usize,
    /// Estimated tokens of the overlap prefix
    pub overlap_tokens: usize,
    /// Own content exceeds the budget because no safe split point existed
    pub over_budget: bool,
    pub(crate) source: Arc<str>,
}

impl Chunk {
    /// Full text of a fragment, marker included
    pub fn fragment_text(&self, fragment: &TurnFragment) -> &str {
        &self.source[fragment.range.clone()]
    }

    /// Fragment text after the speaker marker
    pub fn fragment_body(&self, fragment: &TurnFragment) -> &str {
        &self.source[fragment.body_range()]
    }

    /// Literal speaker marker of a fragment, empty for continuations
    pub fn fragment_marker(&self, fragment: &TurnFragment) -> &str {
        &self.source[fragment.range.start..fragment.range.start + fragment.marker_len]
    }

    /// Fragments whose body has something to rewrite
    pub fn editable_ids(&self) -> Vec<usize> {
        self.fragments
            .iter()
            .enumerate()
            .filter(|(_, f)| !self.fragment_body(f).trim().is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Byte range of own content in the planned source
    pub fn content_range(&self) -> Range<usize> {
        match (self.fragments.first(), self.fragments.last()) {
            (Some(first), Some(last)) => first.range.start..last.range.end,
            _ => 0..0,
        }
    }

    /// Own content of this chunk with the overlap excluded
    pub fn non_overlap_text(&self) -> &str {
        &self.source[self.content_range()]
    }

    /// Context carried from the previous chunk, empty for the first chunk
    pub fn overlap_prefix(&self) -> &str {
        match (self.overlap.first(), self.overlap.last()) {
            (Some(first), Some(last)) => &self.source[first.range.start..last.range.end],
            _ => "",
        }
    }

    /// Overlap span text after its speaker marker
    pub fn overlap_body(&self, span: &OverlapSpan) -> &str {
        let start = (span.range.start + span.marker_len).min(span.range.end);
        &self.source[start..span.range.end]
    }

    pub fn has_overlap(&self) -> bool {
        !self.overlap.is_empty()
    }

    /// Number of turn pieces contributed purely by the overlap
    pub fn overlap_fragment_count(&self) -> usize {
        self.overlap.len()
    }

    /// Speakers appearing in own content, first-seen order
    pub fn speakers(&self) -> Vec<&str> {
        let mut speakers: Vec<&str> = Vec::new();
        for speaker in self.fragments.iter().filter_map(|f| f.speaker.as_deref()) {
            if !speakers.contains(&speaker) {
                speakers.push(speaker);
            }
        }
        speakers
    }
}
