use serde::{Deserialize, Serialize};

use super::TokenEstimator;

/// Immutable source text of one document
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    /// The full text; never mutated by the pipeline
    pub text: String,
    /// Length in characters (not bytes)
    pub char_count: usize,
    /// Estimated backend tokens for the whole text
    pub estimated_tokens: usize,
}

impl Transcript {
    pub fn new(text: impl Into<String>, estimator: &dyn TokenEstimator) -> Self {
        let text = text.into();
        Self {
            char_count: text.chars().count(),
            estimated_tokens: estimator.estimate(&text),
            text,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A contiguous span of the transcript attributed to one speaker.
///
/// `text` always includes the literal speaker marker (if any) at its start,
/// so concatenating every turn's text reproduces the transcript exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    /// Cleaned speaker label, `None` for unlabeled text
    pub speaker: Option<String>,
    /// Byte offset of the turn start in the transcript
    pub start_offset: usize,
    /// Byte offset one past the turn end
    pub end_offset: usize,
    /// Length in bytes of the marker prefix inside `text`
    pub marker_len: usize,
    /// The turn text, marker included
    pub text: String,
}

impl SpeakerTurn {
    /// An unlabeled turn starting at `start_offset`
    pub fn unlabeled(start_offset: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            speaker: None,
            start_offset,
            end_offset: start_offset + text.len(),
            marker_len: 0,
            text,
        }
    }

    /// A labeled turn whose text starts with a marker of `marker_len` bytes
    pub fn labeled(
        speaker: impl Into<String>,
        start_offset: usize,
        marker_len: usize,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        Self {
            speaker: Some(speaker.into()),
            start_offset,
            end_offset: start_offset + text.len(),
            marker_len: marker_len.min(text.len()),
            text,
        }
    }

    pub fn is_labeled(&self) -> bool {
        self.speaker.is_some()
    }

    /// The literal speaker marker, empty for unlabeled turns
    pub fn marker(&self) -> &str {
        &self.text[..self.marker_len]
    }

    /// The turn text after the marker
    pub fn body(&self) -> &str {
        &self.text[self.marker_len..]
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labeled_turn_marker_and_body() {
        let turn = SpeakerTurn::labeled("Alice", 10, 7, "Alice: hello there\n");
        assert_eq!(turn.marker(), "Alice: ");
        assert_eq!(turn.body(), "hello there\n");
        assert_eq!(turn.end_offset, 10 + turn.text.len());
        assert_eq!(turn.len(), turn.text.len());
    }

    #[test]
    fn test_unlabeled_turn() {
        let turn = SpeakerTurn::unlabeled(0, "intro text");
        assert!(!turn.is_labeled());
        assert_eq!(turn.marker(), "");
        assert_eq!(turn.body(), "intro text");
    }

    #[test]
    fn test_transcript_counts_chars() {
        let estimator = |text: &str| text.len();
        let transcript = Transcript::new("主持人：你好", &estimator);
        assert_eq!(transcript.char_count, 6);
        assert_eq!(transcript.estimated_tokens, "主持人：你好".len());
    }
}
