pub mod artifacts;
pub mod filler_words;
pub mod whitespace;

pub use artifacts::*;
pub use filler_words::*;
pub use whitespace::*;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Configuration for transcript cleaning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Run cleaning at all
    pub enabled: bool,
    /// Remove `<think>`-style reasoning blocks
    pub remove_reasoning_blocks: bool,
    /// Remove timestamps, confidence marks and repeated punctuation
    pub remove_asr_artifacts: bool,
    /// Remove filler words
    pub remove_filler_words: bool,
    /// Filler words to remove
    pub filler_words: Vec<String>,
    /// Collapse spaces and blank lines
    pub normalize_whitespace: bool,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            remove_reasoning_blocks: true,
            remove_asr_artifacts: true,
            remove_filler_words: true,
            filler_words: default_filler_words(),
            normalize_whitespace: true,
        }
    }
}

/// Result of cleaning
#[derive(Debug, Clone)]
pub struct CleaningResult {
    /// Cleaned text; this becomes the transcript
    pub text: String,
    pub timestamps_removed: usize,
    pub confidence_marks_removed: usize,
    pub fillers_removed: usize,
}

/// Apply cheap deterministic cleanup before segmentation
///
/// 1. Normalize line endings and strip a BOM
/// 2. Remove reasoning blocks left by upstream models
/// 3. Remove recognizer artifacts
/// 4. Remove filler words
/// 5. Normalize whitespace
pub fn clean_transcript(text: &str, config: &CleaningConfig) -> Result<CleaningResult> {
    let mut result = CleaningResult {
        text: normalize_line_endings(text),
        timestamps_removed: 0,
        confidence_marks_removed: 0,
        fillers_removed: 0,
    };

    if !config.enabled {
        return Ok(result);
    }

    if config.remove_reasoning_blocks {
        result.text = strip_reasoning_blocks(&result.text);
    }

    if config.remove_asr_artifacts {
        let artifacts = remove_asr_artifacts(&result.text);
        result.timestamps_removed = artifacts.timestamps_removed;
        result.confidence_marks_removed = artifacts.confidence_marks_removed;
        result.text = artifacts.text;
    }

    if config.remove_filler_words && !config.filler_words.is_empty() {
        let rules = FillerRules::new(&config.filler_words)?;
        let fillers = rules.apply(&result.text);
        result.fillers_removed = fillers.fillers_removed;
        result.text = fillers.text;
    }

    if config.normalize_whitespace {
        result.text = normalize_whitespace(&result.text);
    }

    debug!(
        "Cleaning: {} timestamps, {} confidence marks, {} fillers removed",
        result.timestamps_removed, result.confidence_marks_removed, result.fillers_removed
    );

    Ok(result)
}
