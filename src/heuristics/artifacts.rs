use std::sync::LazyLock;

use regex::Regex;

static REASONING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(think|thinking|reasoning|thought|internal|scratchpad|analysis|reflection)>.*?</(think|thinking|reasoning|thought|internal|scratchpad|analysis|reflection)>")
        .expect("valid regex")
});

static EXCESS_NEWLINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\[(]\d{1,2}:\d{2}:\d{2}(?:[.,]\d{1,3})?[\])]").expect("valid regex")
});

static CONFIDENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(0\.\d+\)").expect("valid regex"));

static REPEATED_PUNCT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([。，、！？!?,])[。，、！？!?,]+").expect("valid regex")
});

/// Remove model reasoning blocks such as `<think>...</think>`.
///
/// Used on transcripts (which are sometimes produced by another model) and
/// on backend output before it is parsed.
pub fn strip_reasoning_blocks(text: &str) -> String {
    if !text.contains('<') {
        return text.to_string();
    }
    let stripped = REASONING_RE.replace_all(text, "");
    EXCESS_NEWLINES_RE.replace_all(&stripped, "\n\n").into_owned()
}

/// Result of artifact removal
#[derive(Debug, Clone)]
pub struct ArtifactResult {
    pub text: String,
    pub timestamps_removed: usize,
    pub confidence_marks_removed: usize,
}

/// Remove recognizer artifacts: inline timestamps, confidence marks and
/// runs of repeated punctuation
pub fn remove_asr_artifacts(text: &str) -> ArtifactResult {
    let timestamps_removed = TIMESTAMP_RE.find_iter(text).count();
    let text = TIMESTAMP_RE.replace_all(text, "");

    let confidence_marks_removed = CONFIDENCE_RE.find_iter(&text).count();
    let text = CONFIDENCE_RE.replace_all(&text, "");

    let text = REPEATED_PUNCT_RE.replace_all(&text, "$1").into_owned();

    ArtifactResult {
        text,
        timestamps_removed,
        confidence_marks_removed,
    }
}
