use std::sync::LazyLock;

use regex::Regex;

use crate::error::BackendError;
use crate::heuristics::strip_reasoning_blocks;

static SEGMENT_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*<<<SEG (\d+)>>>.*$").expect("valid regex"));

/// Split rewrite output into segments keyed by the expected ids.
///
/// Reasoning blocks are removed first and anything before the first
/// marker is discarded. Every expected id must appear exactly once, in
/// order, with non-empty text; otherwise the output is `Malformed`.
pub fn parse_segments(output: &str, expected: &[usize]) -> Result<Vec<String>, BackendError> {
    let cleaned = strip_reasoning_blocks(output);

    let markers: Vec<(usize, usize, usize)> = SEGMENT_MARKER_RE
        .captures_iter(&cleaned)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let id = caps.get(1)?.as_str().parse().ok()?;
            Some((id, whole.start(), whole.end()))
        })
        .collect();

    let ids: Vec<usize> = markers.iter().map(|(id, _, _)| *id).collect();
    if ids != expected {
        return Err(BackendError::Malformed(format!(
            "expected segments {:?}, found {:?}",
            expected, ids
        )));
    }

    let mut segments = Vec::with_capacity(markers.len());
    for (i, &(id, _, body_start)) in markers.iter().enumerate() {
        let body_end = markers
            .get(i + 1)
            .map(|&(_, next_start, _)| next_start)
            .unwrap_or(cleaned.len());
        let text = cleaned[body_start..body_end].trim();
        if text.is_empty() {
            return Err(BackendError::Malformed(format!("segment {} is empty", id)));
        }
        segments.push(text.to_string());
    }

    Ok(segments)
}

/// Clean free-form output such as a summary
pub fn sanitize_output(output: &str) -> Result<String, BackendError> {
    let cleaned = strip_reasoning_blocks(output).trim().to_string();
    if cleaned.is_empty() {
        return Err(BackendError::Malformed("empty output".to_string()));
    }
    Ok(cleaned)
}
