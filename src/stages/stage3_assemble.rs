use tracing::info;

use crate::error::{RefineError, Result};
use crate::models::{ChunkResult, Document, DocumentTurn};

/// Turn currently being filled from continuation fragments
struct OpenTurn {
    turn_index: usize,
    next_part: usize,
    parts: usize,
}

/// Assemble chunk results into the final document.
///
/// Only each chunk's own fragments contribute text; overlap never came back
/// from the backend, so nothing has to be cut. Every source turn must be
/// produced exactly once with its parts in order, or the results are
/// inconsistent and assembly fails.
pub fn assemble(results: &[ChunkResult]) -> Result<Document> {
    let total_turns = results.first().map(|r| r.total_turns).unwrap_or(0);
    let mut turns: Vec<DocumentTurn> = Vec::with_capacity(total_turns);
    let mut open: Option<OpenTurn> = None;

    for (position, result) in results.iter().enumerate() {
        check_result(position, result, total_turns)?;
        let degraded = result.is_degraded();

        for (meta, text) in result.fragments.iter().zip(&result.segments) {
            let text = text.trim();

            if meta.part == 0 {
                if let Some(turn) = &open {
                    return Err(inconsistent(format!(
                        "turn {} ended after part {} of {}",
                        turn.turn_index, turn.next_part, turn.parts
                    )));
                }
                if meta.turn_index != turns.len() {
                    return Err(inconsistent(format!(
                        "chunk {} starts turn {}, expected turn {}",
                        result.chunk_index,
                        meta.turn_index,
                        turns.len()
                    )));
                }
                turns.push(DocumentTurn {
                    turn_index: meta.turn_index,
                    speaker: meta.speaker.clone(),
                    marker: meta.marker.clone(),
                    text: text.to_string(),
                    degraded,
                });
                open = Some(OpenTurn {
                    turn_index: meta.turn_index,
                    next_part: 1,
                    parts: meta.parts,
                });
            } else {
                let expected = open
                    .as_mut()
                    .filter(|t| t.turn_index == meta.turn_index && t.next_part == meta.part);
                let Some(turn_state) = expected else {
                    return Err(inconsistent(format!(
                        "chunk {} has part {} of turn {} out of sequence",
                        result.chunk_index, meta.part, meta.turn_index
                    )));
                };
                turn_state.next_part += 1;

                if let Some(turn) = turns.last_mut() {
                    if !text.is_empty() {
                        if !turn.text.is_empty() {
                            turn.text.push_str("\n\n");
                        }
                        turn.text.push_str(text);
                    }
                    turn.degraded |= degraded;
                }
            }

            if open.as_ref().is_some_and(|t| t.next_part >= t.parts) {
                open = None;
            }
        }
    }

    if let Some(turn) = open {
        return Err(inconsistent(format!(
            "turn {} has {} of {} parts",
            turn.turn_index, turn.next_part, turn.parts
        )));
    }
    if turns.len() != total_turns {
        return Err(inconsistent(format!(
            "{} of {} turns assembled",
            turns.len(),
            total_turns
        )));
    }

    let degraded_chunks: Vec<usize> = results
        .iter()
        .filter(|r| r.is_degraded())
        .map(|r| r.chunk_index)
        .collect();
    let over_budget_chunks: Vec<usize> = results
        .iter()
        .filter(|r| r.over_budget)
        .map(|r| r.chunk_index)
        .collect();

    info!(
        "Assembled {} turns from {} chunks ({} degraded)",
        turns.len(),
        results.len(),
        degraded_chunks.len()
    );

    Ok(Document {
        turns,
        degraded_chunks,
        over_budget_chunks,
    })
}

fn check_result(position: usize, result: &ChunkResult, total_turns: usize) -> Result<()> {
    if result.chunk_index != position {
        return Err(inconsistent(format!(
            "result {} has chunk index {}",
            position, result.chunk_index
        )));
    }
    if result.is_failed() {
        return Err(inconsistent(format!(
            "chunk {} failed: {}",
            result.chunk_index,
            result.error.as_deref().unwrap_or("no text")
        )));
    }
    if result.segments.len() != result.fragments.len() {
        return Err(inconsistent(format!(
            "chunk {} has {} segments for {} fragments",
            result.chunk_index,
            result.segments.len(),
            result.fragments.len()
        )));
    }
    if result.total_turns != total_turns {
        return Err(inconsistent(format!(
            "chunk {} was planned from {} turns, expected {}",
            result.chunk_index, result.total_turns, total_turns
        )));
    }
    Ok(())
}

fn inconsistent(message: String) -> RefineError {
    RefineError::ReassemblyConsistency(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, PlanConfig};
    use crate::stages::{plan_chunks, SegmenterConfig, SpeakerSegmenter};

    fn words(text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn plan(text: &str, max_tokens: usize) -> Vec<Chunk> {
        let turns = SpeakerSegmenter::new(&SegmenterConfig::default())
            .unwrap()
            .segment(text)
            .unwrap();
        plan_chunks(
            &turns,
            &PlanConfig {
                max_tokens,
                overlap_tokens: 2,
            },
            &words,
        )
        .unwrap()
    }

    /// Successful result whose segments are the bodies with a prefix
    fn rewritten(chunk: &Chunk) -> ChunkResult {
        let segments = chunk
            .fragments
            .iter()
            .map(|f| format!("R:{}", chunk.fragment_body(f).trim()))
            .collect();
        ChunkResult::success(chunk, String::new(), segments, 1)
    }

    const TEXT: &str = "Intro line.\nHost: one two three. four five six. seven eight nine.\nGuest: ten eleven.\n";

    #[test]
    fn test_assemble_joins_split_turns_once() {
        let chunks = plan(TEXT, 5);
        assert!(chunks.len() > 2);
        let results: Vec<ChunkResult> = chunks.iter().map(rewritten).collect();
        let document = assemble(&results).unwrap();

        assert_eq!(document.turns.len(), 3);
        assert_eq!(document.turns[0].text, "R:Intro line.");
        assert_eq!(document.turns[1].marker, "Host: ");
        assert_eq!(
            document.turns[1].text,
            "R:one two three.\n\nR:four five six.\n\nR:seven eight nine."
        );
        assert_eq!(document.turns[2].speaker.as_deref(), Some("Guest"));
        assert!(!document.is_degraded());
        assert!(document.render().starts_with("R:Intro line.\n\nHost:\nR:one two three."));
    }

    #[test]
    fn test_degraded_chunk_uses_original_text() {
        let chunks = plan(TEXT, 5);
        let mut results: Vec<ChunkResult> = chunks.iter().map(rewritten).collect();
        results[1] = ChunkResult::degraded(&chunks[1], "backend down".to_string(), 3);
        let document = assemble(&results).unwrap();

        assert_eq!(document.degraded_chunks, vec![1]);
        assert!(document.turns[1].degraded);
        assert!(document.turns[1].text.contains("one two three."));
        assert!(!document.turns[1].text.contains("R:one"));
    }

    #[test]
    fn test_failed_result_rejected() {
        let chunks = plan(TEXT, 5);
        let mut results: Vec<ChunkResult> = chunks.iter().map(rewritten).collect();
        results[1] = ChunkResult::failed(&chunks[1], "cancelled".to_string(), 1);
        assert!(matches!(
            assemble(&results),
            Err(RefineError::ReassemblyConsistency(_))
        ));
    }

    #[test]
    fn test_missing_or_duplicated_content_rejected() {
        let chunks = plan(TEXT, 5);
        let results: Vec<ChunkResult> = chunks.iter().map(rewritten).collect();

        let truncated = &results[..results.len() - 1];
        assert!(assemble(truncated).is_err());

        let mut duplicated = results.clone();
        duplicated.insert(1, results[1].clone());
        for (i, result) in duplicated.iter_mut().enumerate() {
            result.chunk_index = i;
        }
        assert!(assemble(&duplicated).is_err());

        let mut reordered = results.clone();
        reordered.swap(0, 1);
        assert!(assemble(&reordered).is_err());
    }

    #[test]
    fn test_empty_results_give_empty_document() {
        let document = assemble(&[]).unwrap();
        assert!(document.turns.is_empty());
        assert_eq!(document.render(), "");
    }
}
