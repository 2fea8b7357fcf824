use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{RefineError, Result};
use crate::models::{Chunk, OverlapSpan, PlanConfig, SpeakerTurn, TokenEstimator, TurnFragment};

/// Characters that may trail a sentence terminator and stay with the sentence
const CLOSERS: &[char] = &['"', '\'', '”', '’', ')', '）', ']', '」', '』', '】'];

/// Reject budgets that cannot produce a plan
pub fn validate_plan_config(config: &PlanConfig) -> Result<()> {
    if config.max_tokens == 0 {
        return Err(RefineError::Planning("max_tokens must be positive".to_string()));
    }
    if config.overlap_tokens >= config.max_tokens {
        return Err(RefineError::Planning(format!(
            "overlap_tokens ({}) must be less than max_tokens ({})",
            config.overlap_tokens, config.max_tokens
        )));
    }
    Ok(())
}

/// Group turns into token-bounded chunks.
///
/// Turns are packed whole while they fit. A turn that alone exceeds the
/// budget is split at sentence boundaries into fragments that keep the
/// parent's speaker; a fragment with no usable boundary is emitted as is
/// and its chunk is flagged `over_budget`. Every chunk after the first
/// carries the tail of its predecessor as read-only overlap.
pub fn plan_chunks(
    turns: &[SpeakerTurn],
    config: &PlanConfig,
    estimator: &dyn TokenEstimator,
) -> Result<Vec<Chunk>> {
    validate_plan_config(config)?;

    if turns.is_empty() {
        info!("Planning: no turns, empty plan");
        return Ok(Vec::new());
    }

    let source = build_source(turns)?;
    let fragments = split_turns(turns, &source, config.max_tokens, estimator);
    let groups = pack_fragments(fragments, &source, config.max_tokens, estimator);
    let total_chunks = groups.len();

    let mut chunks: Vec<Chunk> = Vec::with_capacity(total_chunks);
    for (index, fragments) in groups.into_iter().enumerate() {
        let overlap = match chunks.last() {
            Some(previous) => select_overlap(previous, &source, config.overlap_tokens, estimator),
            None => Vec::new(),
        };
        let overlap_tokens = match (overlap.first(), overlap.last()) {
            (Some(first), Some(last)) => estimator.estimate(&source[first.range.start..last.range.end]),
            _ => 0,
        };
        let estimated_tokens = match (fragments.first(), fragments.last()) {
            (Some(first), Some(last)) => estimator.estimate(&source[first.range.start..last.range.end]),
            _ => 0,
        };
        let over_budget = estimated_tokens > config.max_tokens;
        if over_budget {
            warn!(
                "Chunk {}: {} tokens exceeds budget of {} (no safe split point)",
                index, estimated_tokens, config.max_tokens
            );
        }

        debug!(
            "Chunk {}: {} fragments, {} tokens, {} overlap tokens",
            index,
            fragments.len(),
            estimated_tokens,
            overlap_tokens
        );

        chunks.push(Chunk {
            index,
            total_chunks,
            total_turns: turns.len(),
            fragments,
            overlap,
            estimated_tokens,
            overlap_tokens,
            over_budget,
            source: Arc::clone(&source),
        });
    }

    verify_plan(&chunks, source.len())?;

    info!(
        "Planned {} chunks from {} turns ({} over budget)",
        chunks.len(),
        turns.len(),
        chunks.iter().filter(|c| c.over_budget).count()
    );

    Ok(chunks)
}

/// Concatenate contiguous turns into the shared planning source
fn build_source(turns: &[SpeakerTurn]) -> Result<Arc<str>> {
    for (i, pair) in turns.windows(2).enumerate() {
        if pair[1].start_offset != pair[0].end_offset {
            return Err(RefineError::Planning(format!(
                "turn {} starts at {} but turn {} ends at {}",
                i + 1,
                pair[1].start_offset,
                i,
                pair[0].end_offset
            )));
        }
    }
    let text: String = turns.iter().map(|t| t.text.as_str()).collect();
    Ok(Arc::from(text))
}

fn split_turns(
    turns: &[SpeakerTurn],
    source: &str,
    max_tokens: usize,
    estimator: &dyn TokenEstimator,
) -> Vec<TurnFragment> {
    let mut fragments = Vec::with_capacity(turns.len());
    let mut offset = 0;

    for (turn_index, turn) in turns.iter().enumerate() {
        let range = offset..offset + turn.text.len();
        offset = range.end;

        let tokens = estimator.estimate(&turn.text);
        if tokens <= max_tokens {
            fragments.push(TurnFragment {
                turn_index,
                part: 0,
                parts: 1,
                speaker: turn.speaker.clone(),
                marker_len: turn.marker_len,
                range,
                estimated_tokens: tokens,
            });
            continue;
        }

        let body_start = range.start + turn.marker_len;
        let pieces = split_at_sentences(source, range, body_start, max_tokens, estimator);
        let parts = pieces.len();
        debug!(
            "Turn {}: {} tokens split into {} fragments",
            turn_index, tokens, parts
        );

        for (part, piece) in pieces.into_iter().enumerate() {
            fragments.push(TurnFragment {
                turn_index,
                part,
                parts,
                speaker: turn.speaker.clone(),
                marker_len: if part == 0 { turn.marker_len } else { 0 },
                estimated_tokens: estimator.estimate(&source[piece.clone()]),
                range: piece,
            });
        }
    }

    fragments
}

/// Greedily cut `range` at sentence ends so each piece fits the budget.
/// A sentence that alone exceeds the budget becomes its own piece.
fn split_at_sentences(
    source: &str,
    range: Range<usize>,
    body_start: usize,
    max_tokens: usize,
    estimator: &dyn TokenEstimator,
) -> Vec<Range<usize>> {
    let cuts = sentence_cuts(&source[..range.end], body_start);
    let fits = |r: Range<usize>| estimator.estimate(&source[r]) <= max_tokens;

    let mut pieces = Vec::new();
    let mut start = range.start;
    let mut last_fit: Option<usize> = None;

    for cut in cuts.into_iter().chain(std::iter::once(range.end)) {
        if fits(start..cut) {
            last_fit = Some(cut);
            continue;
        }
        if let Some(end) = last_fit.take() {
            pieces.push(start..end);
            start = end;
            if fits(start..cut) {
                last_fit = Some(cut);
                continue;
            }
        }
        pieces.push(start..cut);
        start = cut;
    }

    if start < range.end {
        pieces.push(start..range.end);
    }
    pieces
}

/// Byte positions in `text` (at or after `from`) where a new sentence
/// starts. Latin terminators only count when followed by whitespace; the
/// end of the text is never reported.
fn sentence_cuts(text: &str, from: usize) -> Vec<usize> {
    let mut cuts = Vec::new();
    let mut chars = text[from..]
        .char_indices()
        .map(|(i, c)| (from + i, c))
        .peekable();

    while let Some((i, c)) = chars.next() {
        let latin = matches!(c, '.' | '!' | '?');
        if !latin && !matches!(c, '。' | '！' | '？' | '\n') {
            continue;
        }

        let mut end = i + c.len_utf8();
        while let Some(&(j, n)) = chars.peek() {
            if !CLOSERS.contains(&n) {
                break;
            }
            end = j + n.len_utf8();
            chars.next();
        }
        if latin && !chars.peek().is_none_or(|&(_, n)| n.is_whitespace()) {
            continue;
        }
        while let Some(&(j, n)) = chars.peek() {
            if !n.is_whitespace() {
                break;
            }
            end = j + n.len_utf8();
            chars.next();
        }

        if end < text.len() && cuts.last() != Some(&end) {
            cuts.push(end);
        }
    }

    cuts
}

/// Byte positions after `from` where a word starts
fn word_starts(text: &str, from: usize) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut previous_blank = false;
    for (i, c) in text[from..].char_indices() {
        if previous_blank && !c.is_whitespace() {
            starts.push(from + i);
        }
        previous_blank = c.is_whitespace();
    }
    starts
}

/// Fill each group while the estimate of its joined text stays within
/// budget. Per-fragment estimates do not add up to the joined estimate, so
/// the whole span is measured.
fn pack_fragments(
    fragments: Vec<TurnFragment>,
    source: &str,
    max_tokens: usize,
    estimator: &dyn TokenEstimator,
) -> Vec<Vec<TurnFragment>> {
    let mut groups = Vec::new();
    let mut current: Vec<TurnFragment> = Vec::new();

    for fragment in fragments {
        if let Some(first) = current.first() {
            let joined = &source[first.range.start..fragment.range.end];
            if estimator.estimate(joined) > max_tokens {
                groups.push(std::mem::take(&mut current));
            }
        }
        current.push(fragment);
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Pick the tail of the previous chunk to carry as context.
///
/// Whole trailing fragments are preferred. When even the last fragment is
/// too large, the largest suffix of it that fits is used, cut at a
/// sentence, then a word, then a character boundary.
fn select_overlap(
    previous: &Chunk,
    source: &str,
    budget: usize,
    estimator: &dyn TokenEstimator,
) -> Vec<OverlapSpan> {
    let Some(last) = previous.fragments.last() else {
        return Vec::new();
    };
    if budget == 0 {
        return Vec::new();
    }
    let end = last.range.end;

    let whole = previous
        .fragments
        .iter()
        .rev()
        .take_while(|f| estimator.estimate(&source[f.range.start..end]) <= budget)
        .count();
    if whole > 0 {
        return previous.fragments[previous.fragments.len() - whole..]
            .iter()
            .map(|f| OverlapSpan {
                turn_index: f.turn_index,
                speaker: f.speaker.clone(),
                marker_len: f.marker_len,
                range: f.range.clone(),
            })
            .collect();
    }

    let body_start = last.range.start + last.marker_len;
    let mut sentences = vec![body_start];
    sentences.extend(sentence_cuts(&source[..end], body_start));
    let words = word_starts(&source[..end], body_start);
    let chars: Vec<usize> = source[body_start..end]
        .char_indices()
        .map(|(i, _)| body_start + i)
        .collect();

    // Suffix estimates shrink as the start moves right, so each candidate
    // list is partitioned into "too large" followed by "fits".
    for candidates in [sentences, words, chars] {
        let first_fit =
            candidates.partition_point(|&p| estimator.estimate(&source[p..end]) > budget);
        if let Some(&start) = candidates.get(first_fit) {
            return vec![OverlapSpan {
                turn_index: last.turn_index,
                speaker: last.speaker.clone(),
                marker_len: 0,
                range: start..end,
            }];
        }
    }

    Vec::new()
}

/// Own content of all chunks must tile the source exactly once
fn verify_plan(chunks: &[Chunk], source_len: usize) -> Result<()> {
    let mut expected = 0;
    for fragment in chunks.iter().flat_map(|c| c.fragments.iter()) {
        if fragment.range.start != expected || fragment.range.end < fragment.range.start {
            return Err(RefineError::Planning(format!(
                "fragment of turn {} starts at {}, expected {}",
                fragment.turn_index, fragment.range.start, expected
            )));
        }
        expected = fragment.range.end;
    }
    if expected != source_len {
        return Err(RefineError::Planning(format!(
            "plan covers {} of {} bytes",
            expected, source_len
        )));
    }
    Ok(())
}
