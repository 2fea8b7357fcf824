use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::plan_chunks;
use crate::cancel::CancellationToken;
use crate::error::{BackendError, RefineError, Result};
use crate::llm::{
    build_final_prompt, build_map_prompt, build_reduce_prompt, call_with_retry, sanitize_output,
    GenerationBackend, GenerationOptions, GenerationRequest, RetryPolicy, SUMMARY_SYSTEM_PROMPT,
};
use crate::models::{Chunk, Document, PlanConfig, SpeakerTurn, TokenEstimator};

/// Configuration for summarization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Section labels of the final summary, in order
    pub structure: Vec<String>,
    /// Token budget for the content of one summary call
    pub max_tokens: usize,
    /// Summary calls in flight at once during map and reduce
    pub concurrency: usize,
    /// Reduce levels allowed before giving up
    pub max_depth: usize,
    pub options: GenerationOptions,
    pub retry: RetryPolicy,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            structure: default_structure(),
            max_tokens: 6000,
            concurrency: 4,
            max_depth: 6,
            options: GenerationOptions::default(),
            retry: RetryPolicy::default(),
        }
    }
}

pub fn default_structure() -> Vec<String> {
    [
        "Overview",
        "Key discussion points",
        "Decisions",
        "Action items",
        "Open questions",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// What to summarize
#[derive(Debug, Clone, Copy)]
pub enum SummaryInput<'a> {
    Text(&'a str),
    Turns(&'a [SpeakerTurn]),
    /// A rewritten document
    Document(&'a Document),
    /// Planned chunks of the original transcript; overlap is ignored
    Chunks(&'a [Chunk]),
}

/// Produce a fixed-structure summary
///
/// 1. If the input fits one call, summarize it directly
/// 2. Otherwise plan it into budget-sized parts (no overlap) and summarize
///    each part, up to `concurrency` at a time, keeping part order
/// 3. Merge partial summaries group by group until they fit one call;
///    a lone oversized partial is condensed on its own. Every level must
///    shrink the total or the run fails
/// 4. Write the final summary against `structure`
pub async fn summarize(
    backend: &dyn GenerationBackend,
    input: SummaryInput<'_>,
    config: &SummaryConfig,
    estimator: &dyn TokenEstimator,
    cancel: &CancellationToken,
) -> Result<String> {
    validate_summary_config(config)?;

    let parts = split_input(input, config, estimator)?;
    if parts.is_empty() {
        info!("Summary: empty input");
        return Ok(String::new());
    }

    let mut partials = if parts.len() == 1 {
        parts
    } else {
        info!("Summary map: {} parts", parts.len());
        let total = parts.len();
        let prompts = parts
            .iter()
            .enumerate()
            .map(|(i, part)| build_map_prompt(i, total, part))
            .collect();
        run_calls(backend, prompts, config, cancel, "Map").await?
    };

    let mut level = 0;
    let mut tokens = joined_tokens(&partials, estimator);
    while tokens > config.max_tokens {
        level += 1;
        if level > config.max_depth {
            return Err(RefineError::Summarization(format!(
                "still {} tokens after {} reduce levels",
                tokens, config.max_depth
            )));
        }

        let reduced = reduce_level(backend, partials, config, estimator, cancel, level).await?;
        let reduced_tokens = joined_tokens(&reduced, estimator);
        if reduced_tokens >= tokens {
            return Err(RefineError::Summarization(format!(
                "reduce level {} did not shrink the input ({} -> {} tokens)",
                level, tokens, reduced_tokens
            )));
        }
        info!(
            "Summary reduce level {}: {} -> {} tokens in {} parts",
            level,
            tokens,
            reduced_tokens,
            reduced.len()
        );
        partials = reduced;
        tokens = reduced_tokens;
    }

    let prompt = build_final_prompt(&partials.join("\n\n"), &config.structure);
    let summary = generate_summary(backend, prompt, config, cancel, "Final", 0).await?;
    info!("Summary complete ({} chars)", summary.chars().count());
    Ok(summary)
}

fn validate_summary_config(config: &SummaryConfig) -> Result<()> {
    if config.max_tokens == 0 {
        return Err(RefineError::Config("summary max_tokens must be positive".to_string()));
    }
    if config.concurrency == 0 {
        return Err(RefineError::Config("summary concurrency must be positive".to_string()));
    }
    Ok(())
}

/// Texts to summarize independently; a single element means the whole
/// input fits one call
fn split_input(
    input: SummaryInput<'_>,
    config: &SummaryConfig,
    estimator: &dyn TokenEstimator,
) -> Result<Vec<String>> {
    let turns: Vec<SpeakerTurn> = match input {
        SummaryInput::Text(text) if text.trim().is_empty() => return Ok(Vec::new()),
        SummaryInput::Text(text) => vec![SpeakerTurn::unlabeled(0, text)],
        SummaryInput::Turns(turns) => turns.to_vec(),
        SummaryInput::Document(document) => document.to_turns(),
        SummaryInput::Chunks(chunks) => {
            let parts: Vec<String> = chunks
                .iter()
                .map(|c| c.non_overlap_text().to_string())
                .filter(|t| !t.trim().is_empty())
                .collect();
            let whole = parts.concat();
            if estimator.estimate(&whole) <= config.max_tokens {
                return Ok(if whole.trim().is_empty() { Vec::new() } else { vec![whole] });
            }
            return Ok(parts);
        }
    };

    let whole: String = turns.iter().map(|t| t.text.as_str()).collect();
    if whole.trim().is_empty() {
        return Ok(Vec::new());
    }
    if estimator.estimate(&whole) <= config.max_tokens {
        return Ok(vec![whole]);
    }

    let plan = PlanConfig {
        max_tokens: config.max_tokens,
        overlap_tokens: 0,
    };
    let parts = plan_chunks(&turns, &plan, estimator)?
        .iter()
        .map(|c| c.non_overlap_text().to_string())
        .filter(|t| !t.trim().is_empty())
        .collect();
    Ok(parts)
}

/// Merge neighbouring partial summaries in groups that fit the budget
async fn reduce_level(
    backend: &dyn GenerationBackend,
    partials: Vec<String>,
    config: &SummaryConfig,
    estimator: &dyn TokenEstimator,
    cancel: &CancellationToken,
    level: usize,
) -> Result<Vec<String>> {
    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut group_tokens = 0;
    for partial in partials {
        let tokens = estimator.estimate(&partial);
        match groups.last_mut() {
            Some(group) if group_tokens + tokens <= config.max_tokens => {
                group.push(partial);
                group_tokens += tokens;
            }
            _ => {
                groups.push(vec![partial]);
                group_tokens = tokens;
            }
        }
    }
    debug!("Reduce level {}: {} groups", level, groups.len());

    // A lone partial that fits is carried up unchanged, unless no two
    // partials fit together; then each one is condensed on its own
    let condense = groups.iter().all(|g| g.len() == 1);
    let mut slots: Vec<Option<String>> = Vec::with_capacity(groups.len());
    let mut prompts = Vec::new();
    for mut group in groups {
        let carry = !condense
            && group.len() == 1
            && estimator.estimate(&group[0]) <= config.max_tokens;
        if carry {
            slots.push(group.pop());
        } else {
            prompts.push(build_reduce_prompt(&group));
            slots.push(None);
        }
    }

    let mut merged = run_calls(backend, prompts, config, cancel, "Reduce")
        .await?
        .into_iter();
    Ok(slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| merged.next()))
        .collect())
}

/// Run independent summary calls with bounded concurrency, keeping order
async fn run_calls(
    backend: &dyn GenerationBackend,
    prompts: Vec<String>,
    config: &SummaryConfig,
    cancel: &CancellationToken,
    stage: &str,
) -> Result<Vec<String>> {
    stream::iter(prompts.into_iter().enumerate())
        .map(|(i, prompt)| generate_summary(backend, prompt, config, cancel, stage, i))
        .buffered(config.concurrency)
        .try_collect()
        .await
}

async fn generate_summary(
    backend: &dyn GenerationBackend,
    prompt: String,
    config: &SummaryConfig,
    cancel: &CancellationToken,
    stage: &str,
    index: usize,
) -> Result<String> {
    let request = GenerationRequest::new(SUMMARY_SYSTEM_PROMPT, prompt, &config.options);
    let label = format!("{} summary {}", stage, index);
    match call_with_retry(backend, &request, &config.retry, cancel, &label, sanitize_output).await
    {
        Ok((text, _)) => Ok(text),
        Err(failure) => match failure.error {
            BackendError::Cancelled => Err(RefineError::Cancelled { chunk_index: index }),
            error => Err(RefineError::Summarization(format!("{}: {}", label, error))),
        },
    }
}

fn joined_tokens(partials: &[String], estimator: &dyn TokenEstimator) -> usize {
    estimator.estimate(&partials.join("\n\n"))
}
