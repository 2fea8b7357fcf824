use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::error::{BackendError, RefineError, Result};
use crate::llm::{
    build_rewrite_prompt, call_with_retry, parse_segments, CallFailure, ExhaustionPolicy,
    GenerationBackend, GenerationOptions, GenerationRequest, RetryPolicy, REWRITE_SYSTEM_PROMPT,
};
use crate::models::{Chunk, ChunkResult};

/// Configuration for the rewrite stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    pub retry: RetryPolicy,
    pub options: GenerationOptions,
    /// Show the backend the end of the previous chunk's rewritten output
    pub carry_rewritten_tail: bool,
    /// Characters of rewritten output to carry forward
    pub tail_chars: usize,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            options: GenerationOptions::default(),
            carry_rewritten_tail: true,
            tail_chars: 600,
        }
    }
}

/// Results of a rewrite run, in chunk order
#[derive(Debug)]
pub struct RewriteOutcome {
    pub results: Vec<ChunkResult>,
    /// Why the run stopped early, if it did
    pub abort: Option<RefineError>,
}

impl RewriteOutcome {
    pub fn is_aborted(&self) -> bool {
        self.abort.is_some()
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn degraded_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_degraded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_failed()).count()
    }

    /// The results, or the document-level error that stopped the run
    pub fn into_results(self) -> Result<Vec<ChunkResult>> {
        match self.abort {
            Some(error) => Err(error),
            None => Ok(self.results),
        }
    }
}

/// Execute the rewrite stage
///
/// Chunks are processed strictly in order; each prompt carries the
/// chunk's overlap and, optionally, the tail of the previous result.
/// For each chunk:
/// 1. Stop if cancellation was requested
/// 2. Build the prompt and call the backend under the retry policy
/// 3. Accept output only if every editable segment comes back
/// 4. On exhaustion, degrade or stop per `on_exhaustion`
pub async fn execute_rewrite(
    backend: &dyn GenerationBackend,
    chunks: &[Chunk],
    config: &RewriteConfig,
    cancel: &CancellationToken,
) -> RewriteOutcome {
    info!(
        "Rewrite: processing {} chunks with {} backend",
        chunks.len(),
        backend.name()
    );

    let mut results = Vec::with_capacity(chunks.len());
    let mut previous_tail: Option<String> = None;
    let mut abort = None;

    for chunk in chunks {
        if cancel.is_cancelled() {
            info!("Rewrite cancelled before chunk {}", chunk.index);
            abort = Some(RefineError::Cancelled {
                chunk_index: chunk.index,
            });
            break;
        }

        let tail = if config.carry_rewritten_tail {
            previous_tail.as_deref()
        } else {
            None
        };

        let result = match rewrite_chunk(backend, chunk, tail, config, cancel).await {
            Ok(result) => {
                info!(
                    "Chunk {}/{}: rewritten after {} attempt(s)",
                    chunk.index + 1,
                    chunk.total_chunks,
                    result.attempts
                );
                result
            }
            Err(CallFailure {
                error: BackendError::Cancelled,
                attempts,
            }) => {
                warn!("Chunk {}: cancelled in flight", chunk.index);
                results.push(ChunkResult::failed(chunk, "cancelled".to_string(), attempts));
                abort = Some(RefineError::Cancelled {
                    chunk_index: chunk.index,
                });
                break;
            }
            Err(CallFailure { error, attempts }) => match config.retry.on_exhaustion {
                ExhaustionPolicy::Degrade => {
                    warn!(
                        "Chunk {}: degraded to original text after {} attempt(s): {}",
                        chunk.index, attempts, error
                    );
                    ChunkResult::degraded(chunk, error.to_string(), attempts)
                }
                ExhaustionPolicy::FailFast => {
                    warn!(
                        "Chunk {}: failed after {} attempt(s), aborting: {}",
                        chunk.index, attempts, error
                    );
                    results.push(ChunkResult::failed(chunk, error.to_string(), attempts));
                    abort = Some(RefineError::Backend {
                        chunk_index: chunk.index,
                        source: error,
                    });
                    break;
                }
            },
        };

        previous_tail = rewritten_tail(&result, config.tail_chars);
        results.push(result);
    }

    info!(
        "Rewrite complete: {} success, {} degraded, {} failed of {} chunks",
        results.iter().filter(|r| r.is_success()).count(),
        results.iter().filter(|r| r.is_degraded()).count(),
        results.iter().filter(|r| r.is_failed()).count(),
        chunks.len()
    );

    RewriteOutcome { results, abort }
}

/// Rewrite a single chunk
async fn rewrite_chunk(
    backend: &dyn GenerationBackend,
    chunk: &Chunk,
    previous_tail: Option<&str>,
    config: &RewriteConfig,
    cancel: &CancellationToken,
) -> std::result::Result<ChunkResult, CallFailure> {
    let expected = chunk.editable_ids();
    if expected.is_empty() {
        debug!("Chunk {}: nothing to rewrite", chunk.index);
        let blanks = vec![String::new(); chunk.fragments.len()];
        return Ok(ChunkResult::success(
            chunk,
            chunk.non_overlap_text().to_string(),
            blanks,
            0,
        ));
    }

    let prompt = build_rewrite_prompt(chunk, previous_tail);
    let request = GenerationRequest::new(REWRITE_SYSTEM_PROMPT, prompt, &config.options);
    let label = format!("Chunk {}", chunk.index);

    let ((raw, parsed), attempts) =
        call_with_retry(backend, &request, &config.retry, cancel, &label, |output| {
            parse_segments(output, &expected).map(|segments| (output.to_string(), segments))
        })
        .await?;

    let mut segments = vec![String::new(); chunk.fragments.len()];
    for (id, text) in expected.into_iter().zip(parsed) {
        segments[id] = text;
    }

    Ok(ChunkResult::success(chunk, raw, segments, attempts))
}

/// Last `max_chars` characters of a result's text, for the next prompt
fn rewritten_tail(result: &ChunkResult, max_chars: usize) -> Option<String> {
    if max_chars == 0 {
        return None;
    }
    let joined = result
        .segments
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if joined.is_empty() {
        return None;
    }

    let skip = joined.chars().count().saturating_sub(max_chars);
    Some(joined.chars().skip(skip).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::PassthroughBackend;
    use crate::models::{ChunkStatus, PlanConfig};
    use crate::stages::{plan_chunks, SegmenterConfig, SpeakerSegmenter};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes segments in upper case, failing or stalling on one part
    struct TestBackend {
        fail_part: Option<usize>,
        stall_part: Option<usize>,
        malformed_first: AtomicUsize,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl TestBackend {
        fn new() -> Self {
            Self {
                fail_part: None,
                stall_part: None,
                malformed_first: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for TestBackend {
        async fn generate(&self, request: &GenerationRequest) -> std::result::Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.prompt.clone());

            let is_part = |part: Option<usize>| {
                part.is_some_and(|p| request.prompt.starts_with(&format!("# Part {} of", p)))
            };
            if is_part(self.fail_part) {
                return Err(BackendError::Transient("backend down".into()));
            }
            if is_part(self.stall_part) {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            if self.malformed_first.load(Ordering::SeqCst) > 0 {
                self.malformed_first.fetch_sub(1, Ordering::SeqCst);
                return Ok("I cannot follow the format.".to_string());
            }
            Ok(PassthroughBackend::new().respond(&request.prompt)?.to_uppercase())
        }

        fn name(&self) -> &str {
            "test"
        }
    }

    fn words(text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn three_chunks() -> Vec<Chunk> {
        let text = "Host: welcome everyone to the weekly sync.\nAlice: the release is on track for friday.\nBob: the docs still need one more review.\n";
        let turns = SpeakerSegmenter::new(&SegmenterConfig::default())
            .unwrap()
            .segment(text)
            .unwrap();
        let config = PlanConfig {
            max_tokens: 10,
            overlap_tokens: 4,
        };
        let chunks = plan_chunks(&turns, &config, &words).unwrap();
        assert_eq!(chunks.len(), 3);
        chunks
    }

    fn rewrite_config(on_exhaustion: ExhaustionPolicy) -> RewriteConfig {
        RewriteConfig {
            retry: RetryPolicy {
                max_attempts: 2,
                backoff_ms: 1,
                max_backoff_ms: 2,
                call_timeout_ms: None,
                on_exhaustion,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_all_chunks_succeed_in_order() {
        let backend = TestBackend::new();
        let outcome = execute_rewrite(
            &backend,
            &three_chunks(),
            &rewrite_config(ExhaustionPolicy::Degrade),
            &CancellationToken::new(),
        )
        .await;

        assert!(!outcome.is_aborted());
        let indices: Vec<usize> = outcome.results.iter().map(|r| r.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(outcome.success_count(), 3);
        assert_eq!(outcome.results[1].segments, vec!["THE RELEASE IS ON TRACK FOR FRIDAY."]);
        assert_eq!(outcome.results[1].fragments[0].marker, "Alice: ");
    }

    #[tokio::test]
    async fn test_degrade_substitutes_original_and_continues() {
        let backend = TestBackend {
            fail_part: Some(2),
            ..TestBackend::new()
        };
        let outcome = execute_rewrite(
            &backend,
            &three_chunks(),
            &rewrite_config(ExhaustionPolicy::Degrade),
            &CancellationToken::new(),
        )
        .await;

        let statuses: Vec<ChunkStatus> = outcome.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![ChunkStatus::Success, ChunkStatus::Degraded, ChunkStatus::Success]
        );
        let degraded = &outcome.results[1];
        assert_eq!(degraded.attempts, 2);
        assert_eq!(degraded.segments, vec!["the release is on track for friday."]);
        assert_eq!(degraded.rewritten_text, "Alice: the release is on track for friday.\n");
        assert!(degraded.error.is_some());
        assert!(outcome.into_results().is_ok());
    }

    #[tokio::test]
    async fn test_fail_fast_stops_after_failing_chunk() {
        let backend = TestBackend {
            fail_part: Some(2),
            ..TestBackend::new()
        };
        let outcome = execute_rewrite(
            &backend,
            &three_chunks(),
            &rewrite_config(ExhaustionPolicy::FailFast),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results[0].is_success());
        assert!(outcome.results[1].is_failed());
        assert_eq!(outcome.success_count(), 1);
        assert!(matches!(
            outcome.abort,
            Some(RefineError::Backend { chunk_index: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_output_is_retried() {
        let backend = TestBackend {
            malformed_first: AtomicUsize::new(1),
            ..TestBackend::new()
        };
        let outcome = execute_rewrite(
            &backend,
            &three_chunks()[..1],
            &rewrite_config(ExhaustionPolicy::FailFast),
            &CancellationToken::new(),
        )
        .await;

        assert!(outcome.results[0].is_success());
        assert_eq!(outcome.results[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_produces_no_results() {
        let token = CancellationToken::new();
        token.cancel();
        let backend = TestBackend::new();
        let outcome = execute_rewrite(
            &backend,
            &three_chunks(),
            &rewrite_config(ExhaustionPolicy::Degrade),
            &token,
        )
        .await;

        assert!(outcome.results.is_empty());
        assert!(matches!(outcome.abort, Some(RefineError::Cancelled { chunk_index: 0 })));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_in_flight_reports_failed_cancelled() {
        let backend = TestBackend {
            stall_part: Some(2),
            ..TestBackend::new()
        };
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let outcome = execute_rewrite(
            &backend,
            &three_chunks(),
            &rewrite_config(ExhaustionPolicy::Degrade),
            &token,
        )
        .await;

        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results[0].is_success());
        assert!(outcome.results[1].is_failed());
        assert_eq!(outcome.results[1].error.as_deref(), Some("cancelled"));
        assert!(matches!(outcome.abort, Some(RefineError::Cancelled { chunk_index: 1 })));
    }

    #[tokio::test]
    async fn test_previous_output_and_overlap_in_next_prompt() {
        let backend = TestBackend::new();
        execute_rewrite(
            &backend,
            &three_chunks(),
            &rewrite_config(ExhaustionPolicy::Degrade),
            &CancellationToken::new(),
        )
        .await;

        let prompts = backend.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        assert!(!prompts[0].contains("READ-ONLY"));
        assert!(prompts[1].contains("## Previous Rewritten Output (READ-ONLY)\nWELCOME EVERYONE TO THE WEEKLY SYNC."));
        assert!(prompts[1].contains("## Preceding Transcript (READ-ONLY)\n[Host] "));
    }

    #[tokio::test]
    async fn test_blank_chunk_not_sent() {
        let text = "Host:\n\n";
        let turns = SpeakerSegmenter::new(&SegmenterConfig::default())
            .unwrap()
            .segment(text)
            .unwrap();
        let chunks = plan_chunks(&turns, &PlanConfig::default(), &words).unwrap();
        let backend = TestBackend::new();
        let outcome = execute_rewrite(
            &backend,
            &chunks,
            &RewriteConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(outcome.results[0].is_success());
        assert_eq!(outcome.results[0].segments, vec![String::new()]);
    }
}
