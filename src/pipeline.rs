use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::config::RefineConfig;
use crate::error::{RefineError, Result};
use crate::heuristics::{clean_transcript, CleaningResult};
use crate::llm::{BackendTokenEstimator, GenerationBackend};
use crate::models::{Chunk, ChunkResult, Document, SpeakerTurn, TokenEstimator, Transcript};
use crate::stages::{
    assemble, execute_rewrite, plan_chunks, summarize, verify_coverage, RewriteOutcome,
    SpeakerSegmenter, SummaryInput,
};

/// Segmentation and chunk plan of one transcript; no backend involved
#[derive(Debug)]
pub struct Analysis {
    pub cleaning: CleaningResult,
    pub transcript: Transcript,
    pub turns: Vec<SpeakerTurn>,
    pub chunks: Vec<Chunk>,
}

/// Everything a refine run produced for one transcript
#[derive(Debug)]
pub struct RefineOutput {
    pub analysis: Analysis,
    pub outcome: RewriteOutcome,
    /// Present when the rewrite ran to completion
    pub document: Option<Document>,
    pub summary: Option<String>,
    /// Why the summary is missing when one was requested; the document
    /// and chunk results are kept regardless
    pub summary_error: Option<RefineError>,
}

impl RefineOutput {
    pub fn results(&self) -> &[ChunkResult] {
        &self.outcome.results
    }

    /// Document-level failure that stopped the rewrite
    pub fn failure(&self) -> Option<&RefineError> {
        self.outcome.abort.as_ref()
    }
}

/// Segmenter, estimator, backend and configuration for refine runs
pub struct Pipeline {
    segmenter: SpeakerSegmenter,
    estimator: Arc<dyn TokenEstimator>,
    backend: Arc<dyn GenerationBackend>,
    config: RefineConfig,
}

impl Pipeline {
    /// Validate the configuration and compile the speaker patterns.
    ///
    /// Token counts come from the backend when it offers them.
    pub fn new(config: RefineConfig, backend: Arc<dyn GenerationBackend>) -> Result<Self> {
        config.validate()?;
        let segmenter = SpeakerSegmenter::new(&config.segmenter)?;
        let estimator = Arc::new(BackendTokenEstimator::new(backend.clone()));
        Ok(Self {
            segmenter,
            estimator,
            backend,
            config,
        })
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn config(&self) -> &RefineConfig {
        &self.config
    }

    /// Clean, segment and plan a transcript
    pub fn analyze(&self, text: &str) -> Result<Analysis> {
        let cleaning = clean_transcript(text, &self.config.cleaning)?;
        let transcript = Transcript::new(cleaning.text.clone(), self.estimator.as_ref());
        info!(
            "Transcript: {} chars, ~{} tokens",
            transcript.char_count, transcript.estimated_tokens
        );

        let turns = self.segmenter.segment(&transcript.text)?;
        verify_coverage(&transcript.text, &turns)?;

        let chunks = plan_chunks(&turns, &self.config.chunking, self.estimator.as_ref())?;

        Ok(Analysis {
            cleaning,
            transcript,
            turns,
            chunks,
        })
    }

    /// Refine one transcript
    ///
    /// 1. Clean, segment and plan
    /// 2. Rewrite chunk by chunk (skipped in summary-only mode)
    /// 3. Assemble the document, unless the rewrite was stopped
    /// 4. Summarize the document, or the transcript in summary-only mode
    ///
    /// A stopped rewrite is reported through `RefineOutput::failure` and a
    /// failed summary through `summary_error`, so finished work stays
    /// inspectable; structural errors return `Err`.
    pub async fn refine(&self, text: &str, cancel: &CancellationToken) -> Result<RefineOutput> {
        let analysis = self.analyze(text)?;
        let mode = self.config.mode;

        let outcome = if mode.wants_document() {
            execute_rewrite(
                self.backend.as_ref(),
                &analysis.chunks,
                &self.config.rewrite,
                cancel,
            )
            .await
        } else {
            RewriteOutcome {
                results: Vec::new(),
                abort: None,
            }
        };

        let document = match &outcome.abort {
            Some(error) => {
                warn!("Rewrite stopped: {}", error);
                None
            }
            None if mode.wants_document() => Some(assemble(&outcome.results)?),
            None => None,
        };

        let mut summary = None;
        let mut summary_error = None;
        if mode.wants_summary() && !outcome.is_aborted() {
            let input = match &document {
                Some(document) => SummaryInput::Document(document),
                None => SummaryInput::Turns(&analysis.turns),
            };
            match summarize(
                self.backend.as_ref(),
                input,
                &self.config.summary,
                self.estimator.as_ref(),
                cancel,
            )
            .await
            {
                Ok(text) => summary = Some(text),
                Err(error) => {
                    warn!("Summary failed: {}", error);
                    summary_error = Some(error);
                }
            }
        }

        Ok(RefineOutput {
            analysis,
            outcome,
            document,
            summary,
            summary_error,
        })
    }

    /// Refine several transcripts, up to `documents_concurrency` at once.
    ///
    /// Each document runs its own sequential rewrite; they share only the
    /// backend's request slots. Results keep input order.
    pub async fn refine_many(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Vec<Result<RefineOutput>> {
        info!(
            "Refining {} documents, {} at a time",
            texts.len(),
            self.config.documents_concurrency
        );
        stream::iter(texts)
            .map(|text| self.refine(text, cancel))
            .buffered(self.config.documents_concurrency)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputMode;
    use crate::llm::PassthroughBackend;

    fn words(text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn pipeline(mode: OutputMode) -> Pipeline {
        let mut config = RefineConfig::default();
        config.mode = mode;
        config.chunking.max_tokens = 8;
        config.chunking.overlap_tokens = 3;
        Pipeline::new(config, Arc::new(PassthroughBackend::new()))
            .unwrap()
            .with_estimator(Arc::new(words))
    }

    const TEXT: &str = "Host: welcome to the show everyone.\nGuest: thanks for having me here today.\nHost: let us begin with the news.\n";

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = RefineConfig::default();
        config.chunking.overlap_tokens = config.chunking.max_tokens;
        assert!(matches!(
            Pipeline::new(config, Arc::new(PassthroughBackend::new())),
            Err(RefineError::Planning(_))
        ));
    }

    #[test]
    fn test_analyze_plans_turns() {
        let analysis = pipeline(OutputMode::Full).analyze(TEXT).unwrap();
        assert_eq!(analysis.turns.len(), 3);
        assert_eq!(analysis.chunks.len(), 3);
        assert!(analysis.chunks[1].has_overlap());
        let planned: String = analysis.chunks.iter().map(|c| c.non_overlap_text()).collect();
        assert_eq!(planned, analysis.transcript.text);
    }

    #[tokio::test]
    async fn test_refine_passthrough_keeps_text() {
        let output = pipeline(OutputMode::Full)
            .refine(TEXT, &CancellationToken::new())
            .await
            .unwrap();
        assert!(output.failure().is_none());
        assert_eq!(output.results().len(), 3);
        let document = output.document.unwrap();
        assert_eq!(
            document.render(),
            "Host:\nwelcome to the show everyone.\n\nGuest:\nthanks for having me here today.\n\nHost:\nlet us begin with the news.\n"
        );
        assert!(output.summary.is_none());
    }

    #[tokio::test]
    async fn test_summary_mode_skips_rewrite() {
        let output = pipeline(OutputMode::Summary)
            .refine(TEXT, &CancellationToken::new())
            .await
            .unwrap();
        assert!(output.results().is_empty());
        assert!(output.document.is_none());
        assert!(output.summary.is_some());
    }

    #[tokio::test]
    async fn test_cancelled_run_keeps_analysis() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let output = pipeline(OutputMode::Both).refine(TEXT, &cancel).await.unwrap();
        assert!(matches!(
            output.failure(),
            Some(RefineError::Cancelled { chunk_index: 0 })
        ));
        assert!(output.document.is_none());
        assert!(output.summary.is_none());
        assert_eq!(output.analysis.chunks.len(), 3);
    }

    /// Rewrites like the passthrough backend; rejects every summary call
    struct NoSummaryBackend;

    #[async_trait::async_trait]
    impl GenerationBackend for NoSummaryBackend {
        async fn generate(
            &self,
            request: &crate::llm::GenerationRequest,
        ) -> std::result::Result<String, crate::error::BackendError> {
            if request.prompt.contains("## Content") {
                return Err(crate::error::BackendError::Permanent(
                    "summary rejected".to_string(),
                ));
            }
            PassthroughBackend::new().respond(&request.prompt)
        }

        fn name(&self) -> &str {
            "no-summary"
        }
    }

    #[tokio::test]
    async fn test_failed_summary_keeps_document() {
        let mut config = RefineConfig::default();
        config.mode = OutputMode::Both;
        config.chunking.max_tokens = 8;
        config.chunking.overlap_tokens = 3;
        let pipeline = Pipeline::new(config, Arc::new(NoSummaryBackend))
            .unwrap()
            .with_estimator(Arc::new(words));

        let output = pipeline
            .refine(TEXT, &CancellationToken::new())
            .await
            .unwrap();
        assert!(output.failure().is_none());
        assert_eq!(output.results().len(), 3);
        assert!(output.results().iter().all(|r| r.is_success()));
        assert!(output.document.is_some());
        assert!(output.summary.is_none());
        assert!(matches!(
            output.summary_error,
            Some(RefineError::Summarization(_))
        ));
    }

    #[tokio::test]
    async fn test_refine_many_keeps_order() {
        let mut config = RefineConfig::default();
        config.documents_concurrency = 2;
        let pipeline = Pipeline::new(config, Arc::new(PassthroughBackend::new())).unwrap();
        let texts = vec![
            "A: first document.\n".to_string(),
            "B: second document.\n".to_string(),
            "C: third document.\n".to_string(),
        ];
        let outputs = pipeline.refine_many(&texts, &CancellationToken::new()).await;
        let speakers: Vec<String> = outputs
            .into_iter()
            .map(|o| o.unwrap().document.unwrap().speakers()[0].to_string())
            .collect();
        assert_eq!(speakers, vec!["A", "B", "C"]);
    }
}
