pub mod cancel;
pub mod config;
pub mod error;
pub mod heuristics;
pub mod io;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod stages;

pub use cancel::CancellationToken;
pub use config::{OutputMode, RefineConfig};
pub use error::{BackendError, RefineError, Result};
pub use heuristics::{clean_transcript, CleaningConfig, CleaningResult};
pub use io::{collect_inputs, output_path, read_transcript, write_text, RunReport};
pub use llm::{
    create_backend, AnthropicClient, AnthropicConfig, BackendConfig, BackendKind,
    ExhaustionPolicy, GenerationBackend, GenerationOptions, GenerationRequest, OllamaClient,
    OllamaConfig, OpenAiClient, OpenAiConfig, PassthroughBackend, RetryPolicy,
    SlotLimitedBackend,
};
pub use models::{
    Chunk, ChunkResult, ChunkStatus, Document, HeuristicEstimator, PlanConfig, SpeakerTurn,
    TokenEstimator, Transcript,
};
pub use pipeline::{Analysis, Pipeline, RefineOutput};
pub use stages::{
    assemble, execute_rewrite, plan_chunks, summarize, RewriteConfig, RewriteOutcome,
    SegmenterConfig, SpeakerSegmenter, SummaryConfig, SummaryInput,
};
