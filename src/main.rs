use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use redraft::{
    collect_inputs, create_backend, output_path, read_transcript, write_text, BackendKind,
    CancellationToken, ExhaustionPolicy, GenerationBackend, OutputMode, PassthroughBackend,
    Pipeline, RefineConfig, RunReport,
};

#[derive(Parser)]
#[command(name = "redraft")]
#[command(author, version, about = "Rewrite long speaker-annotated transcripts into polished documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every subcommand
#[derive(clap::Args)]
struct CommonArgs {
    /// JSON config file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Token budget per chunk
    #[arg(long)]
    max_tokens: Option<usize>,

    /// Token budget for context carried between chunks
    #[arg(long)]
    overlap_tokens: Option<usize>,

    /// Skip transcript cleaning
    #[arg(long)]
    no_clean: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(clap::Args)]
struct BackendArgs {
    /// Text generation backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Model name for the backend
    #[arg(long)]
    model: Option<String>,

    /// Custom endpoint for the backend
    #[arg(long)]
    base_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite transcripts into documents
    Refine {
        /// Transcript files or directories of .txt/.md files
        #[arg(short, long, num_args = 1.., required = true)]
        input: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Also write a summary of each document
        #[arg(long)]
        summary: bool,

        /// Write only the summary; skips rewriting
        #[arg(long, conflicts_with = "summary")]
        summary_only: bool,

        /// Stop a document at its first failed chunk instead of keeping the original text
        #[arg(long)]
        fail_fast: bool,

        /// Documents processed at once
        #[arg(short, long)]
        jobs: Option<usize>,

        #[command(flatten)]
        backend: BackendArgs,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Summarize a transcript
    Summarize {
        /// Transcript file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for the summary
        #[arg(short, long)]
        output: PathBuf,

        /// Section labels of the summary, comma separated
        #[arg(long, value_delimiter = ',')]
        structure: Option<Vec<String>>,

        #[command(flatten)]
        backend: BackendArgs,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Show speaker turns and the chunk plan without calling a backend
    Analyze {
        /// Transcript file
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Refine {
            input,
            output,
            summary,
            summary_only,
            fail_fast,
            jobs,
            backend,
            common,
        } => {
            setup_logging(common.verbose);
            let mut config = load_config(&common, Some(&backend))?;
            if summary {
                config.mode = OutputMode::Both;
            } else if summary_only {
                config.mode = OutputMode::Summary;
            }
            if fail_fast {
                config.rewrite.retry.on_exhaustion = ExhaustionPolicy::FailFast;
            }
            if let Some(jobs) = jobs {
                config.documents_concurrency = jobs;
                config.backend.slots = config.backend.slots.max(jobs);
            }
            refine_transcripts(input, output, config).await
        }
        Commands::Summarize {
            input,
            output,
            structure,
            backend,
            common,
        } => {
            setup_logging(common.verbose);
            let mut config = load_config(&common, Some(&backend))?;
            config.mode = OutputMode::Summary;
            if let Some(structure) = structure {
                config.summary.structure = structure
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            summarize_transcript(input, output, config).await
        }
        Commands::Analyze { input, common } => {
            setup_logging(common.verbose);
            let config = load_config(&common, None)?;
            analyze_transcript(input, config)
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(common: &CommonArgs, backend: Option<&BackendArgs>) -> Result<RefineConfig> {
    let mut config = match &common.config {
        Some(path) => RefineConfig::from_file(path).context("Failed to load config")?,
        None => RefineConfig::default(),
    };

    if let Some(max_tokens) = common.max_tokens {
        config.chunking.max_tokens = max_tokens;
    }
    if let Some(overlap_tokens) = common.overlap_tokens {
        config.chunking.overlap_tokens = overlap_tokens;
    }
    if common.no_clean {
        config.cleaning.enabled = false;
    }
    if let Some(args) = backend {
        if let Some(kind) = args.backend {
            config.backend.kind = kind;
        }
        if args.model.is_some() {
            config.backend.model = args.model.clone();
        }
        if args.base_url.is_some() {
            config.backend.base_url = args.base_url.clone();
        }
    }

    config.validate()?;
    Ok(config)
}

/// Cancel the run on Ctrl+C; chunks already done stay in the report
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            token.cancel();
        }
    });
    cancel
}

async fn refine_transcripts(inputs: Vec<PathBuf>, output_dir: PathBuf, config: RefineConfig) -> Result<()> {
    let files = collect_inputs(&inputs)?;
    info!("Refining {} transcript(s) into {:?}", files.len(), output_dir);

    let texts = files
        .iter()
        .map(|path| read_transcript(path))
        .collect::<Result<Vec<String>>>()?;

    let backend = create_backend(&config.backend)?;
    let backend_name = backend.name().to_string();
    let pipeline = Pipeline::new(config, backend)?;
    let cancel = cancel_on_ctrl_c();

    let run_id = uuid::Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let stamp = Local::now();
    let outputs = pipeline.refine_many(&texts, &cancel).await;

    let config = pipeline.config();
    let mut failed = 0;
    for (path, output) in files.iter().zip(outputs) {
        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!("{:?}: {}", path, e);
                failed += 1;
                continue;
            }
        };

        if let Some(document) = &output.document {
            let target = output_path(&output_dir, &config.document_filename, path, stamp);
            write_text(&target, &document.render())?;
            if document.is_degraded() {
                warn!(
                    "{:?}: chunks {:?} kept their original text",
                    target, document.degraded_chunks
                );
            }
            info!("Document written to {:?}", target);
        }
        if let Some(summary) = &output.summary {
            let target = output_path(&output_dir, &config.summary_filename, path, stamp);
            write_text(&target, summary)?;
            info!("Summary written to {:?}", target);
        }

        let report = RunReport::new(&run_id, path, &backend_name, started_at, &output);
        let target = output_path(&output_dir, &config.report_filename, path, stamp);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        report.write_json(&target)?;

        if let Some(error) = output.failure() {
            warn!(
                "{:?}: stopped after {} of {} chunks: {}",
                path,
                output.results().len(),
                output.analysis.chunks.len(),
                error
            );
            failed += 1;
        } else if let Some(error) = &output.summary_error {
            warn!("{:?}: document kept, summary failed: {}", path, error);
            failed += 1;
        }
    }

    info!(
        "Complete: {} of {} transcript(s) refined",
        files.len() - failed,
        files.len()
    );
    if failed > 0 {
        bail!("{} of {} transcript(s) failed", failed, files.len());
    }
    Ok(())
}

async fn summarize_transcript(input: PathBuf, output: PathBuf, config: RefineConfig) -> Result<()> {
    info!("Summarizing transcript from {:?}", input);
    let text = read_transcript(&input)?;

    let backend = create_backend(&config.backend)?;
    let pipeline = Pipeline::new(config, backend)?;
    let cancel = cancel_on_ctrl_c();

    let result = pipeline.refine(&text, &cancel).await?;
    if let Some(error) = result.summary_error {
        return Err(error.into());
    }
    let Some(summary) = result.summary else {
        bail!("No summary produced for {:?}", input);
    };
    write_text(&output, &summary)?;
    info!("Summary written to {:?}", output);
    Ok(())
}

fn analyze_transcript(input: PathBuf, config: RefineConfig) -> Result<()> {
    info!("Analyzing transcript from {:?}", input);
    let text = read_transcript(&input)?;
    let pipeline = Pipeline::new(config, Arc::new(PassthroughBackend::new()))?;
    let analysis = pipeline.analyze(&text)?;
    print_analysis(&input, &analysis, pipeline.config());
    Ok(())
}

fn print_analysis(input: &Path, analysis: &redraft::Analysis, config: &RefineConfig) {
    println!("Transcript Analysis");
    println!("==================");
    println!("File: {:?}", input);
    println!("Characters: {}", analysis.transcript.char_count);
    println!("Estimated tokens: {}", analysis.transcript.estimated_tokens);
    println!("Timestamps removed: {}", analysis.cleaning.timestamps_removed);
    println!("Fillers removed: {}", analysis.cleaning.fillers_removed);
    println!();

    println!("Speaker Turns");
    println!("-------------");
    let mut speakers: Vec<(&str, usize)> = Vec::new();
    for turn in &analysis.turns {
        let name = turn.speaker.as_deref().unwrap_or("(unlabeled)");
        match speakers.iter_mut().find(|(s, _)| *s == name) {
            Some((_, count)) => *count += 1,
            None => speakers.push((name, 1)),
        }
    }
    println!("Total turns: {}", analysis.turns.len());
    for (speaker, count) in &speakers {
        println!("{}: {} turns", speaker, count);
    }
    println!();

    println!("Chunk Plan");
    println!("----------");
    println!(
        "Budget: {} tokens, overlap {} tokens",
        config.chunking.max_tokens, config.chunking.overlap_tokens
    );
    for chunk in &analysis.chunks {
        println!(
            "Chunk {}/{}: {} fragments, ~{} tokens, overlap ~{} tokens{}",
            chunk.index + 1,
            chunk.total_chunks,
            chunk.fragments.len(),
            chunk.estimated_tokens,
            chunk.overlap_tokens,
            if chunk.over_budget { " (over budget)" } else { "" }
        );
    }
}
