use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::models::{ChunkResult, ChunkStatus};
use crate::pipeline::RefineOutput;

/// Machine-readable record of one document's run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub input: String,
    pub backend: String,
    /// RFC 3339, UTC
    pub started_at: String,
    pub finished_at: String,
    pub transcript_chars: usize,
    pub estimated_tokens: usize,
    pub turns: usize,
    pub speakers: Vec<String>,
    pub chunks: Vec<ChunkReport>,
    pub degraded_chunks: Vec<usize>,
    pub over_budget_chunks: Vec<usize>,
    pub timestamps_removed: usize,
    pub fillers_removed: usize,
    /// Why the run stopped early, if it did
    pub failure: Option<String>,
    pub summary_written: bool,
    /// Why a requested summary is missing
    pub summary_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkReport {
    pub index: usize,
    pub status: ChunkStatus,
    pub attempts: u32,
    pub over_budget: bool,
    pub error: Option<String>,
}

impl From<&ChunkResult> for ChunkReport {
    fn from(result: &ChunkResult) -> Self {
        Self {
            index: result.chunk_index,
            status: result.status,
            attempts: result.attempts,
            over_budget: result.over_budget,
            error: result.error.clone(),
        }
    }
}

impl RunReport {
    /// Summarize a finished run
    pub fn new(
        run_id: &str,
        input: &Path,
        backend: &str,
        started_at: DateTime<Utc>,
        output: &RefineOutput,
    ) -> Self {
        let analysis = &output.analysis;
        let mut speakers: Vec<String> = Vec::new();
        for speaker in analysis.turns.iter().filter_map(|t| t.speaker.as_ref()) {
            if !speakers.contains(speaker) {
                speakers.push(speaker.clone());
            }
        }

        let results = output.results();
        Self {
            run_id: run_id.to_string(),
            input: input.display().to_string(),
            backend: backend.to_string(),
            started_at: started_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
            transcript_chars: analysis.transcript.char_count,
            estimated_tokens: analysis.transcript.estimated_tokens,
            turns: analysis.turns.len(),
            speakers,
            chunks: results.iter().map(ChunkReport::from).collect(),
            degraded_chunks: results
                .iter()
                .filter(|r| r.is_degraded())
                .map(|r| r.chunk_index)
                .collect(),
            over_budget_chunks: analysis
                .chunks
                .iter()
                .filter(|c| c.over_budget)
                .map(|c| c.index)
                .collect(),
            timestamps_removed: analysis.cleaning.timestamps_removed,
            fillers_removed: analysis.cleaning.fillers_removed,
            failure: output.failure().map(|e| e.to_string()),
            summary_written: output.summary.is_some(),
            summary_error: output.summary_error.as_ref().map(|e| e.to_string()),
        }
    }

    /// Write to a JSON file
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create file: {:?}", path))?;
        serde_json::to_writer_pretty(file, self).context("Failed to write JSON")?;
        Ok(())
    }
}

/// Write text, creating parent directories as needed
pub fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    std::fs::write(path, text).with_context(|| format!("Failed to write file: {:?}", path))?;
    Ok(())
}

/// Fill `{stem}` and `{timestamp}` (local time, `YYYYmmdd_HHMMSS`)
pub fn render_filename(template: &str, stem: &str, at: DateTime<Local>) -> String {
    template
        .replace("{stem}", stem)
        .replace("{timestamp}", &at.format("%Y%m%d_%H%M%S").to_string())
}

/// Output path for `input` under `dir` from a filename template
pub fn output_path(dir: &Path, template: &str, input: &Path, at: DateTime<Local>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "transcript".to_string());
    dir.join(render_filename(template, &stem, at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    use crate::cancel::CancellationToken;
    use crate::config::RefineConfig;
    use crate::llm::PassthroughBackend;
    use crate::pipeline::Pipeline;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_render_filename() {
        assert_eq!(
            render_filename("{stem}_refined_{timestamp}.md", "meeting", at()),
            "meeting_refined_20240309_140507.md"
        );
        assert_eq!(render_filename("fixed.md", "meeting", at()), "fixed.md");
    }

    #[test]
    fn test_output_path_uses_input_stem() {
        let path = output_path(
            Path::new("/out"),
            "{stem}.md",
            Path::new("/in/weekly sync.txt"),
            at(),
        );
        assert_eq!(path, PathBuf::from("/out/weekly sync.md"));
    }

    #[test]
    fn test_write_text_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/doc.md");
        write_text(&path, "Host:\nHello.\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Host:\nHello.\n");
    }

    #[tokio::test]
    async fn test_report_records_chunks() {
        let pipeline =
            Pipeline::new(RefineConfig::default(), Arc::new(PassthroughBackend::new())).unwrap();
        let output = pipeline
            .refine("[00:00:01] Host: hello there.\nGuest: hi.\n", &CancellationToken::new())
            .await
            .unwrap();

        let report = RunReport::new(
            "run-1",
            Path::new("meeting.txt"),
            "passthrough",
            Utc::now(),
            &output,
        );
        assert_eq!(report.turns, 2);
        assert_eq!(report.speakers, vec!["Host", "Guest"]);
        assert_eq!(report.chunks.len(), 1);
        assert_eq!(report.chunks[0].status, ChunkStatus::Success);
        assert_eq!(report.timestamps_removed, 1);
        assert!(report.failure.is_none());
        assert!(report.summary_error.is_none());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write_json(&path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["chunks"][0]["status"], "success");
        assert_eq!(json["run_id"], "run-1");
    }
}
