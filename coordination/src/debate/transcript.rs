//! Human-readable debate transcripts.
//!
//! One markdown file per debate plus an `index.json` mapping debate ids to
//! their current file. Updating a transcript moves the previous file into
//! `archive/` first. Transcripts are for auditing only and never feed back
//! into the live state machine.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::round::DebateRound;
use super::state::{DebateId, DebatePhase, DebateRecord};

const INDEX_FILE: &str = "index.json";
const ARCHIVE_DIR: &str = "archive";

/// Errors from transcript operations.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("transcript I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("transcript index is unreadable: {0}")]
    Index(String),

    #[error("no transcript for debate {0}")]
    NotFound(String),
}

/// Result type for transcript operations
pub type TranscriptResult<T> = Result<T, TranscriptError>;

/// Index entry for one transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMeta {
    pub debate_id: DebateId,
    pub team: String,
    pub domain: String,
    pub topic: String,
    pub phase: DebatePhase,
    pub path: PathBuf,
    /// Number of times this transcript was written.
    pub version: u32,
    pub updated_at: DateTime<Utc>,
}

/// Sink for debate transcripts.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    /// Write a transcript for a record, returning its location.
    async fn write(&self, record: &DebateRecord) -> TranscriptResult<PathBuf>;

    /// Replace the transcript for `debate_id`, archiving the previous file.
    async fn update(&self, debate_id: &str, record: &DebateRecord) -> TranscriptResult<PathBuf>;

    /// Current transcript text, if one exists.
    async fn read(&self, debate_id: &str) -> TranscriptResult<Option<String>>;

    /// All indexed transcripts, most recently updated first.
    async fn list(&self) -> TranscriptResult<Vec<TranscriptMeta>>;
}

/// Shared reference to a transcript sink.
pub type SharedTranscriptSink = Arc<dyn TranscriptSink>;

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTranscriptSink;

#[async_trait]
impl TranscriptSink for NullTranscriptSink {
    async fn write(&self, record: &DebateRecord) -> TranscriptResult<PathBuf> {
        Ok(PathBuf::from(format!("/dev/null/{}", record.id)))
    }

    async fn update(&self, debate_id: &str, _record: &DebateRecord) -> TranscriptResult<PathBuf> {
        Ok(PathBuf::from(format!("/dev/null/{debate_id}")))
    }

    async fn read(&self, _debate_id: &str) -> TranscriptResult<Option<String>> {
        Ok(None)
    }

    async fn list(&self) -> TranscriptResult<Vec<TranscriptMeta>> {
        Ok(Vec::new())
    }
}

/// Markdown transcripts on the local filesystem.
pub struct FileTranscriptSink {
    root: PathBuf,
    index: Mutex<HashMap<DebateId, TranscriptMeta>>,
}

impl FileTranscriptSink {
    /// Open (or create) a transcript directory and load its index.
    pub async fn open(root: impl Into<PathBuf>) -> TranscriptResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join(ARCHIVE_DIR)).await?;

        let index_path = root.join(INDEX_FILE);
        let index = match tokio::fs::read_to_string(&index_path).await {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| TranscriptError::Index(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            root,
            index: Mutex::new(index),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn transcript_path(&self, debate_id: &str) -> PathBuf {
        self.root.join(format!("{debate_id}.md"))
    }

    async fn save_index(&self, index: &HashMap<DebateId, TranscriptMeta>) -> TranscriptResult<()> {
        let json =
            serde_json::to_string_pretty(index).map_err(|e| TranscriptError::Index(e.to_string()))?;
        // Write-then-rename: readers never see a partial index.
        let tmp = self.root.join(format!("{INDEX_FILE}.tmp"));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, self.root.join(INDEX_FILE)).await?;
        Ok(())
    }

    async fn write_locked(
        &self,
        index: &mut HashMap<DebateId, TranscriptMeta>,
        record: &DebateRecord,
        version: u32,
    ) -> TranscriptResult<PathBuf> {
        let path = self.transcript_path(&record.id);
        tokio::fs::write(&path, render_transcript(record)).await?;

        index.insert(
            record.id.clone(),
            TranscriptMeta {
                debate_id: record.id.clone(),
                team: record.team.clone(),
                domain: record.domain.clone(),
                topic: record.topic.clone(),
                phase: record.current_phase,
                path: path.clone(),
                version,
                updated_at: Utc::now(),
            },
        );
        self.save_index(index).await?;
        debug!(debate_id = %record.id, version, path = %path.display(), "Transcript written");
        Ok(path)
    }
}

#[async_trait]
impl TranscriptSink for FileTranscriptSink {
    async fn write(&self, record: &DebateRecord) -> TranscriptResult<PathBuf> {
        let mut index = self.index.lock().await;
        if index.contains_key(&record.id) {
            drop(index);
            return self.update(&record.id, record).await;
        }
        self.write_locked(&mut index, record, 1).await
    }

    async fn update(&self, debate_id: &str, record: &DebateRecord) -> TranscriptResult<PathBuf> {
        let mut index = self.index.lock().await;
        let version = match index.get(debate_id) {
            Some(meta) => {
                if tokio::fs::try_exists(&meta.path).await? {
                    let archived = self.root.join(ARCHIVE_DIR).join(format!(
                        "{debate_id}.v{}.{}.md",
                        meta.version,
                        Utc::now().format("%Y%m%dT%H%M%S%3f")
                    ));
                    tokio::fs::rename(&meta.path, &archived).await?;
                }
                meta.version + 1
            }
            None => 1,
        };
        self.write_locked(&mut index, record, version).await
    }

    async fn read(&self, debate_id: &str) -> TranscriptResult<Option<String>> {
        let path = match self.index.lock().await.get(debate_id) {
            Some(meta) => meta.path.clone(),
            None => return Ok(None),
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> TranscriptResult<Vec<TranscriptMeta>> {
        let mut entries: Vec<TranscriptMeta> = self.index.lock().await.values().cloned().collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(entries)
    }
}

/// Render a record as a markdown transcript.
pub fn render_transcript(record: &DebateRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Debate: {}", record.topic);
    let _ = writeln!(out);
    let _ = writeln!(out, "- id: {}", record.id);
    let _ = writeln!(out, "- team: {} ({})", record.team, record.domain);
    let _ = writeln!(out, "- version: {}", record.version);
    let _ = writeln!(out, "- priority: {}", record.priority);
    let _ = writeln!(out, "- phase: {}", record.current_phase);
    let _ = writeln!(out, "- started: {}", record.started_at.to_rfc3339());
    if let Some(done) = record.completed_at {
        let _ = writeln!(out, "- finished: {}", done.to_rfc3339());
    }
    if !record.context_data.is_null() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Context");
        let _ = writeln!(out);
        let _ = writeln!(out, "```json");
        let _ = writeln!(
            out,
            "{}",
            serde_json::to_string_pretty(&record.context_data).unwrap_or_default()
        );
        let _ = writeln!(out, "```");
    }

    for round in record.rounds() {
        render_round(&mut out, round);
    }

    if !record.governance_reviews.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Governance");
        for review in &record.governance_reviews {
            let _ = writeln!(out);
            let verdict = if review.approved { "approved" } else { "rejected" };
            let _ = writeln!(
                out,
                "### {} ({verdict}, score {})",
                review.reviewer, review.score
            );
            for issue in &review.issues {
                let _ = writeln!(
                    out,
                    "- [{}/{}] {}",
                    issue.severity, issue.kind, issue.description
                );
            }
            for rec in &review.recommendations {
                let _ = writeln!(out, "- recommendation: {rec}");
            }
        }
    }

    if let Some(decision) = &record.final_decision {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Final decision");
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", decision.recommendation);
        let _ = writeln!(out);
        let _ = writeln!(out, "Confidence: {}%", decision.confidence);
        for action in &decision.actions {
            let _ = writeln!(out, "- {action}");
        }
        if let Some(dissent) = &decision.dissent {
            let _ = writeln!(out);
            let _ = writeln!(out, "Dissent: {dissent}");
        }
    }

    if let Some(reason) = &record.cancel_reason {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Cancelled");
        let _ = writeln!(out);
        let _ = writeln!(out, "{reason}");
    }

    out
}

fn render_round(out: &mut String, round: &DebateRound) {
    let _ = writeln!(out);
    let _ = writeln!(out, "## {} ({})", round.phase, round.author);
    let _ = writeln!(out);
    let _ = writeln!(out, "**{}** (confidence {}%)", round.content.position, round.content.confidence);
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", round.content.reasoning);
    if !round.content.evidence.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Evidence:");
        for item in &round.content.evidence {
            match item.as_str() {
                Some(s) => {
                    let _ = writeln!(out, "- {s}");
                }
                None => {
                    let _ = writeln!(out, "- {item}");
                }
            }
        }
    }
    if !round.content.suggested_actions.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Actions:");
        for action in &round.content.suggested_actions {
            let _ = writeln!(out, "- {action}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::round::{DebateContent, RoundDirective};
    use crate::debate::state::PersonaRole;

    fn record() -> DebateRecord {
        let mut record = DebateRecord::new(
            "profitability-team",
            "profitability",
            "Margin erosion on line B",
            serde_json::json!({"margin": 0.08}),
        );
        let round = DebateRound::new(
            &record.id,
            PersonaRole::Optimist,
            "profitability-team/optimist",
            DebateContent {
                position: "Reprice line B".to_string(),
                reasoning: "Demand is inelastic".to_string(),
                evidence: vec![serde_json::json!("elasticity -0.3")],
                confidence: 68,
                suggested_actions: Vec::new(),
            },
            RoundDirective::for_role(PersonaRole::Optimist, ""),
            Vec::new(),
        );
        record.apply_round(round).unwrap();
        record
    }

    #[test]
    fn test_render_contains_rounds() {
        let text = render_transcript(&record());
        assert!(text.contains("# Debate: Margin erosion on line B"));
        assert!(text.contains("## thesis"));
        assert!(text.contains("Reprice line B"));
        assert!(text.contains("- elasticity -0.3"));
    }

    #[tokio::test]
    async fn test_write_read_list() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileTranscriptSink::open(dir.path()).await.unwrap();
        let record = record();

        let path = sink.write(&record).await.unwrap();
        assert!(path.exists());

        let text = sink.read(&record.id).await.unwrap().unwrap();
        assert!(text.contains("Reprice line B"));

        let list = sink.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].version, 1);
        assert!(sink.read("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_archives_previous() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileTranscriptSink::open(dir.path()).await.unwrap();
        let mut record = record();
        sink.write(&record).await.unwrap();

        record.cancel("superseded").unwrap();
        sink.update(&record.id, &record).await.unwrap();

        let archived = std::fs::read_dir(dir.path().join(ARCHIVE_DIR)).unwrap().count();
        assert_eq!(archived, 1);
        let text = sink.read(&record.id).await.unwrap().unwrap();
        assert!(text.contains("superseded"));
        assert_eq!(sink.list().await.unwrap()[0].version, 2);
    }

    #[tokio::test]
    async fn test_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let record = record();
        {
            let sink = FileTranscriptSink::open(dir.path()).await.unwrap();
            sink.write(&record).await.unwrap();
        }
        let reopened = FileTranscriptSink::open(dir.path()).await.unwrap();
        assert!(reopened.read(&record.id).await.unwrap().is_some());
    }
}
