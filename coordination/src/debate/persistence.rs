//! Debate persistence: revision-stamped snapshots and the store contract.
//!
//! Snapshots serialize a whole [`DebateRecord`] to JSON. Restores run an
//! integrity check first so a half-written or hand-edited row cannot put the
//! state machine into an impossible phase.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::state::{DebateId, DebatePhase, DebateRecord};

/// A persisted view of one debate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateSnapshot {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// Record revision at snapshot time. Stores keep the highest.
    pub revision: u64,
    /// What triggered the snapshot.
    pub reason: String,
    pub saved_at: DateTime<Utc>,
    pub record: DebateRecord,
}

impl DebateSnapshot {
    /// Current schema version.
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(record: &DebateRecord, reason: &str) -> Self {
        Self {
            schema_version: Self::CURRENT_VERSION,
            revision: record.revision,
            reason: reason.to_string(),
            saved_at: Utc::now(),
            record: record.clone(),
        }
    }

    pub fn debate_id(&self) -> &str {
        &self.record.id
    }

    pub fn phase(&self) -> DebatePhase {
        self.record.current_phase
    }

    pub fn to_json(&self) -> Result<String, PersistenceError> {
        serde_json::to_string(self).map_err(|e| PersistenceError::SerializeFailed {
            reason: e.to_string(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| PersistenceError::DeserializeFailed {
                reason: e.to_string(),
            })?;

        if snapshot.schema_version > Self::CURRENT_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: Self::CURRENT_VERSION,
                found: snapshot.schema_version,
            });
        }

        Ok(snapshot)
    }
}

/// Error during persistence operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    #[error("serialize failed: {reason}")]
    SerializeFailed { reason: String },
    #[error("deserialize failed: {reason}")]
    DeserializeFailed { reason: String },
    #[error("version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("integrity check failed: {reason}")]
    IntegrityCheckFailed { reason: String },
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Integrity check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityStatus {
    /// Snapshot is valid and can be resumed.
    Valid,
    /// Snapshot has minor issues but is recoverable.
    Recoverable { warnings: Vec<String> },
    /// Snapshot is corrupted and cannot be used.
    Corrupted { errors: Vec<String> },
}

impl IntegrityStatus {
    /// Whether resume is safe.
    pub fn can_resume(&self) -> bool {
        matches!(self, Self::Valid | Self::Recoverable { .. })
    }
}

/// Validate a snapshot before putting it back into the live state machine.
pub fn validate_snapshot(snapshot: &DebateSnapshot) -> IntegrityStatus {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let record = &snapshot.record;

    if snapshot.schema_version > DebateSnapshot::CURRENT_VERSION {
        errors.push(format!(
            "schema version {} > current {}",
            snapshot.schema_version,
            DebateSnapshot::CURRENT_VERSION
        ));
    }

    if record.id.is_empty() {
        errors.push("record has no id".to_string());
    }

    // Rounds must be a prefix of thesis → antithesis → synthesis.
    let slots = [
        record.thesis.is_some(),
        record.antithesis.is_some(),
        record.synthesis.is_some(),
    ];
    if slots.windows(2).any(|w| !w[0] && w[1]) {
        errors.push("rounds are not a prefix of thesis/antithesis/synthesis".to_string());
    }

    let rounds = record.rounds();
    if record.current_phase != DebatePhase::Cancelled
        && rounds.len() != record.current_phase.expected_round_count()
    {
        errors.push(format!(
            "phase {} expects {} rounds, found {}",
            record.current_phase,
            record.current_phase.expected_round_count(),
            rounds.len()
        ));
    }

    for (i, round) in rounds.iter().enumerate() {
        if round.debate_id != record.id {
            errors.push(format!("round {} belongs to debate {}", round.id, round.debate_id));
        }
        let missing = rounds[..i]
            .iter()
            .filter(|prior| !round.responds_to.contains(&prior.id))
            .count();
        if missing > 0 {
            errors.push(format!(
                "{} round does not respond to {} prior round(s)",
                round.phase, missing
            ));
        }
    }

    if let Some(last) = record.transitions.last() {
        if last.to != record.current_phase {
            errors.push(format!(
                "last transition target {} doesn't match current phase {}",
                last.to, record.current_phase
            ));
        }
    }

    if snapshot.revision != record.revision {
        warnings.push(format!(
            "snapshot revision {} differs from record revision {}",
            snapshot.revision, record.revision
        ));
    }

    for review in &record.governance_reviews {
        if !record.requested_reviewers.contains(&review.reviewer) {
            warnings.push(format!("unrequested review from {}", review.reviewer));
        }
    }

    if record.current_phase.is_terminal() {
        warnings.push(format!("record is already {}", record.current_phase));
    }

    if !errors.is_empty() {
        IntegrityStatus::Corrupted { errors }
    } else if !warnings.is_empty() {
        IntegrityStatus::Recoverable { warnings }
    } else {
        IntegrityStatus::Valid
    }
}

/// Filter for [`DebateStore::query_active_or_recent`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebateQuery {
    /// Include complete and cancelled debates.
    pub include_terminal: bool,
    /// Only snapshots saved at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Cap on the number of rows, newest first.
    pub limit: Option<usize>,
}

impl DebateQuery {
    /// Non-terminal debates only, used by restore.
    pub fn active() -> Self {
        Self::default()
    }

    /// The `limit` most recent debates of any phase.
    pub fn recent(limit: usize) -> Self {
        Self {
            include_terminal: true,
            since: None,
            limit: Some(limit),
        }
    }

    pub fn matches(&self, snapshot: &DebateSnapshot) -> bool {
        if !self.include_terminal && snapshot.phase().is_terminal() {
            return false;
        }
        match self.since {
            Some(since) => snapshot.saved_at >= since,
            None => true,
        }
    }
}

/// Durable store for debate snapshots. Best-effort: the manager's in-memory
/// state stays authoritative while a debate is live.
#[async_trait]
pub trait DebateStore: Send + Sync {
    /// Insert or replace the row for this debate. Implementations ignore a
    /// snapshot whose revision is lower than the stored one.
    async fn upsert_debate(&self, snapshot: &DebateSnapshot) -> PersistenceResult<()>;

    /// Rows matching the query, newest first.
    async fn query_active_or_recent(
        &self,
        query: &DebateQuery,
    ) -> PersistenceResult<Vec<DebateSnapshot>>;
}

/// Shared reference to a store.
pub type SharedDebateStore = Arc<dyn DebateStore>;

/// In-process store. Used by tests and by the CLI when no database is configured.
#[derive(Default)]
pub struct MemoryDebateStore {
    rows: RwLock<HashMap<DebateId, DebateSnapshot>>,
}

impl MemoryDebateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedDebateStore {
        Arc::new(self)
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn get(&self, debate_id: &str) -> Option<DebateSnapshot> {
        self.rows.read().await.get(debate_id).cloned()
    }
}

#[async_trait]
impl DebateStore for MemoryDebateStore {
    async fn upsert_debate(&self, snapshot: &DebateSnapshot) -> PersistenceResult<()> {
        let mut rows = self.rows.write().await;
        if let Some(existing) = rows.get(snapshot.debate_id()) {
            if existing.revision > snapshot.revision {
                debug!(
                    debate_id = snapshot.debate_id(),
                    stored = existing.revision,
                    incoming = snapshot.revision,
                    "Ignoring stale snapshot"
                );
                return Ok(());
            }
        }
        rows.insert(snapshot.debate_id().to_string(), snapshot.clone());
        Ok(())
    }

    async fn query_active_or_recent(
        &self,
        query: &DebateQuery,
    ) -> PersistenceResult<Vec<DebateSnapshot>> {
        let rows = self.rows.read().await;
        let mut matched: Vec<DebateSnapshot> =
            rows.values().filter(|s| query.matches(s)).cloned().collect();
        matched.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }
}
