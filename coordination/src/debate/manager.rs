//! Debate manager: the owner of every debate record.
//!
//! All state lives behind one async mutex. Each operation is a short critical
//! section that never awaits an external collaborator while holding it;
//! snapshot and transcript writes happen after the lock is released and carry
//! the record revision so the store can drop out-of-order writes.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use super::error::{DebateError, DebateResult};
use super::events::{DebateEvent, EventFeed};
use super::persistence::{
    validate_snapshot, DebateQuery, DebateSnapshot, IntegrityStatus, PersistenceResult,
    SharedDebateStore,
};
use super::queue::{AdmissionQueue, DebateRequest, QueueTicket, QueuedDebate, QueuedSummary};
use super::round::{DebateRound, FinalDecision, GovernanceReview, ReviewerRole};
use super::state::{DebateId, DebatePhase, DebateRecord};
use super::transcript::SharedTranscriptSink;

/// Capacity settings for the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Maximum simultaneously active debates.
    pub max_concurrent: usize,
    /// Completed or cancelled debates kept in memory.
    pub history_limit: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            history_limit: 100,
        }
    }
}

/// Outcome of [`DebateManager::initiate_debate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Admission {
    Started { debate_id: DebateId },
    Queued { ticket: QueueTicket, position: usize },
}

impl Admission {
    pub fn debate_id(&self) -> Option<&str> {
        match self {
            Self::Started { debate_id } => Some(debate_id),
            Self::Queued { .. } => None,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}

/// A debate that just took an active slot.
#[derive(Debug, Clone)]
pub struct AdmittedDebate {
    pub record: DebateRecord,
    /// Queue ticket it was admitted from, if it waited.
    pub ticket: Option<QueueTicket>,
    /// Whether the opening message should be sent right away.
    pub immediate: bool,
    /// Whether it came back from the store.
    pub restored: bool,
}

/// Result of completing or cancelling a debate.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The final record, now in history.
    pub record: DebateRecord,
    /// Queued debates admitted into the freed slot.
    pub admitted: Vec<AdmittedDebate>,
}

/// A snapshot restore declined to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSnapshot {
    pub debate_id: DebateId,
    pub reason: String,
}

/// Result of [`DebateManager::restore_from_database`].
#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    pub admitted: Vec<AdmittedDebate>,
    pub queued: Vec<QueueTicket>,
    pub skipped: Vec<SkippedSnapshot>,
    /// Terminal records loaded into history.
    pub history_loaded: usize,
}

/// Point-in-time queue view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub active: usize,
    pub capacity: usize,
    pub queued: usize,
    pub entries: Vec<QueuedSummary>,
}

/// Aggregate counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub active: usize,
    pub queued: usize,
    pub capacity: usize,
    pub history: usize,
    pub admitted: u64,
    pub queued_total: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub restored: u64,
    pub rounds_recorded: u64,
    pub reviews_recorded: u64,
    /// Mean final confidence over completed debates in history.
    pub average_confidence: Option<f64>,
    /// Mean duration in seconds over completed debates in history.
    pub average_duration_secs: Option<f64>,
    pub completed_by_domain: BTreeMap<String, usize>,
    pub persistence_failures: u64,
    pub transcript_failures: u64,
}

/// History query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub domain: Option<String>,
    pub team: Option<String>,
    pub limit: Option<usize>,
}

impl HistoryFilter {
    fn matches(&self, record: &DebateRecord) -> bool {
        self.domain.as_deref().map_or(true, |d| record.domain == d)
            && self.team.as_deref().map_or(true, |t| record.team == t)
    }
}

#[derive(Debug, Default)]
struct Counters {
    admitted: u64,
    queued: u64,
    completed: u64,
    cancelled: u64,
    restored: u64,
    rounds: u64,
    reviews: u64,
}

#[derive(Default)]
struct ManagerState {
    active: HashMap<DebateId, DebateRecord>,
    /// Oldest first.
    history: VecDeque<DebateRecord>,
    queue: AdmissionQueue,
    /// `None` while queued, the debate id once admitted. Admitted entries
    /// are dropped when the debate leaves history.
    tickets: HashMap<QueueTicket, Option<DebateId>>,
    next_ticket: QueueTicket,
    topic_versions: HashMap<(String, String), u32>,
    counters: Counters,
}

impl ManagerState {
    fn issue_ticket(&mut self) -> QueueTicket {
        self.next_ticket += 1;
        self.tickets.insert(self.next_ticket, None);
        self.next_ticket
    }

    fn next_version(&mut self, team: &str, topic: &str) -> u32 {
        let v = self
            .topic_versions
            .entry((team.to_string(), topic.to_string()))
            .or_insert(0);
        *v += 1;
        *v
    }

    fn note_version(&mut self, record: &DebateRecord) {
        let v = self
            .topic_versions
            .entry((record.team.clone(), record.topic.clone()))
            .or_insert(0);
        *v = (*v).max(record.version);
    }

    fn admit_request(&mut self, request: &DebateRequest) -> DebateRecord {
        let version = self.next_version(&request.team, &request.topic);
        let record = DebateRecord::new(
            &request.team,
            &request.domain,
            &request.topic,
            request.context.clone(),
        )
        .with_priority(request.priority)
        .with_version(version);
        self.active.insert(record.id.clone(), record.clone());
        self.counters.admitted += 1;
        record
    }

    /// Evicting a record also forgets the ticket it was admitted under, so
    /// the ticket map never outgrows queue plus active plus history.
    fn push_history(&mut self, record: DebateRecord, limit: usize) {
        self.history.push_back(record);
        while self.history.len() > limit {
            if let Some(evicted) = self.history.pop_front() {
                self.tickets
                    .retain(|_, admitted| admitted.as_deref() != Some(evicted.id.as_str()));
            }
        }
    }

    fn find_history(&self, debate_id: &str) -> Option<&DebateRecord> {
        self.history.iter().rev().find(|r| r.id == debate_id)
    }

    /// Error for an id that is not in the active set.
    fn inactive_error(&self, debate_id: &str) -> DebateError {
        match self.find_history(debate_id) {
            Some(r) if r.current_phase == DebatePhase::Complete => {
                DebateError::AlreadyComplete(debate_id.to_string())
            }
            Some(r) => DebateError::NotActive {
                debate_id: debate_id.to_string(),
                phase: r.current_phase,
            },
            None => DebateError::NotFound(debate_id.to_string()),
        }
    }

    fn active_mut(&mut self, debate_id: &str) -> DebateResult<&mut DebateRecord> {
        if !self.active.contains_key(debate_id) {
            return Err(self.inactive_error(debate_id));
        }
        self.active
            .get_mut(debate_id)
            .ok_or_else(|| DebateError::NotFound(debate_id.to_string()))
    }

    /// Fill free slots from the queue.
    fn drain_queue(&mut self, capacity: usize) -> Vec<AdmittedDebate> {
        let mut admitted = Vec::new();
        while self.active.len() < capacity {
            let Some((ticket, item)) = self.queue.pop() else {
                break;
            };
            let (record, immediate, restored) = match item {
                QueuedDebate::Fresh(request) => {
                    let record = self.admit_request(&request);
                    (record, request.immediate, false)
                }
                QueuedDebate::Restored(record) => {
                    self.active.insert(record.id.clone(), record.clone());
                    self.counters.admitted += 1;
                    (record, true, true)
                }
            };
            self.tickets.insert(ticket, Some(record.id.clone()));
            admitted.push(AdmittedDebate {
                record,
                ticket: Some(ticket),
                immediate,
                restored,
            });
        }
        admitted
    }
}

/// Owns the canonical state of all debates.
pub struct DebateManager {
    config: ManagerConfig,
    state: Mutex<ManagerState>,
    store: SharedDebateStore,
    transcripts: SharedTranscriptSink,
    events: EventFeed,
    persistence_failures: AtomicU64,
    transcript_failures: AtomicU64,
}

/// Shared reference to a manager.
pub type SharedDebateManager = Arc<DebateManager>;

impl DebateManager {
    pub fn new(
        config: ManagerConfig,
        store: SharedDebateStore,
        transcripts: SharedTranscriptSink,
        events: EventFeed,
    ) -> Self {
        Self {
            config,
            state: Mutex::new(ManagerState::default()),
            store,
            transcripts,
            events,
            persistence_failures: AtomicU64::new(0),
            transcript_failures: AtomicU64::new(0),
        }
    }

    pub fn shared(self) -> SharedDebateManager {
        Arc::new(self)
    }

    pub fn config(&self) -> ManagerConfig {
        self.config
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<DebateEvent> {
        self.events.subscribe()
    }

    /// Admit a debate if a slot is free, otherwise queue it.
    pub async fn initiate_debate(&self, request: DebateRequest) -> Admission {
        let mut state = self.state.lock().await;

        if state.active.len() < self.config.max_concurrent {
            let record = state.admit_request(&request);
            drop(state);

            info!(
                debate_id = %record.id,
                team = %record.team,
                topic = %record.topic,
                version = record.version,
                priority = %record.priority,
                "Debate admitted"
            );
            self.events.publish(DebateEvent::Admitted {
                debate_id: record.id.clone(),
                team: record.team.clone(),
                ticket: None,
                timestamp: Utc::now(),
            });
            self.persist(&record, "admitted").await;
            return Admission::Started {
                debate_id: record.id,
            };
        }

        let ticket = state.issue_ticket();
        let team = request.team.clone();
        let priority = request.priority;
        let position = state.queue.push(ticket, QueuedDebate::Fresh(request));
        state.counters.queued += 1;
        drop(state);

        info!(ticket, team = %team, %priority, position, "Debate queued at capacity");
        self.events.publish(DebateEvent::Queued {
            ticket,
            team,
            priority,
            position,
            timestamp: Utc::now(),
        });
        Admission::Queued { ticket, position }
    }

    /// Debate id a queued ticket was admitted as, once it has been.
    pub async fn resolve_ticket(&self, ticket: QueueTicket) -> Option<DebateId> {
        self.state.lock().await.tickets.get(&ticket).cloned().flatten()
    }

    /// Append the next round to an active debate.
    pub async fn record_round(
        &self,
        debate_id: &str,
        round: DebateRound,
    ) -> DebateResult<DebateRecord> {
        let phase = round.phase;
        let confidence = round.content.confidence;

        let mut state = self.state.lock().await;
        let record = state.active_mut(debate_id)?;
        record.apply_round(round)?;
        let record = record.clone();
        state.counters.rounds += 1;
        drop(state);

        debug!(debate_id, %phase, confidence, "Round recorded");
        self.events.publish(DebateEvent::RoundRecorded {
            debate_id: debate_id.to_string(),
            phase,
            confidence,
            timestamp: Utc::now(),
        });
        self.persist(&record, &format!("{phase} recorded")).await;
        self.write_transcript(&record).await;
        Ok(record)
    }

    /// Record which reviewer roles must report before finalization.
    pub async fn request_governance(
        &self,
        debate_id: &str,
        roles: &[ReviewerRole],
    ) -> DebateResult<DebateRecord> {
        let mut state = self.state.lock().await;
        let record = state.active_mut(debate_id)?;
        if record.synthesis.is_none() {
            return Err(DebateError::GovernanceNotApplicable {
                debate_id: debate_id.to_string(),
                reason: format!("no synthesis yet (phase {})", record.current_phase),
            });
        }
        record.request_reviewers(roles);
        let record = record.clone();
        drop(state);

        debug!(debate_id, reviewers = ?roles, "Governance requested");
        self.persist(&record, "governance requested").await;
        Ok(record)
    }

    /// Store a review. Replaces an earlier review from the same role. Never
    /// finalizes; that is the orchestrator's decision.
    pub async fn add_governance_review(
        &self,
        debate_id: &str,
        review: GovernanceReview,
    ) -> DebateResult<DebateRecord> {
        if review.debate_id != debate_id {
            return Err(DebateError::GovernanceNotApplicable {
                debate_id: debate_id.to_string(),
                reason: format!("review is for debate {}", review.debate_id),
            });
        }
        let reviewer = review.reviewer;
        let approved = review.approved;
        let score = review.score;

        let mut state = self.state.lock().await;
        let record = state.active_mut(debate_id)?;
        if record.synthesis.is_none() {
            return Err(DebateError::GovernanceNotApplicable {
                debate_id: debate_id.to_string(),
                reason: format!("no synthesis yet (phase {})", record.current_phase),
            });
        }
        let replaced = record.upsert_review(review);
        if record.current_phase == DebatePhase::Synthesis && !record.requested_reviewers.is_empty()
        {
            record.transition(DebatePhase::GovernanceReview, "awaiting governance reviews")?;
        }
        let record = record.clone();
        state.counters.reviews += 1;
        drop(state);

        info!(debate_id, %reviewer, approved, score, replaced, "Governance review added");
        self.events.publish(DebateEvent::ReviewAdded {
            debate_id: debate_id.to_string(),
            reviewer,
            approved,
            score,
            timestamp: Utc::now(),
        });
        self.persist(&record, &format!("{reviewer} review")).await;
        self.write_transcript(&record).await;
        Ok(record)
    }

    /// Finalize a debate and admit queued work into the freed slot.
    pub async fn complete_debate(
        &self,
        debate_id: &str,
        decision: FinalDecision,
    ) -> DebateResult<Completion> {
        let confidence = decision.confidence;

        let mut state = self.state.lock().await;
        state.active_mut(debate_id)?.complete(decision)?;
        let Some(record) = state.active.remove(debate_id) else {
            return Err(DebateError::NotFound(debate_id.to_string()));
        };
        state.push_history(record.clone(), self.config.history_limit);
        state.counters.completed += 1;
        let admitted = state.drain_queue(self.config.max_concurrent);
        drop(state);

        info!(
            debate_id,
            team = %record.team,
            confidence,
            duration_secs = record.duration_secs().unwrap_or_default(),
            admitted = admitted.len(),
            "Debate complete"
        );
        self.events.publish(DebateEvent::Completed {
            debate_id: debate_id.to_string(),
            confidence,
            timestamp: Utc::now(),
        });
        self.persist(&record, "completed").await;
        self.write_transcript(&record).await;
        self.announce_admitted(&admitted).await;

        Ok(Completion { record, admitted })
    }

    /// Cancel an active debate and admit queued work into the freed slot.
    pub async fn cancel_debate(&self, debate_id: &str, reason: &str) -> DebateResult<Completion> {
        let mut state = self.state.lock().await;
        state.active_mut(debate_id)?.cancel(reason)?;
        let Some(record) = state.active.remove(debate_id) else {
            return Err(DebateError::NotFound(debate_id.to_string()));
        };
        state.push_history(record.clone(), self.config.history_limit);
        state.counters.cancelled += 1;
        let admitted = state.drain_queue(self.config.max_concurrent);
        drop(state);

        info!(debate_id, reason, admitted = admitted.len(), "Debate cancelled");
        self.events.publish(DebateEvent::Cancelled {
            debate_id: debate_id.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
        self.persist(&record, "cancelled").await;
        self.write_transcript(&record).await;
        self.announce_admitted(&admitted).await;

        Ok(Completion { record, admitted })
    }

    /// Drop a queued request before it is admitted.
    pub async fn cancel_queued(&self, ticket: QueueTicket, reason: &str) -> DebateResult<()> {
        let mut state = self.state.lock().await;
        let item = state
            .queue
            .remove(ticket)
            .ok_or(DebateError::TicketNotFound(ticket))?;
        state.tickets.remove(&ticket);

        // A restored record must not come back on the next restart.
        let cancelled = match item {
            QueuedDebate::Restored(mut record) => {
                record.cancel(reason)?;
                state.counters.cancelled += 1;
                state.push_history(record.clone(), self.config.history_limit);
                Some(record)
            }
            QueuedDebate::Fresh(_) => None,
        };
        drop(state);

        info!(ticket, reason, "Queued debate cancelled");
        if let Some(record) = cancelled {
            self.events.publish(DebateEvent::Cancelled {
                debate_id: record.id.clone(),
                reason: reason.to_string(),
                timestamp: Utc::now(),
            });
            self.persist(&record, "cancelled").await;
        }
        Ok(())
    }

    /// Reload unfinished debates from the store after a restart.
    ///
    /// Valid non-terminal snapshots fill free slots (highest priority, then
    /// oldest first); the rest are queued with their phase and rounds intact.
    /// Corrupt snapshots are skipped. Recent terminal snapshots repopulate
    /// history.
    pub async fn restore_from_database(&self) -> PersistenceResult<RestoreReport> {
        let mut snapshots = self
            .store
            .query_active_or_recent(&DebateQuery::active())
            .await?;
        let recent = self
            .store
            .query_active_or_recent(&DebateQuery::recent(self.config.history_limit))
            .await?;

        snapshots.sort_by(|a, b| {
            b.record
                .priority
                .cmp(&a.record.priority)
                .then_with(|| a.record.started_at.cmp(&b.record.started_at))
        });

        let mut report = RestoreReport::default();
        let mut state = self.state.lock().await;

        // Oldest first so the newest ends up at the back of history.
        for snapshot in recent.into_iter().rev() {
            if !snapshot.phase().is_terminal()
                || state.find_history(snapshot.debate_id()).is_some()
            {
                continue;
            }
            state.note_version(&snapshot.record);
            state.push_history(snapshot.record, self.config.history_limit);
            report.history_loaded += 1;
        }

        for snapshot in snapshots {
            let debate_id = snapshot.debate_id().to_string();
            if state.active.contains_key(&debate_id) || state.find_history(&debate_id).is_some() {
                report.skipped.push(SkippedSnapshot {
                    debate_id,
                    reason: "already loaded".to_string(),
                });
                continue;
            }
            match validate_snapshot(&snapshot) {
                IntegrityStatus::Corrupted { errors } => {
                    warn!(debate_id = %debate_id, errors = ?errors, "Skipping corrupted debate snapshot");
                    report.skipped.push(SkippedSnapshot {
                        debate_id,
                        reason: errors.join("; "),
                    });
                    continue;
                }
                IntegrityStatus::Recoverable { warnings } => {
                    warn!(debate_id = %debate_id, warnings = ?warnings, "Restoring debate snapshot with warnings");
                }
                IntegrityStatus::Valid => {}
            }
            if snapshot.phase().is_terminal() {
                continue;
            }

            let record = snapshot.record;
            state.note_version(&record);
            state.counters.restored += 1;
            if state.active.len() < self.config.max_concurrent {
                state.active.insert(record.id.clone(), record.clone());
                state.counters.admitted += 1;
                report.admitted.push(AdmittedDebate {
                    record,
                    ticket: None,
                    immediate: true,
                    restored: true,
                });
            } else {
                let ticket = state.issue_ticket();
                state.queue.push(ticket, QueuedDebate::Restored(record));
                state.counters.queued += 1;
                report.queued.push(ticket);
            }
        }
        drop(state);

        info!(
            admitted = report.admitted.len(),
            queued = report.queued.len(),
            skipped = report.skipped.len(),
            history = report.history_loaded,
            "Debates restored"
        );
        self.events.publish(DebateEvent::Restored {
            admitted: report.admitted.len(),
            queued: report.queued.len(),
            skipped: report.skipped.len(),
            timestamp: Utc::now(),
        });
        Ok(report)
    }

    pub async fn queue_status(&self) -> QueueStatus {
        let state = self.state.lock().await;
        QueueStatus {
            active: state.active.len(),
            capacity: self.config.max_concurrent,
            queued: state.queue.len(),
            entries: state.queue.snapshot(),
        }
    }

    pub async fn statistics(&self) -> Statistics {
        let state = self.state.lock().await;
        let completed: Vec<&DebateRecord> = state
            .history
            .iter()
            .filter(|r| r.current_phase == DebatePhase::Complete)
            .collect();

        let confidences: Vec<f64> = completed
            .iter()
            .filter_map(|r| r.final_decision.as_ref())
            .map(|d| f64::from(d.confidence))
            .collect();
        let durations: Vec<f64> = completed.iter().filter_map(|r| r.duration_secs()).collect();

        let mut completed_by_domain = BTreeMap::new();
        for record in &completed {
            *completed_by_domain.entry(record.domain.clone()).or_insert(0) += 1;
        }

        Statistics {
            active: state.active.len(),
            queued: state.queue.len(),
            capacity: self.config.max_concurrent,
            history: state.history.len(),
            admitted: state.counters.admitted,
            queued_total: state.counters.queued,
            completed: state.counters.completed,
            cancelled: state.counters.cancelled,
            restored: state.counters.restored,
            rounds_recorded: state.counters.rounds,
            reviews_recorded: state.counters.reviews,
            average_confidence: mean(&confidences),
            average_duration_secs: mean(&durations),
            completed_by_domain,
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            transcript_failures: self.transcript_failures.load(Ordering::Relaxed),
        }
    }

    /// An active debate by id.
    pub async fn active_debate(&self, debate_id: &str) -> Option<DebateRecord> {
        self.state.lock().await.active.get(debate_id).cloned()
    }

    /// All active debates, oldest first.
    pub async fn active_debates(&self) -> Vec<DebateRecord> {
        let state = self.state.lock().await;
        let mut records: Vec<DebateRecord> = state.active.values().cloned().collect();
        records.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        records
    }

    /// A debate by id, active or in history.
    pub async fn debate(&self, debate_id: &str) -> Option<DebateRecord> {
        let state = self.state.lock().await;
        state
            .active
            .get(debate_id)
            .or_else(|| state.find_history(debate_id))
            .cloned()
    }

    /// Finished debates matching the filter, most recent first.
    pub async fn history(&self, filter: &HistoryFilter) -> Vec<DebateRecord> {
        let state = self.state.lock().await;
        state
            .history
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn persistence_failures(&self) -> u64 {
        self.persistence_failures.load(Ordering::Relaxed)
    }

    async fn announce_admitted(&self, admitted: &[AdmittedDebate]) {
        for entry in admitted {
            info!(
                debate_id = %entry.record.id,
                ticket = ?entry.ticket,
                restored = entry.restored,
                "Queued debate admitted"
            );
            self.events.publish(DebateEvent::Admitted {
                debate_id: entry.record.id.clone(),
                team: entry.record.team.clone(),
                ticket: entry.ticket,
                timestamp: Utc::now(),
            });
            self.persist(&entry.record, "admitted from queue").await;
        }
    }

    async fn persist(&self, record: &DebateRecord, reason: &str) {
        let snapshot = DebateSnapshot::new(record, reason);
        if let Err(e) = self.store.upsert_debate(&snapshot).await {
            self.persistence_failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                debate_id = %record.id,
                revision = record.revision,
                reason,
                error = %e,
                "Failed to persist debate snapshot"
            );
        }
    }

    async fn write_transcript(&self, record: &DebateRecord) {
        if let Err(e) = self.transcripts.write(record).await {
            self.transcript_failures.fetch_add(1, Ordering::Relaxed);
            warn!(debate_id = %record.id, error = %e, "Failed to write debate transcript");
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::persistence::{DebateStore, MemoryDebateStore, PersistenceError};
    use crate::debate::round::{DebateContent, RoundDirective};
    use crate::debate::state::{PersonaRole, Priority};
    use crate::debate::transcript::NullTranscriptSink;
    use async_trait::async_trait;

    fn manager_with(cap: usize, store: SharedDebateStore) -> DebateManager {
        DebateManager::new(
            ManagerConfig {
                max_concurrent: cap,
                history_limit: 3,
            },
            store,
            Arc::new(NullTranscriptSink),
            EventFeed::default(),
        )
    }

    fn manager(cap: usize) -> DebateManager {
        manager_with(cap, MemoryDebateStore::new().shared())
    }

    fn request(team: &str, topic: &str) -> DebateRequest {
        DebateRequest::new(team, "bom", topic, serde_json::json!({"k": 1}))
    }

    fn round_for(record: &DebateRecord, role: PersonaRole, confidence: u8) -> DebateRound {
        DebateRound::new(
            &record.id,
            role,
            &format!("{}/{role}", record.team),
            DebateContent {
                position: format!("{role} view"),
                reasoning: "r".to_string(),
                evidence: vec![serde_json::json!("e")],
                confidence,
                suggested_actions: vec!["Audit SKU-7 scrap rate weekly".to_string()],
            },
            RoundDirective::for_role(role, ""),
            record.round_ids(),
        )
    }

    async fn run_rounds(manager: &DebateManager, debate_id: &str) -> DebateRecord {
        let mut record = manager.active_debate(debate_id).await.unwrap();
        for role in PersonaRole::all() {
            let round = round_for(&record, role, 60);
            record = manager.record_round(debate_id, round).await.unwrap();
        }
        record
    }

    fn started(admission: &Admission) -> String {
        admission.debate_id().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_admission_below_and_at_cap() {
        let manager = manager(2);
        assert!(!manager.initiate_debate(request("a", "t1")).await.is_queued());
        assert!(!manager.initiate_debate(request("b", "t2")).await.is_queued());
        let third = manager.initiate_debate(request("c", "t3")).await;
        assert_eq!(
            third,
            Admission::Queued {
                ticket: 1,
                position: 1
            }
        );
        let status = manager.queue_status().await;
        assert_eq!(status.active, 2);
        assert_eq!(status.queued, 1);
    }

    #[tokio::test]
    async fn test_version_increments_per_team_topic() {
        let manager = manager(5);
        let first = started(&manager.initiate_debate(request("a", "topic")).await);
        let second = started(&manager.initiate_debate(request("a", "topic")).await);
        let other = started(&manager.initiate_debate(request("b", "topic")).await);

        assert_eq!(manager.debate(&first).await.unwrap().version, 1);
        assert_eq!(manager.debate(&second).await.unwrap().version, 2);
        assert_eq!(manager.debate(&other).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_unknown_debate_not_found() {
        let manager = manager(1);
        let record = DebateRecord::new("x", "bom", "t", serde_json::Value::Null);
        let round = round_for(&record, PersonaRole::Optimist, 50);
        let err = manager.record_round(&record.id, round).await.unwrap_err();
        assert_eq!(err, DebateError::NotFound(record.id.clone()));
        assert!(matches!(
            manager.complete_debate("nope", FinalDecision::default()).await,
            Err(DebateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_drains_highest_priority() {
        let manager = manager(1);
        let first = started(&manager.initiate_debate(request("a", "t1")).await);
        manager.initiate_debate(request("b", "low")).await;
        let Admission::Queued { ticket: urgent, .. } = manager
            .initiate_debate(request("c", "urgent").with_priority(Priority::Critical))
            .await
        else {
            panic!("expected queued");
        };

        let record = run_rounds(&manager, &first).await;
        let decision = FinalDecision::from_record(&record).unwrap();
        let completion = manager.complete_debate(&first, decision).await.unwrap();

        assert_eq!(completion.admitted.len(), 1);
        assert_eq!(completion.admitted[0].record.topic, "urgent");
        assert_eq!(
            manager.resolve_ticket(urgent).await.as_deref(),
            Some(completion.admitted[0].record.id.as_str())
        );
        assert_eq!(manager.queue_status().await.queued, 1);
    }

    #[tokio::test]
    async fn test_complete_twice_is_rejected() {
        let manager = manager(1);
        let id = started(&manager.initiate_debate(request("a", "t")).await);
        let record = run_rounds(&manager, &id).await;
        let decision = FinalDecision::from_record(&record).unwrap();
        manager.complete_debate(&id, decision.clone()).await.unwrap();

        let err = manager.complete_debate(&id, decision).await.unwrap_err();
        assert_eq!(err, DebateError::AlreadyComplete(id.clone()));
        let stored = manager.debate(&id).await.unwrap();
        assert!(stored.final_decision.is_some());
        assert_eq!(manager.statistics().await.completed, 1);
    }

    #[tokio::test]
    async fn test_round_after_cancel_is_not_active() {
        let manager = manager(1);
        let id = started(&manager.initiate_debate(request("a", "t")).await);
        let record = manager.active_debate(&id).await.unwrap();
        manager.cancel_debate(&id, "operator").await.unwrap();

        let round = round_for(&record, PersonaRole::Optimist, 50);
        let err = manager.record_round(&id, round).await.unwrap_err();
        assert!(matches!(
            err,
            DebateError::NotActive {
                phase: DebatePhase::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_review_moves_to_governance_phase() {
        let manager = manager(1);
        let id = started(&manager.initiate_debate(request("a", "t")).await);
        run_rounds(&manager, &id).await;

        let early = GovernanceReview::new(&id, ReviewerRole::QualitySpecialist, "q");
        manager
            .request_governance(&id, &ReviewerRole::all())
            .await
            .unwrap();
        let record = manager.add_governance_review(&id, early).await.unwrap();
        assert_eq!(record.current_phase, DebatePhase::GovernanceReview);
        assert_eq!(record.missing_reviewers(), vec![ReviewerRole::ComplianceAuditor]);

        let mut again = GovernanceReview::new(&id, ReviewerRole::QualitySpecialist, "q");
        again.score = 91;
        let record = manager.add_governance_review(&id, again).await.unwrap();
        assert_eq!(record.governance_reviews.len(), 1);
        assert_eq!(record.governance_reviews[0].score, 91);
    }

    #[tokio::test]
    async fn test_review_before_synthesis_rejected() {
        let manager = manager(1);
        let id = started(&manager.initiate_debate(request("a", "t")).await);
        let review = GovernanceReview::new(&id, ReviewerRole::ComplianceAuditor, "c");
        assert!(matches!(
            manager.add_governance_review(&id, review).await,
            Err(DebateError::GovernanceNotApplicable { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_queued_ticket() {
        let manager = manager(1);
        manager.initiate_debate(request("a", "t1")).await;
        let Admission::Queued { ticket, .. } = manager.initiate_debate(request("b", "t2")).await
        else {
            panic!("expected queued");
        };
        manager.cancel_queued(ticket, "no longer needed").await.unwrap();
        assert_eq!(manager.queue_status().await.queued, 0);
        assert_eq!(
            manager.cancel_queued(ticket, "again").await,
            Err(DebateError::TicketNotFound(ticket))
        );
    }

    #[tokio::test]
    async fn test_history_bounded_and_filtered() {
        let manager = manager(10);
        for i in 0..5 {
            let id = started(&manager.initiate_debate(request("a", &format!("t{i}"))).await);
            manager.cancel_debate(&id, "skip").await.unwrap();
        }
        let all = manager.history(&HistoryFilter::default()).await;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].topic, "t4");

        let limited = manager
            .history(&HistoryFilter {
                team: Some("a".to_string()),
                limit: Some(1),
                ..Default::default()
            })
            .await;
        assert_eq!(limited.len(), 1);
        let other = manager
            .history(&HistoryFilter {
                domain: Some("inventory".to_string()),
                ..Default::default()
            })
            .await;
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_admitted_tickets_forgotten_after_history_eviction() {
        let manager = manager(1);
        let mut current = started(&manager.initiate_debate(request("a", "t0")).await);
        let mut tickets = Vec::new();
        for i in 1..=5 {
            let Admission::Queued { ticket, .. } =
                manager.initiate_debate(request("a", &format!("t{i}"))).await
            else {
                panic!("expected queued");
            };
            tickets.push(ticket);
        }
        for ticket in &tickets {
            manager.cancel_debate(&current, "next").await.unwrap();
            current = manager.resolve_ticket(*ticket).await.unwrap();
        }

        // t0..t4 cancelled, history keeps t2..t4, t5 is active.
        assert_eq!(manager.resolve_ticket(tickets[0]).await, None);
        assert!(manager.resolve_ticket(tickets[1]).await.is_some());
        assert_eq!(manager.resolve_ticket(tickets[4]).await, Some(current));
        assert_eq!(manager.state.lock().await.tickets.len(), 4);
    }

    #[tokio::test]
    async fn test_restore_admits_cap_and_queues_rest() {
        let store = Arc::new(MemoryDebateStore::new());
        let mut ids = Vec::new();
        for i in 0..4 {
            let mut record = DebateRecord::new("a", "bom", &format!("t{i}"), serde_json::json!({}));
            if i % 2 == 0 {
                let round = round_for(&record, PersonaRole::Optimist, 55);
                record.apply_round(round).unwrap();
            }
            ids.push((record.id.clone(), record.current_phase));
            store
                .upsert_debate(&DebateSnapshot::new(&record, "seed"))
                .await
                .unwrap();
        }

        let manager = manager_with(2, store.clone());
        let report = manager.restore_from_database().await.unwrap();
        assert_eq!(report.admitted.len(), 2);
        assert_eq!(report.queued.len(), 2);
        assert!(report.skipped.is_empty());

        for entry in &report.admitted {
            let (_, phase) = ids.iter().find(|(id, _)| *id == entry.record.id).unwrap();
            assert_eq!(entry.record.current_phase, *phase);
        }
        let status = manager.queue_status().await;
        assert_eq!(status.active, 2);
        assert!(status.entries.iter().all(|e| e.resume_phase.is_some()));
    }

    #[tokio::test]
    async fn test_restore_skips_corrupted() {
        let store = Arc::new(MemoryDebateStore::new());
        let mut broken = DebateRecord::new("a", "bom", "t", serde_json::json!({}));
        broken.current_phase = DebatePhase::Synthesis;
        store
            .upsert_debate(&DebateSnapshot::new(&broken, "seed"))
            .await
            .unwrap();

        let manager = manager_with(2, store);
        let report = manager.restore_from_database().await.unwrap();
        assert!(report.admitted.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].debate_id, broken.id);
    }

    struct FailingStore;

    #[async_trait]
    impl DebateStore for FailingStore {
        async fn upsert_debate(&self, _snapshot: &DebateSnapshot) -> PersistenceResult<()> {
            Err(PersistenceError::Backend("disk full".to_string()))
        }

        async fn query_active_or_recent(
            &self,
            _query: &DebateQuery,
        ) -> PersistenceResult<Vec<DebateSnapshot>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_is_not_fatal() {
        let manager = manager_with(1, Arc::new(FailingStore));
        let id = started(&manager.initiate_debate(request("a", "t")).await);
        let record = run_rounds(&manager, &id).await;
        assert_eq!(record.current_phase, DebatePhase::Synthesis);
        assert!(manager.persistence_failures() >= 4);
        assert_eq!(
            manager.statistics().await.persistence_failures,
            manager.persistence_failures()
        );
    }

    #[tokio::test]
    async fn test_events_published() {
        let manager = manager(1);
        let mut rx = manager.subscribe();
        let id = started(&manager.initiate_debate(request("a", "t")).await);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.debate_id(), Some(id.as_str()));
        assert_eq!(event.event_type(), "admitted");
    }
}
