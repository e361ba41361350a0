//! Chief orchestrator.
//!
//! Starts debates on the owning team's optimist, receives the mediator's
//! synthesis, decides whether governance is required, fans review requests
//! out to every registered reviewer, and finalizes once every requested role
//! has reported. Slots freed by completion or cancellation are handed to
//! queued debates right away.
//!
//! The orchestrator also runs the periodic coaching sweep and keeps a small
//! buffer of recent outcomes for cross-domain summaries.

pub mod insights;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{BusError, Envelope, MessageHandler, Payload, SharedMessageBus};
use crate::coaching::feedback_from_stats;
use crate::config::{EngineConfig, TeamSpec};
use crate::debate::{
    Admission, AdmittedDebate, DebateBrief, DebateError, DebateId, DebatePhase, DebateRecord,
    DebateRequest, FinalDecision, GovernanceReview, Priority, QueueTicket, ReviewerRole,
    SharedDebateManager,
};
use crate::governance::{conservative_review, reviewer_actor_id};
use crate::persona::{PersonaActor, PersonaSnapshot};

pub use insights::{CrossDomainSummary, DomainInsight, DomainSummary, InsightBuffer, RecurringAction};

/// Bus id of the chief orchestrator.
pub const ORCHESTRATOR_ID: &str = "chief-orchestrator";

/// Errors from orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("unknown team: {0}")]
    UnknownTeam(String),

    #[error("debate {debate_id} is incomplete: {reason}")]
    IncompleteRecord { debate_id: DebateId, reason: String },

    #[error("no governance reviewers are registered")]
    NoReviewers,

    #[error(transparent)]
    Debate(#[from] DebateError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl OrchestratorError {
    /// The debate finished, was cancelled, or never existed.
    pub fn is_inactive(&self) -> bool {
        matches!(
            self,
            Self::Debate(
                DebateError::NotActive { .. }
                    | DebateError::AlreadyComplete(_)
                    | DebateError::NotFound(_)
            )
        )
    }
}

/// Result type for orchestration
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Whether a synthesis needs governance before it can be finalized.
pub fn governance_required(priority: Priority, confidence: u8, threshold: u8) -> bool {
    priority.requires_governance() || confidence < threshold
}

/// Orchestrator-side view of an in-flight debate. Always rebuildable from the
/// record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDebate {
    pub brief: DebateBrief,
    pub phase: DebatePhase,
    pub rounds_received: usize,
    pub requested_reviewers: Vec<ReviewerRole>,
    pub reviews_received: Vec<ReviewerRole>,
    pub tracked_since: DateTime<Utc>,
}

impl PendingDebate {
    fn from_record(record: &DebateRecord, tracked_since: DateTime<Utc>) -> Self {
        Self {
            brief: record.brief(),
            phase: record.current_phase,
            rounds_received: record.rounds().len(),
            requested_reviewers: record.requested_reviewers.clone(),
            reviews_received: record.governance_reviews.iter().map(|r| r.reviewer).collect(),
            tracked_since,
        }
    }
}

/// Admission outcome for one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamAdmission {
    pub team: String,
    pub admission: Admission,
}

/// Per-team persona status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamStatus {
    pub team: String,
    pub domain: String,
    pub active_debates: usize,
    pub personas: Vec<PersonaSnapshot>,
}

/// What [`ChiefOrchestrator::reconcile`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Active debates that were not tracked.
    pub adopted: usize,
    /// Tracked debates that are no longer active.
    pub dropped: usize,
    /// Debates whose reviews were all in but were never finalized.
    pub finalized: usize,
}

/// Coordinates teams, governance and coaching.
pub struct ChiefOrchestrator {
    config: EngineConfig,
    manager: SharedDebateManager,
    bus: SharedMessageBus,
    personas: Vec<Arc<PersonaActor>>,
    reviewers: Vec<ReviewerRole>,
    pending: Mutex<HashMap<DebateId, PendingDebate>>,
    insights: Mutex<InsightBuffer>,
}

impl ChiefOrchestrator {
    pub fn new(
        config: EngineConfig,
        manager: SharedDebateManager,
        bus: SharedMessageBus,
        personas: Vec<Arc<PersonaActor>>,
        reviewers: Vec<ReviewerRole>,
    ) -> Self {
        let insights = InsightBuffer::new(config.insight_buffer);
        Self {
            config,
            manager,
            bus,
            personas,
            reviewers,
            pending: Mutex::new(HashMap::new()),
            insights: Mutex::new(insights),
        }
    }

    pub fn id(&self) -> &'static str {
        ORCHESTRATOR_ID
    }

    pub fn reviewers(&self) -> &[ReviewerRole] {
        &self.reviewers
    }

    fn team_spec(&self, team: &str) -> OrchestratorResult<&TeamSpec> {
        self.config
            .team(team)
            .ok_or_else(|| OrchestratorError::UnknownTeam(team.to_string()))
    }

    /// Start a debate for `team`, or queue it when at capacity.
    pub async fn orchestrate_debate(
        &self,
        team: &str,
        topic: &str,
        context: serde_json::Value,
        priority: Priority,
    ) -> OrchestratorResult<Admission> {
        let spec = self.team_spec(team)?;
        let request =
            DebateRequest::new(&spec.team, &spec.domain, topic, context).with_priority(priority);
        self.submit(request).await
    }

    /// One debate on `topic` per roster team.
    pub async fn orchestrate_all_teams(
        &self,
        topic: &str,
        context: serde_json::Value,
        priority: Priority,
    ) -> OrchestratorResult<Vec<TeamAdmission>> {
        let teams: Vec<String> = self.config.teams.iter().map(|t| t.team.clone()).collect();
        let mut admissions = Vec::with_capacity(teams.len());
        for team in teams {
            let admission = self
                .orchestrate_debate(&team, topic, context.clone(), priority)
                .await?;
            admissions.push(TeamAdmission { team, admission });
        }
        Ok(admissions)
    }

    /// Admit a prepared request. A deferred request is admitted but not
    /// started until [`kick_off`](Self::kick_off).
    pub async fn submit(&self, request: DebateRequest) -> OrchestratorResult<Admission> {
        self.team_spec(&request.team)?;
        let immediate = request.immediate;
        let admission = self.manager.initiate_debate(request).await;
        if let Admission::Started { debate_id } = &admission {
            if immediate {
                self.kick_off(debate_id).await?;
            } else {
                let record = self.active_record(debate_id).await?;
                self.track(&record).await;
                info!(debate_id = %debate_id, "Debate admitted, start deferred");
            }
        }
        Ok(admission)
    }

    /// Send the message that moves an active debate forward from its
    /// current phase.
    pub async fn kick_off(&self, debate_id: &str) -> OrchestratorResult<()> {
        let record = self.active_record(debate_id).await?;
        self.resume_record(&record).await
    }

    /// Resume every active debate, typically after a restore. Returns the
    /// number resumed.
    pub async fn resume_active(&self) -> usize {
        let mut resumed = 0;
        for record in self.manager.active_debates().await {
            match self.resume_record(&record).await {
                Ok(()) => resumed += 1,
                Err(e) => {
                    warn!(debate_id = %record.id, phase = %record.current_phase, error = %e, "Failed to resume debate")
                }
            }
        }
        resumed
    }

    fn resume_record<'a>(&'a self, record: &'a DebateRecord) -> BoxFuture<'a, OrchestratorResult<()>> {
        Box::pin(async move {
            let team = self.team_spec(&record.team)?.clone();
            self.track(record).await;
            let brief = record.brief();
            let incomplete = |reason: &str| OrchestratorError::IncompleteRecord {
                debate_id: record.id.clone(),
                reason: reason.to_string(),
            };

            match record.current_phase {
                DebatePhase::Pending => {
                    self.send(&team.optimist, record, Payload::DebateStart { brief })?;
                }
                DebatePhase::Thesis => {
                    let thesis = record.thesis.clone().ok_or_else(|| incomplete("no thesis"))?;
                    self.send(&team.pessimist, record, Payload::DebateThesis { brief, thesis })?;
                }
                DebatePhase::Antithesis => {
                    let (Some(thesis), Some(antithesis)) =
                        (record.thesis.clone(), record.antithesis.clone())
                    else {
                        return Err(incomplete("missing thesis or antithesis"));
                    };
                    self.send(
                        &team.mediator,
                        record,
                        Payload::DebateAntithesis {
                            brief,
                            thesis,
                            antithesis,
                        },
                    )?;
                }
                DebatePhase::Synthesis if record.requested_reviewers.is_empty() => {
                    self.on_synthesis(&record.id).await?
                }
                DebatePhase::Synthesis | DebatePhase::GovernanceReview => {
                    self.advance_governance(record).await?;
                }
                DebatePhase::Complete | DebatePhase::Cancelled => {}
            }
            debug!(debate_id = %record.id, phase = %record.current_phase, "Debate resumed");
            Ok(())
        })
    }

    /// Start newly admitted debates.
    async fn launch(&self, admitted: &[AdmittedDebate]) {
        for entry in admitted {
            if !entry.immediate {
                self.track(&entry.record).await;
                info!(debate_id = %entry.record.id, "Admitted from queue, start deferred");
                continue;
            }
            if let Err(e) = self.resume_record(&entry.record).await {
                warn!(debate_id = %entry.record.id, error = %e, "Failed to start admitted debate");
            }
        }
    }

    fn send(&self, target: &str, record: &DebateRecord, payload: Payload) -> OrchestratorResult<()> {
        self.bus.send(
            ORCHESTRATOR_ID,
            target,
            payload,
            record.priority,
            Some(record.id.clone()),
        )?;
        Ok(())
    }

    async fn on_synthesis(&self, debate_id: &str) -> OrchestratorResult<()> {
        let record = self.active_record(debate_id).await?;
        let Some(synthesis) = record.synthesis.as_ref() else {
            return Err(OrchestratorError::IncompleteRecord {
                debate_id: debate_id.to_string(),
                reason: "no synthesis".to_string(),
            });
        };
        self.track(&record).await;
        if record.current_phase != DebatePhase::Synthesis || !record.requested_reviewers.is_empty()
        {
            debug!(debate_id, phase = %record.current_phase, "Synthesis already handled");
            return Ok(());
        }

        let confidence = synthesis.content.confidence;
        let threshold = self.config.governance.confidence_threshold;
        if !governance_required(record.priority, confidence, threshold) {
            info!(debate_id, confidence, priority = %record.priority, "No governance required");
            self.finalize(debate_id).await?;
            return Ok(());
        }
        if self.reviewers.is_empty() {
            warn!(debate_id, confidence, "Governance required but no reviewers registered, finalizing");
            self.finalize(debate_id).await?;
            return Ok(());
        }

        info!(debate_id, confidence, priority = %record.priority, reviewers = ?self.reviewers, "Governance required");
        let record = self.manager.request_governance(debate_id, &self.reviewers).await?;
        self.track(&record).await;
        self.fan_out(&record, &self.reviewers).await
    }

    /// Send review requests. A reviewer that cannot be reached is answered
    /// with a conservative review so the debate cannot stall.
    async fn fan_out(&self, record: &DebateRecord, roles: &[ReviewerRole]) -> OrchestratorResult<()> {
        for role in roles {
            let payload = Payload::GovernanceReviewRequest {
                debate: Box::new(record.clone()),
            };
            if let Err(e) = self.send(&reviewer_actor_id(*role), record, payload) {
                warn!(debate_id = %record.id, reviewer = %role, error = %e, "Reviewer unreachable, using conservative review");
                let review = conservative_review(record, *role, ORCHESTRATOR_ID, "reviewer unreachable");
                self.on_review(&record.id, review).await?;
            }
        }
        Ok(())
    }

    async fn on_review(&self, debate_id: &str, review: GovernanceReview) -> OrchestratorResult<()> {
        let record = self.manager.add_governance_review(debate_id, review).await?;
        self.track(&record).await;
        if record.requested_reviewers.is_empty() {
            debug!(debate_id, "Unrequested review stored");
            return Ok(());
        }
        self.finalize_if_reviewed(&record).await?;
        Ok(())
    }

    /// Finalize when every requested reviewer has reported. Returns whether
    /// the debate was finalized.
    async fn finalize_if_reviewed(&self, record: &DebateRecord) -> OrchestratorResult<bool> {
        if !record.reviews_complete() {
            debug!(debate_id = %record.id, missing = ?record.missing_reviewers(), "Awaiting reviews");
            return Ok(false);
        }
        info!(debate_id = %record.id, reviews = record.governance_reviews.len(), "All requested reviews in, finalizing");
        self.finalize(&record.id).await?;
        Ok(true)
    }

    /// Move a debate with requested reviewers forward: finalize it, or ask
    /// the reviewers that have not reported. Returns the roles asked.
    async fn advance_governance(&self, record: &DebateRecord) -> OrchestratorResult<Vec<ReviewerRole>> {
        if self.finalize_if_reviewed(record).await? {
            return Ok(Vec::new());
        }
        let missing = record.missing_reviewers();
        self.fan_out(record, &missing).await?;
        Ok(missing)
    }

    /// Complete a debate from its synthesis and reviews, then start whatever
    /// the freed slot admitted.
    pub async fn finalize(&self, debate_id: &str) -> OrchestratorResult<DebateRecord> {
        let record = self.active_record(debate_id).await?;
        let decision =
            FinalDecision::from_record(&record).ok_or_else(|| OrchestratorError::IncompleteRecord {
                debate_id: debate_id.to_string(),
                reason: "no synthesis".to_string(),
            })?;
        let completion = self.manager.complete_debate(debate_id, decision).await?;

        self.pending.lock().await.remove(debate_id);
        if let Some(insight) = DomainInsight::from_record(&completion.record) {
            self.insights.lock().await.push(insight);
        }
        self.launch(&completion.admitted).await;
        Ok(completion.record)
    }

    /// Cancel an active debate and start whatever the freed slot admitted.
    pub async fn cancel_debate(&self, debate_id: &str, reason: &str) -> OrchestratorResult<DebateRecord> {
        let completion = self.manager.cancel_debate(debate_id, reason).await?;
        self.pending.lock().await.remove(debate_id);
        self.launch(&completion.admitted).await;
        Ok(completion.record)
    }

    /// Withdraw a queued request.
    pub async fn cancel_queued(&self, ticket: QueueTicket, reason: &str) -> OrchestratorResult<()> {
        self.manager.cancel_queued(ticket, reason).await?;
        Ok(())
    }

    /// Request review from every registered reviewer for an active debate
    /// with a synthesis, whatever its confidence. Returns the roles asked.
    pub async fn escalate_governance(&self, debate_id: &str) -> OrchestratorResult<Vec<ReviewerRole>> {
        if self.reviewers.is_empty() {
            return Err(OrchestratorError::NoReviewers);
        }
        let record = self.manager.request_governance(debate_id, &self.reviewers).await?;
        self.track(&record).await;
        info!(debate_id, reviewers = ?record.missing_reviewers(), "Governance escalated");
        self.advance_governance(&record).await
    }

    /// Send coaching derived from each persona's counters. Returns the number
    /// of messages sent.
    pub async fn coach_personas(&self) -> usize {
        let mut sent = 0;
        for persona in &self.personas {
            let snapshot = persona.snapshot().await;
            for feedback in feedback_from_stats(&snapshot.stats, &self.config.coaching) {
                match self.bus.send(
                    ORCHESTRATOR_ID,
                    persona.id(),
                    Payload::Coaching { feedback },
                    Priority::Low,
                    None,
                ) {
                    Ok(_) => sent += 1,
                    Err(e) => warn!(actor = %persona.id(), error = %e, "Coaching not delivered"),
                }
            }
        }
        debug!(sent, "Coaching sweep complete");
        sent
    }

    /// Run [`coach_personas`](Self::coach_personas) every `period` until
    /// `token` is cancelled. Missed ticks are skipped.
    pub fn spawn_coaching_loop(
        self: &Arc<Self>,
        period: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        orchestrator.coach_personas().await;
                    }
                }
            }
            debug!("Coaching loop stopped");
        })
    }

    /// Persona status grouped by team.
    pub async fn team_status(&self) -> Vec<TeamStatus> {
        let active = self.manager.active_debates().await;
        let mut statuses = Vec::with_capacity(self.config.teams.len());
        for team in &self.config.teams {
            let mut personas = Vec::new();
            for persona in self.personas.iter().filter(|p| p.team().team == team.team) {
                personas.push(persona.snapshot().await);
            }
            statuses.push(TeamStatus {
                team: team.team.clone(),
                domain: team.domain.clone(),
                active_debates: active.iter().filter(|r| r.team == team.team).count(),
                personas,
            });
        }
        statuses
    }

    /// Bring tracking in line with the manager's active set and finalize
    /// debates whose reviews are all in.
    pub async fn reconcile(&self) -> ReconcileReport {
        let active = self.manager.active_debates().await;
        let mut report = ReconcileReport::default();
        {
            let mut pending = self.pending.lock().await;
            let before = pending.len();
            pending.retain(|id, _| active.iter().any(|r| &r.id == id));
            report.dropped = before - pending.len();
            for record in &active {
                if !pending.contains_key(&record.id) {
                    pending.insert(record.id.clone(), PendingDebate::from_record(record, Utc::now()));
                    report.adopted += 1;
                }
            }
        }

        for record in &active {
            let stalled = matches!(
                record.current_phase,
                DebatePhase::Synthesis | DebatePhase::GovernanceReview
            ) && !record.requested_reviewers.is_empty()
                && record.reviews_complete();
            if stalled {
                match self.finalize(&record.id).await {
                    Ok(_) => report.finalized += 1,
                    Err(e) => warn!(debate_id = %record.id, error = %e, "Reconcile could not finalize"),
                }
            }
        }
        info!(adopted = report.adopted, dropped = report.dropped, finalized = report.finalized, "Reconciled");
        report
    }

    /// Debates the orchestrator is tracking.
    pub async fn pending_debates(&self) -> Vec<PendingDebate> {
        let mut pending: Vec<PendingDebate> = self.pending.lock().await.values().cloned().collect();
        pending.sort_by(|a, b| a.tracked_since.cmp(&b.tracked_since));
        pending
    }

    pub async fn cross_domain_insights(&self) -> CrossDomainSummary {
        self.insights.lock().await.summarize()
    }

    /// Seed the insight buffer from completed history, oldest first.
    pub async fn load_insights(&self, records: &[DebateRecord]) {
        let mut insights = self.insights.lock().await;
        for record in records {
            if let Some(insight) = DomainInsight::from_record(record) {
                insights.push(insight);
            }
        }
    }

    async fn track(&self, record: &DebateRecord) {
        let mut pending = self.pending.lock().await;
        let since = pending
            .get(&record.id)
            .map_or_else(Utc::now, |p| p.tracked_since);
        pending.insert(record.id.clone(), PendingDebate::from_record(record, since));
    }

    async fn note_progress(&self, debate_id: &str, rounds: usize) {
        if let Some(entry) = self.pending.lock().await.get_mut(debate_id) {
            entry.rounds_received = entry.rounds_received.max(rounds);
        }
    }

    async fn active_record(&self, debate_id: &str) -> OrchestratorResult<DebateRecord> {
        if let Some(record) = self.manager.active_debate(debate_id).await {
            return Ok(record);
        }
        let err = match self.manager.debate(debate_id).await {
            Some(r) if r.current_phase == DebatePhase::Complete => {
                DebateError::AlreadyComplete(debate_id.to_string())
            }
            Some(r) => DebateError::NotActive {
                debate_id: debate_id.to_string(),
                phase: r.current_phase,
            },
            None => DebateError::NotFound(debate_id.to_string()),
        };
        Err(err.into())
    }
}

#[async_trait]
impl MessageHandler for ChiefOrchestrator {
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<()> {
        let outcome = match &envelope.payload {
            Payload::DebateThesis { brief, .. } | Payload::DebateAntithesis { brief, .. } => {
                self.note_progress(&brief.debate_id, envelope.payload.rounds().len())
                    .await;
                Ok(())
            }
            Payload::DebateSynthesis { brief, .. } => self.on_synthesis(&brief.debate_id).await,
            Payload::GovernanceReviewResult {
                debate_id, review, ..
            } => self.on_review(debate_id, review.clone()).await,
            _ => {
                warn!(kind = %envelope.kind(), source = %envelope.source, "Orchestrator ignoring message");
                Ok(())
            }
        };
        match outcome {
            Err(e) if e.is_inactive() => {
                info!(kind = %envelope.kind(), debate_id = ?envelope.payload.debate_id(), reason = %e, "Message for inactive debate dropped");
                Ok(())
            }
            other => other.map_err(Into::into),
        }
    }
}
