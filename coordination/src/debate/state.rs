//! Debate state machine: phases, transitions, and the debate record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::DebateError;
use super::round::{DebateRound, FinalDecision, GovernanceReview, ReviewerRole};

/// Unique identifier for a debate.
pub type DebateId = String;

/// Phase of a debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Admitted but no round recorded yet.
    Pending,
    /// Optimist's thesis recorded.
    Thesis,
    /// Pessimist's antithesis recorded.
    Antithesis,
    /// Mediator's synthesis recorded.
    Synthesis,
    /// Waiting on (or receiving) governance reviews.
    GovernanceReview,
    /// Final decision recorded.
    Complete,
    /// Cancelled before completion.
    Cancelled,
}

impl DebatePhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [DebatePhase] {
        match self {
            Self::Pending => &[Self::Thesis, Self::Cancelled],
            Self::Thesis => &[Self::Antithesis, Self::Cancelled],
            Self::Antithesis => &[Self::Synthesis, Self::Cancelled],
            Self::Synthesis => &[Self::GovernanceReview, Self::Complete, Self::Cancelled],
            Self::GovernanceReview => &[Self::Complete, Self::Cancelled],
            Self::Complete | Self::Cancelled => &[],
        }
    }

    /// Phase the next recorded round must carry, if any.
    pub fn next_round_phase(self) -> Option<DebatePhase> {
        match self {
            Self::Pending => Some(Self::Thesis),
            Self::Thesis => Some(Self::Antithesis),
            Self::Antithesis => Some(Self::Synthesis),
            _ => None,
        }
    }

    /// Whether a round-producing persona is expected next.
    pub fn awaits_round(self) -> bool {
        self.next_round_phase().is_some()
    }

    /// Number of rounds a well-formed record in this phase holds.
    pub fn expected_round_count(self) -> usize {
        match self {
            Self::Pending => 0,
            Self::Thesis => 1,
            Self::Antithesis => 2,
            Self::Synthesis | Self::GovernanceReview | Self::Complete => 3,
            Self::Cancelled => 0,
        }
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Thesis => write!(f, "thesis"),
            Self::Antithesis => write!(f, "antithesis"),
            Self::Synthesis => write!(f, "synthesis"),
            Self::GovernanceReview => write!(f, "governance_review"),
            Self::Complete => write!(f, "complete"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for DebatePhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "thesis" => Ok(Self::Thesis),
            "antithesis" => Ok(Self::Antithesis),
            "synthesis" => Ok(Self::Synthesis),
            "governance_review" => Ok(Self::GovernanceReview),
            "complete" => Ok(Self::Complete),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown debate phase: {other}")),
        }
    }
}

/// Role of a persona in a debate team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaRole {
    /// Argues the thesis.
    Optimist,
    /// Argues the antithesis.
    Pessimist,
    /// Produces the synthesis.
    Mediator,
}

impl PersonaRole {
    /// All roles in protocol order.
    pub fn all() -> [PersonaRole; 3] {
        [Self::Optimist, Self::Pessimist, Self::Mediator]
    }

    /// Phase this role's round produces.
    pub fn phase(self) -> DebatePhase {
        match self {
            Self::Optimist => DebatePhase::Thesis,
            Self::Pessimist => DebatePhase::Antithesis,
            Self::Mediator => DebatePhase::Synthesis,
        }
    }
}

impl std::fmt::Display for PersonaRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Optimist => write!(f, "optimist"),
            Self::Pessimist => write!(f, "pessimist"),
            Self::Mediator => write!(f, "mediator"),
        }
    }
}

/// Priority of a debate request. Ordered low → critical.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// High and critical debates always go through governance review.
    pub fn requires_governance(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "normal" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    /// Previous phase.
    pub from: DebatePhase,
    /// New phase.
    pub to: DebatePhase,
    /// When the transition occurred.
    pub timestamp: DateTime<Utc>,
    /// Reason for the transition.
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition {from} → {to}: {reason}")]
pub struct TransitionError {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub reason: String,
}

/// Everything a persona needs to argue one debate. Carried on every
/// persona-bound message so actors never reach back into manager state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateBrief {
    pub debate_id: DebateId,
    pub team: String,
    pub domain: String,
    pub topic: String,
    pub context: serde_json::Value,
    pub priority: Priority,
}

/// The aggregate root of one debate instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRecord {
    /// Unique debate identifier.
    pub id: DebateId,
    /// Free-text topic.
    pub topic: String,
    /// Domain tag (drives fallback content).
    pub domain: String,
    /// Owning team.
    pub team: String,
    /// 1 for the first debate of a (team, topic) pair, +1 per re-debate.
    pub version: u32,
    /// Opaque caller payload, passed through to every persona.
    pub context_data: serde_json::Value,
    /// Request priority.
    pub priority: Priority,
    /// Current phase.
    pub current_phase: DebatePhase,
    pub thesis: Option<DebateRound>,
    pub antithesis: Option<DebateRound>,
    pub synthesis: Option<DebateRound>,
    /// Set only at completion.
    pub final_decision: Option<FinalDecision>,
    /// At most one review per reviewer role.
    #[serde(default)]
    pub governance_reviews: Vec<GovernanceReview>,
    /// Reviewer roles the orchestrator asked for.
    #[serde(default)]
    pub requested_reviewers: Vec<ReviewerRole>,
    /// Why the debate was cancelled, if it was.
    #[serde(default)]
    pub cancel_reason: Option<String>,
    /// Transition history.
    #[serde(default)]
    pub transitions: Vec<PhaseTransition>,
    /// Bumped on every mutation; stale snapshot writes are discarded.
    #[serde(default)]
    pub revision: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DebateRecord {
    /// Create a new debate record in the pending phase.
    pub fn new(team: &str, domain: &str, topic: &str, context: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            domain: domain.to_string(),
            team: team.to_string(),
            version: 1,
            context_data: context,
            priority: Priority::default(),
            current_phase: DebatePhase::Pending,
            thesis: None,
            antithesis: None,
            synthesis: None,
            final_decision: None,
            governance_reviews: Vec::new(),
            requested_reviewers: Vec::new(),
            cancel_reason: None,
            transitions: Vec::new(),
            revision: 0,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Set the request priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the topic version.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Persona-facing view of this debate.
    pub fn brief(&self) -> DebateBrief {
        DebateBrief {
            debate_id: self.id.clone(),
            team: self.team.clone(),
            domain: self.domain.clone(),
            topic: self.topic.clone(),
            context: self.context_data.clone(),
            priority: self.priority,
        }
    }

    /// Whether the debate still occupies a concurrency slot.
    pub fn is_active(&self) -> bool {
        !self.current_phase.is_terminal()
    }

    /// Transition to a new phase with a reason.
    pub fn transition(&mut self, to: DebatePhase, reason: &str) -> Result<(), TransitionError> {
        if !self.current_phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.current_phase,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.current_phase.valid_transitions()
                ),
            });
        }

        self.transitions.push(PhaseTransition {
            from: self.current_phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.current_phase = to;
        self.touch();
        Ok(())
    }

    /// Recorded rounds in protocol order.
    pub fn rounds(&self) -> Vec<&DebateRound> {
        [&self.thesis, &self.antithesis, &self.synthesis]
            .into_iter()
            .flatten()
            .collect()
    }

    /// Ids of the recorded rounds, in protocol order.
    pub fn round_ids(&self) -> Vec<String> {
        self.rounds().iter().map(|r| r.id.clone()).collect()
    }

    /// Append the next round. Rejects rounds that skip or repeat a phase, that
    /// were authored by the wrong role, or that do not answer every prior round.
    pub fn apply_round(&mut self, round: DebateRound) -> Result<(), DebateError> {
        if self.current_phase.is_terminal() {
            return Err(DebateError::NotActive {
                debate_id: self.id.clone(),
                phase: self.current_phase,
            });
        }
        if round.debate_id != self.id {
            return Err(DebateError::InvalidRound {
                debate_id: self.id.clone(),
                reason: format!("round belongs to debate {}", round.debate_id),
            });
        }

        let expected = self.current_phase.next_round_phase();
        if expected != Some(round.phase) {
            return Err(DebateError::OutOfOrderRound {
                debate_id: self.id.clone(),
                expected: expected.map_or_else(|| "none".to_string(), |p| p.to_string()),
                actual: round.phase,
            });
        }
        if round.role.phase() != round.phase {
            return Err(DebateError::InvalidRound {
                debate_id: self.id.clone(),
                reason: format!("{} cannot author a {} round", round.role, round.phase),
            });
        }

        let missing: Vec<String> = self
            .round_ids()
            .into_iter()
            .filter(|id| !round.responds_to.contains(id))
            .collect();
        if !missing.is_empty() {
            return Err(DebateError::InvalidRound {
                debate_id: self.id.clone(),
                reason: format!("round does not respond to {}", missing.join(", ")),
            });
        }

        let reason = format!("{} recorded by {}", round.phase, round.author);
        self.transition(round.phase, &reason)?;
        match round.phase {
            DebatePhase::Thesis => self.thesis = Some(round),
            DebatePhase::Antithesis => self.antithesis = Some(round),
            _ => self.synthesis = Some(round),
        }
        Ok(())
    }

    /// Record that governance was requested from `roles`.
    pub fn request_reviewers(&mut self, roles: &[ReviewerRole]) {
        for role in roles {
            if !self.requested_reviewers.contains(role) {
                self.requested_reviewers.push(*role);
            }
        }
        self.touch();
    }

    /// Insert a review, replacing any earlier review from the same role.
    /// Returns true when a previous review was replaced.
    pub fn upsert_review(&mut self, review: GovernanceReview) -> bool {
        let replaced = match self
            .governance_reviews
            .iter_mut()
            .find(|r| r.reviewer == review.reviewer)
        {
            Some(existing) => {
                *existing = review;
                true
            }
            None => {
                self.governance_reviews.push(review);
                false
            }
        };
        self.touch();
        replaced
    }

    /// Requested reviewer roles that have not reported yet.
    pub fn missing_reviewers(&self) -> Vec<ReviewerRole> {
        self.requested_reviewers
            .iter()
            .filter(|role| !self.governance_reviews.iter().any(|r| r.reviewer == **role))
            .copied()
            .collect()
    }

    /// Whether every requested reviewer has reported.
    pub fn reviews_complete(&self) -> bool {
        self.missing_reviewers().is_empty()
    }

    /// Finalize with a decision. Valid only after synthesis.
    pub fn complete(&mut self, decision: FinalDecision) -> Result<(), DebateError> {
        match self.current_phase {
            DebatePhase::Complete => return Err(DebateError::AlreadyComplete(self.id.clone())),
            DebatePhase::Cancelled => {
                return Err(DebateError::NotActive {
                    debate_id: self.id.clone(),
                    phase: self.current_phase,
                })
            }
            _ => {}
        }
        self.transition(DebatePhase::Complete, "final decision recorded")?;
        self.final_decision = Some(decision);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Cancel from any non-terminal phase.
    pub fn cancel(&mut self, reason: &str) -> Result<(), DebateError> {
        match self.current_phase {
            DebatePhase::Complete => return Err(DebateError::AlreadyComplete(self.id.clone())),
            DebatePhase::Cancelled => {
                return Err(DebateError::NotActive {
                    debate_id: self.id.clone(),
                    phase: self.current_phase,
                })
            }
            _ => {}
        }
        self.transition(DebatePhase::Cancelled, reason)?;
        self.cancel_reason = Some(reason.to_string());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Seconds between start and completion, if completed.
    pub fn duration_secs(&self) -> Option<f64> {
        self.completed_at
            .map(|done| (done - self.started_at).num_milliseconds() as f64 / 1000.0)
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] {} v{} | {} rounds | {} reviews | team={}",
            self.current_phase,
            self.topic,
            self.version,
            self.rounds().len(),
            self.governance_reviews.len(),
            self.team
        )
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::round::{DebateContent, RoundDirective};

    fn record() -> DebateRecord {
        DebateRecord::new(
            "bom-waste-team",
            "bom",
            "BOM variance Q3",
            serde_json::json!({"variance": 0.12}),
        )
    }

    fn round(record: &DebateRecord, role: PersonaRole) -> DebateRound {
        let content = DebateContent {
            position: format!("{role} position"),
            reasoning: "because".to_string(),
            evidence: vec![serde_json::json!("data point")],
            confidence: 70,
            suggested_actions: Vec::new(),
        };
        DebateRound::new(
            &record.id,
            role,
            &format!("bom-waste-team/{role}"),
            content,
            RoundDirective::for_role(role, "ctx"),
            record.round_ids(),
        )
    }

    #[test]
    fn test_new_record() {
        let record = record();
        assert_eq!(record.current_phase, DebatePhase::Pending);
        assert_eq!(record.version, 1);
        assert!(record.is_active());
        assert!(record.rounds().is_empty());
    }

    #[test]
    fn test_rounds_in_order() {
        let mut record = record();
        for role in PersonaRole::all() {
            let r = round(&record, role);
            record.apply_round(r).unwrap();
            assert_eq!(record.current_phase, role.phase());
        }
        assert_eq!(record.rounds().len(), 3);
        let synthesis = record.synthesis.as_ref().unwrap();
        assert_eq!(synthesis.responds_to.len(), 2);
    }

    #[test]
    fn test_antithesis_before_thesis_rejected() {
        let mut record = record();
        let r = round(&record, PersonaRole::Pessimist);
        let err = record.apply_round(r).unwrap_err();
        assert!(matches!(
            err,
            DebateError::OutOfOrderRound {
                actual: DebatePhase::Antithesis,
                ..
            }
        ));
        assert_eq!(record.current_phase, DebatePhase::Pending);
    }

    #[test]
    fn test_round_must_respond_to_prior() {
        let mut record = record();
        let thesis = round(&record, PersonaRole::Optimist);
        record.apply_round(thesis).unwrap();

        let mut antithesis = round(&record, PersonaRole::Pessimist);
        antithesis.responds_to.clear();
        let err = record.apply_round(antithesis).unwrap_err();
        assert!(matches!(err, DebateError::InvalidRound { .. }));
    }

    #[test]
    fn test_wrong_role_for_phase() {
        let mut record = record();
        let mut r = round(&record, PersonaRole::Optimist);
        r.role = PersonaRole::Mediator;
        let err = record.apply_round(r).unwrap_err();
        assert!(matches!(err, DebateError::InvalidRound { .. }));
    }

    #[test]
    fn test_complete_requires_synthesis() {
        let mut record = record();
        let err = record.complete(FinalDecision::default()).unwrap_err();
        assert!(matches!(err, DebateError::Transition(_)));
    }

    #[test]
    fn test_complete_twice_rejected() {
        let mut record = record();
        for role in PersonaRole::all() {
            let r = round(&record, role);
            record.apply_round(r).unwrap();
        }
        record.complete(FinalDecision::default()).unwrap();
        assert!(record.completed_at.is_some());
        let err = record.complete(FinalDecision::default()).unwrap_err();
        assert_eq!(err, DebateError::AlreadyComplete(record.id.clone()));
    }

    #[test]
    fn test_cancel_then_round_rejected() {
        let mut record = record();
        record.cancel("operator request").unwrap();
        assert_eq!(record.current_phase, DebatePhase::Cancelled);
        assert_eq!(record.cancel_reason.as_deref(), Some("operator request"));

        let r = round(&record, PersonaRole::Optimist);
        let err = record.apply_round(r).unwrap_err();
        assert!(matches!(err, DebateError::NotActive { .. }));
    }

    #[test]
    fn test_revision_increments() {
        let mut record = record();
        let before = record.revision;
        let r = round(&record, PersonaRole::Optimist);
        record.apply_round(r).unwrap();
        assert!(record.revision > before);
    }

    #[test]
    fn test_transition_history() {
        let mut record = record();
        for role in PersonaRole::all() {
            let r = round(&record, role);
            record.apply_round(r).unwrap();
        }
        record
            .transition(DebatePhase::GovernanceReview, "review requested")
            .unwrap();
        assert_eq!(record.transitions.len(), 4);
        assert_eq!(record.transitions[0].from, DebatePhase::Pending);
        assert_eq!(record.transitions[3].to, DebatePhase::GovernanceReview);
    }

    #[test]
    fn test_phase_display_roundtrip() {
        for phase in [
            DebatePhase::Pending,
            DebatePhase::Thesis,
            DebatePhase::Antithesis,
            DebatePhase::Synthesis,
            DebatePhase::GovernanceReview,
            DebatePhase::Complete,
            DebatePhase::Cancelled,
        ] {
            let parsed: DebatePhase = phase.to_string().parse().unwrap();
            assert_eq!(parsed, phase);
        }
    }

    #[test]
    fn test_priority_order() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
        assert!(Priority::High.requires_governance());
        assert!(!Priority::Medium.requires_governance());
        assert_eq!("normal".parse::<Priority>().unwrap(), Priority::Medium);
    }
}
