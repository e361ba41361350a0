//! Round, review, and decision types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{DebatePhase, DebateRecord, PersonaRole, Priority};

/// Structured position produced by one persona.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebateContent {
    /// One-sentence claim.
    pub position: String,
    /// Prose reasoning.
    pub reasoning: String,
    /// Ordered, opaque evidence items.
    pub evidence: Vec<serde_json::Value>,
    /// Confidence, 0–100.
    pub confidence: u8,
    /// Concrete follow-ups (mediator rounds always carry some).
    #[serde(default)]
    pub suggested_actions: Vec<String>,
}

/// The directive given to a persona for one round. Kept for audit and replay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundDirective {
    pub context_excerpt: String,
    pub role: String,
    pub task: String,
    pub success_criteria: String,
}

impl RoundDirective {
    /// Standard directive for a role.
    pub fn for_role(role: PersonaRole, context_excerpt: &str) -> Self {
        let (task, success_criteria) = match role {
            PersonaRole::Optimist => (
                "Argue the strongest realistic upside of the topic",
                "A single clear claim backed by evidence from the context",
            ),
            PersonaRole::Pessimist => (
                "Challenge the thesis by naming its concrete risks and blind spots",
                "Engages the thesis directly instead of restating it",
            ),
            PersonaRole::Mediator => (
                "Reconcile thesis and antithesis into a balanced, actionable position",
                "References both positions and lists concrete next actions",
            ),
        };
        Self {
            context_excerpt: context_excerpt.to_string(),
            role: role.to_string(),
            task: task.to_string(),
            success_criteria: success_criteria.to_string(),
        }
    }
}

/// One persona's contribution to a debate. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRound {
    pub id: String,
    pub debate_id: String,
    pub phase: DebatePhase,
    pub role: PersonaRole,
    /// Authoring actor id.
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub content: DebateContent,
    pub directive: RoundDirective,
    /// Ids of prior rounds this one answers.
    pub responds_to: Vec<String>,
}

impl DebateRound {
    /// Create a round for `role`; the phase follows from the role.
    pub fn new(
        debate_id: &str,
        role: PersonaRole,
        author: &str,
        content: DebateContent,
        directive: RoundDirective,
        responds_to: Vec<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            debate_id: debate_id.to_string(),
            phase: role.phase(),
            role,
            author: author.to_string(),
            timestamp: Utc::now(),
            content,
            directive,
            responds_to,
        }
    }
}

/// Governance reviewer role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewerRole {
    QualitySpecialist,
    ComplianceAuditor,
}

impl ReviewerRole {
    pub fn all() -> [ReviewerRole; 2] {
        [Self::QualitySpecialist, Self::ComplianceAuditor]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::QualitySpecialist => "quality-specialist",
            Self::ComplianceAuditor => "compliance-auditor",
        }
    }
}

impl std::fmt::Display for ReviewerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a review finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Category of a review finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Missing round or broken protocol shape.
    Structure,
    /// Thesis and antithesis argue the same thing.
    Logic,
    /// Confidence below the floor.
    Quality,
    /// Too little evidence.
    Data,
    /// Synthesis actions missing or vague.
    Actionability,
    /// Personal data in the transcript.
    Privacy,
    /// Recommends a policy violation.
    Policy,
    /// Overconfident or absolute language.
    Language,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Structure => "structure",
            Self::Logic => "logic",
            Self::Quality => "quality",
            Self::Data => "data",
            Self::Actionability => "actionability",
            Self::Privacy => "privacy",
            Self::Policy => "policy",
            Self::Language => "language",
        };
        f.write_str(s)
    }
}

/// A single structured review finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewIssue {
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    pub description: String,
    /// Round the finding applies to, if it is round-specific.
    pub affects: Option<PersonaRole>,
}

impl ReviewIssue {
    pub fn new(kind: IssueKind, severity: IssueSeverity, description: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            description: description.into(),
            affects: None,
        }
    }

    pub fn affecting(mut self, role: PersonaRole) -> Self {
        self.affects = Some(role);
        self
    }
}

/// One reviewer's verdict on a completed synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceReview {
    pub id: String,
    pub debate_id: String,
    pub reviewer: ReviewerRole,
    /// Authoring actor id.
    pub reviewer_id: String,
    pub approved: bool,
    pub issues: Vec<ReviewIssue>,
    pub recommendations: Vec<String>,
    /// 0–100.
    pub score: u8,
    pub timestamp: DateTime<Utc>,
}

impl GovernanceReview {
    /// Build a review; approval is decided by the caller.
    pub fn new(debate_id: &str, reviewer: ReviewerRole, reviewer_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            debate_id: debate_id.to_string(),
            reviewer,
            reviewer_id: reviewer_id.to_string(),
            approved: false,
            issues: Vec::new(),
            recommendations: Vec::new(),
            score: 0,
            timestamp: Utc::now(),
        }
    }

    /// Whether any finding is critical.
    pub fn has_critical(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Critical)
    }
}

/// The conclusion of a debate. Derived from the synthesis, never edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalDecision {
    pub recommendation: String,
    pub reasoning: String,
    pub confidence: u8,
    pub actions: Vec<String>,
    pub priority: Priority,
    /// Summary of rejecting reviews, if any.
    pub dissent: Option<String>,
}

impl FinalDecision {
    /// Build the decision from a record's synthesis and reviews.
    ///
    /// Returns `None` when the record has no synthesis yet.
    pub fn from_record(record: &DebateRecord) -> Option<Self> {
        let synthesis = record.synthesis.as_ref()?;
        let content = &synthesis.content;

        let rejected: Vec<&GovernanceReview> = record
            .governance_reviews
            .iter()
            .filter(|r| !r.approved)
            .collect();
        let dissent = if rejected.is_empty() {
            None
        } else {
            let parts: Vec<String> = rejected
                .iter()
                .map(|r| {
                    let findings: Vec<&str> =
                        r.issues.iter().map(|i| i.description.as_str()).collect();
                    format!("{} (score {}): {}", r.reviewer, r.score, findings.join("; "))
                })
                .collect();
            Some(parts.join(" | "))
        };

        let critical = record.governance_reviews.iter().any(|r| r.has_critical());
        let recommendation = if critical {
            format!(
                "Hold for manual review before acting: {}",
                content.position
            )
        } else {
            content.position.clone()
        };

        Some(Self {
            recommendation,
            reasoning: content.reasoning.clone(),
            confidence: content.confidence,
            actions: content.suggested_actions.clone(),
            priority: record.priority,
            dissent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthesized_record() -> DebateRecord {
        let mut record = DebateRecord::new("inventory-team", "inventory", "Stock cover", serde_json::json!({}));
        for role in PersonaRole::all() {
            let content = DebateContent {
                position: format!("{role} says so"),
                reasoning: format!("{role} reasoning"),
                evidence: vec![serde_json::json!(1)],
                confidence: 64,
                suggested_actions: vec!["Cut reorder point for SKU-1 by 10%".to_string()],
            };
            let round = DebateRound::new(
                &record.id,
                role,
                "actor",
                content,
                RoundDirective::for_role(role, ""),
                record.round_ids(),
            );
            record.apply_round(round).unwrap();
        }
        record
    }

    #[test]
    fn test_decision_from_synthesis() {
        let record = synthesized_record();
        let decision = FinalDecision::from_record(&record).unwrap();
        assert_eq!(decision.recommendation, "mediator says so");
        assert_eq!(decision.reasoning, "mediator reasoning");
        assert_eq!(decision.confidence, 64);
        assert_eq!(decision.actions.len(), 1);
        assert!(decision.dissent.is_none());
    }

    #[test]
    fn test_decision_requires_synthesis() {
        let record = DebateRecord::new("t", "d", "topic", serde_json::Value::Null);
        assert!(FinalDecision::from_record(&record).is_none());
    }

    #[test]
    fn test_rejecting_review_adds_dissent() {
        let mut record = synthesized_record();
        let mut review = GovernanceReview::new(&record.id, ReviewerRole::ComplianceAuditor, "c");
        review.score = 40;
        review.issues.push(ReviewIssue::new(
            IssueKind::Privacy,
            IssueSeverity::Critical,
            "email address in transcript",
        ));
        record.upsert_review(review);

        let decision = FinalDecision::from_record(&record).unwrap();
        let dissent = decision.dissent.unwrap();
        assert!(dissent.contains("compliance-auditor"));
        assert!(dissent.contains("email address"));
        assert!(decision.recommendation.starts_with("Hold for manual review"));
    }

    #[test]
    fn test_reviewer_role_serde() {
        let json = serde_json::to_string(&ReviewerRole::QualitySpecialist).unwrap();
        assert_eq!(json, "\"quality-specialist\"");
        assert_eq!(ReviewerRole::ComplianceAuditor.to_string(), "compliance-auditor");
    }
}
