//! Governance reviewers.
//!
//! A [`GovernanceActor`] wraps one [`Reviewer`] strategy. It answers
//! `GOVERNANCE_REVIEW_REQUEST` with `GOVERNANCE_REVIEW_RESULT` via
//! [`MessageBus::reply`](crate::bus::MessageBus::reply), so the orchestrator
//! sees the result under the request's correlation id.
//!
//! Reviews never block a debate forever: a reviewer that errors or panics is
//! replaced by [`conservative_review`].

pub mod compliance;
pub mod quality;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::bus::{ActorId, Envelope, MessageHandler, Payload, SharedMessageBus};
use crate::debate::{DebateRecord, GovernanceReview, ReviewIssue, ReviewerRole};

pub use compliance::ComplianceReviewer;
pub use quality::{is_vague_action, QualityReviewer};

/// Score given by the conservative default review.
pub const CONSERVATIVE_SCORE: u8 = 60;

/// Errors raised by a reviewer strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    #[error("debate {0} has no synthesis to review")]
    NoSynthesis(String),

    #[error("review failed: {0}")]
    Failed(String),
}

/// Result type for reviews
pub type ReviewResult<T> = Result<T, ReviewError>;

/// A governance review strategy.
#[async_trait]
pub trait Reviewer: Send + Sync {
    fn role(&self) -> ReviewerRole;

    async fn review(&self, record: &DebateRecord) -> ReviewResult<GovernanceReview>;
}

/// Shared reference to a reviewer.
pub type SharedReviewer = Arc<dyn Reviewer>;

/// Bus id of the actor hosting `role`.
pub fn reviewer_actor_id(role: ReviewerRole) -> ActorId {
    format!("governance/{role}")
}

/// Fill in score and verdict: clamp the score, approve iff it reaches
/// `approval_score` and nothing is critical.
pub fn conclude_review(
    mut review: GovernanceReview,
    score: i32,
    approval_score: u8,
) -> GovernanceReview {
    review.score = score.clamp(0, 100) as u8;
    review.approved = review.score >= approval_score && !review.has_critical();
    review
}

/// Default review used when a reviewer fails: approved with a reduced score
/// and a manual-review recommendation.
pub fn conservative_review(
    record: &DebateRecord,
    role: ReviewerRole,
    reviewer_id: &str,
    reason: &str,
) -> GovernanceReview {
    let mut review = GovernanceReview::new(&record.id, role, reviewer_id);
    review.approved = true;
    review.score = CONSERVATIVE_SCORE;
    review.recommendations.push(format!(
        "Automated {role} review unavailable ({reason}); review this debate manually"
    ));
    review
}

/// Push an issue together with its recommendation.
pub(crate) fn flag(review: &mut GovernanceReview, issue: ReviewIssue, recommendation: String) {
    review.issues.push(issue);
    if !review.recommendations.contains(&recommendation) {
        review.recommendations.push(recommendation);
    }
}

/// Bus actor hosting one reviewer.
pub struct GovernanceActor {
    id: ActorId,
    reviewer: SharedReviewer,
    bus: SharedMessageBus,
}

impl GovernanceActor {
    pub fn new(reviewer: SharedReviewer, bus: SharedMessageBus) -> Self {
        Self {
            id: reviewer_actor_id(reviewer.role()),
            reviewer,
            bus,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> ReviewerRole {
        self.reviewer.role()
    }

    /// Run the reviewer in its own task so a panic is contained, and always
    /// produce a review for `record`.
    pub async fn review(&self, record: &DebateRecord) -> GovernanceReview {
        let role = self.role();
        let reviewer = Arc::clone(&self.reviewer);
        let owned = record.clone();
        let outcome = tokio::spawn(async move { reviewer.review(&owned).await }).await;

        let mut review = match outcome {
            Ok(Ok(review)) => review,
            Ok(Err(e)) => {
                warn!(debate_id = %record.id, reviewer = %role, error = %e, "Reviewer failed, using conservative review");
                conservative_review(record, role, &self.id, &e.to_string())
            }
            Err(join) => {
                error!(debate_id = %record.id, reviewer = %role, error = %join, "Reviewer panicked, using conservative review");
                conservative_review(record, role, &self.id, "reviewer panicked")
            }
        };
        review.debate_id = record.id.clone();
        review.reviewer = role;
        review.reviewer_id = self.id.clone();
        review
    }
}

#[async_trait]
impl MessageHandler for GovernanceActor {
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<()> {
        let Payload::GovernanceReviewRequest { debate } = &envelope.payload else {
            warn!(actor = %self.id, kind = %envelope.kind(), "Ignoring non-review message");
            return Ok(());
        };

        let review = self.review(debate).await;
        info!(
            actor = %self.id,
            debate_id = %debate.id,
            approved = review.approved,
            score = review.score,
            issues = review.issues.len(),
            "Review complete"
        );
        self.bus.reply(
            &envelope,
            &self.id,
            Payload::GovernanceReviewResult {
                debate_id: debate.id.clone(),
                reviewer: review.reviewer,
                review,
            },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use crate::debate::{IssueKind, IssueSeverity};
    use std::time::Duration;
    use tokio::sync::Mutex;

    struct Broken;

    #[async_trait]
    impl Reviewer for Broken {
        fn role(&self) -> ReviewerRole {
            ReviewerRole::QualitySpecialist
        }

        async fn review(&self, record: &DebateRecord) -> ReviewResult<GovernanceReview> {
            Err(ReviewError::NoSynthesis(record.id.clone()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Reviewer for Panicking {
        fn role(&self) -> ReviewerRole {
            ReviewerRole::ComplianceAuditor
        }

        async fn review(&self, _record: &DebateRecord) -> ReviewResult<GovernanceReview> {
            panic!("rule table exploded")
        }
    }

    #[derive(Default)]
    struct Inbox {
        seen: Mutex<Vec<Envelope>>,
    }

    #[async_trait]
    impl MessageHandler for Inbox {
        async fn handle(&self, envelope: Envelope) -> anyhow::Result<()> {
            self.seen.lock().await.push(envelope);
            Ok(())
        }
    }

    fn record() -> DebateRecord {
        DebateRecord::new("cost-team", "cost", "Freight", serde_json::Value::Null)
    }

    #[test]
    fn test_conclude_review() {
        let r = record();
        let review = conclude_review(
            GovernanceReview::new(&r.id, ReviewerRole::QualitySpecialist, "q"),
            130,
            70,
        );
        assert_eq!(review.score, 100);
        assert!(review.approved);

        let mut critical = GovernanceReview::new(&r.id, ReviewerRole::QualitySpecialist, "q");
        critical
            .issues
            .push(ReviewIssue::new(IssueKind::Structure, IssueSeverity::Critical, "x"));
        let review = conclude_review(critical, 90, 70);
        assert!(!review.approved);

        let review = conclude_review(
            GovernanceReview::new(&r.id, ReviewerRole::QualitySpecialist, "q"),
            -15,
            70,
        );
        assert_eq!(review.score, 0);
    }

    #[tokio::test]
    async fn test_error_becomes_conservative_review() {
        let actor = GovernanceActor::new(Arc::new(Broken), MessageBus::new().shared());
        let r = record();
        let review = actor.review(&r).await;
        assert!(review.approved);
        assert_eq!(review.score, CONSERVATIVE_SCORE);
        assert_eq!(review.reviewer_id, "governance/quality-specialist");
        assert!(review.recommendations[0].contains("manually"));
    }

    #[tokio::test]
    async fn test_panic_becomes_conservative_review() {
        let actor = GovernanceActor::new(Arc::new(Panicking), MessageBus::new().shared());
        let review = actor.review(&record()).await;
        assert!(review.approved);
        assert_eq!(review.reviewer, ReviewerRole::ComplianceAuditor);
    }

    #[tokio::test]
    async fn test_reply_goes_back_to_requester() {
        let bus = MessageBus::new().shared();
        let inbox = Arc::new(Inbox::default());
        bus.subscribe_actor("chief", inbox.clone());
        let actor = GovernanceActor::new(Arc::new(Broken), bus.clone());

        let r = record();
        let request = Envelope::new(
            "chief",
            Payload::GovernanceReviewRequest {
                debate: Box::new(r.clone()),
            },
        )
        .to(actor.id())
        .with_correlation(Some(r.id.clone()));
        actor.handle(request).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let seen = inbox.seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].correlation_id.as_deref(), Some(r.id.as_str()));
        match &seen[0].payload {
            Payload::GovernanceReviewResult {
                debate_id,
                reviewer,
                ..
            } => {
                assert_eq!(debate_id, &r.id);
                assert_eq!(*reviewer, ReviewerRole::QualitySpecialist);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
