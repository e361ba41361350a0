//! Message types carried by the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coaching::CoachingFeedback;
use crate::debate::{
    DebateBrief, DebateId, DebateRecord, DebateRound, GovernanceReview, Priority, ReviewerRole,
};

/// Name of an actor on the bus.
pub type ActorId = String;

/// Unique message identifier.
pub type MessageId = String;

/// Discriminant of a [`Payload`]. Kind subscriptions key on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    DebateStart,
    DebateThesis,
    DebateAntithesis,
    DebateSynthesis,
    GovernanceReviewRequest,
    GovernanceReviewResult,
    Coaching,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DebateStart => "DEBATE_START",
            Self::DebateThesis => "DEBATE_THESIS",
            Self::DebateAntithesis => "DEBATE_ANTITHESIS",
            Self::DebateSynthesis => "DEBATE_SYNTHESIS",
            Self::GovernanceReviewRequest => "GOVERNANCE_REVIEW_REQUEST",
            Self::GovernanceReviewResult => "GOVERNANCE_REVIEW_RESULT",
            Self::Coaching => "COACHING",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed message body, one variant per message kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Payload {
    DebateStart {
        brief: DebateBrief,
    },
    DebateThesis {
        brief: DebateBrief,
        thesis: DebateRound,
    },
    DebateAntithesis {
        brief: DebateBrief,
        thesis: DebateRound,
        antithesis: DebateRound,
    },
    DebateSynthesis {
        brief: DebateBrief,
        thesis: DebateRound,
        antithesis: DebateRound,
        synthesis: DebateRound,
    },
    GovernanceReviewRequest {
        debate: Box<DebateRecord>,
    },
    GovernanceReviewResult {
        debate_id: DebateId,
        review: GovernanceReview,
        reviewer: ReviewerRole,
    },
    Coaching {
        feedback: CoachingFeedback,
    },
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::DebateStart { .. } => MessageKind::DebateStart,
            Self::DebateThesis { .. } => MessageKind::DebateThesis,
            Self::DebateAntithesis { .. } => MessageKind::DebateAntithesis,
            Self::DebateSynthesis { .. } => MessageKind::DebateSynthesis,
            Self::GovernanceReviewRequest { .. } => MessageKind::GovernanceReviewRequest,
            Self::GovernanceReviewResult { .. } => MessageKind::GovernanceReviewResult,
            Self::Coaching { .. } => MessageKind::Coaching,
        }
    }

    /// Debate the message concerns, if any.
    pub fn debate_id(&self) -> Option<&str> {
        match self {
            Self::DebateStart { brief }
            | Self::DebateThesis { brief, .. }
            | Self::DebateAntithesis { brief, .. }
            | Self::DebateSynthesis { brief, .. } => Some(&brief.debate_id),
            Self::GovernanceReviewRequest { debate } => Some(&debate.id),
            Self::GovernanceReviewResult { debate_id, .. } => Some(debate_id),
            Self::Coaching { .. } => None,
        }
    }

    /// Rounds carried by the message, in protocol order.
    pub fn rounds(&self) -> Vec<&DebateRound> {
        match self {
            Self::DebateThesis { thesis, .. } => vec![thesis],
            Self::DebateAntithesis {
                thesis, antithesis, ..
            } => vec![thesis, antithesis],
            Self::DebateSynthesis {
                thesis,
                antithesis,
                synthesis,
                ..
            } => vec![thesis, antithesis, synthesis],
            _ => Vec::new(),
        }
    }
}

/// A routed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: MessageId,
    pub source: ActorId,
    /// `None` for broadcasts.
    pub target: Option<ActorId>,
    pub payload: Payload,
    pub priority: Priority,
    pub correlation_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

impl Envelope {
    pub fn new(source: &str, payload: Payload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.to_string(),
            target: None,
            payload,
            priority: Priority::default(),
            correlation_id: None,
            sent_at: Utc::now(),
        }
    }

    pub fn to(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_correlation(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// Correlation id a reply should carry.
    pub fn reply_correlation(&self) -> String {
        self.correlation_id.clone().unwrap_or_else(|| self.id.clone())
    }

    /// Structural checks applied at the bus boundary.
    pub fn validate(&self) -> Result<(), String> {
        if self.source.trim().is_empty() {
            return Err("empty source actor id".to_string());
        }
        if let Some(target) = &self.target {
            if target.trim().is_empty() {
                return Err("empty target actor id".to_string());
            }
        }
        if let Some(debate_id) = self.payload.debate_id() {
            if debate_id.trim().is_empty() {
                return Err(format!("{} carries an empty debate id", self.kind()));
            }
            if let Some(round) = self
                .payload
                .rounds()
                .into_iter()
                .find(|r| r.debate_id != debate_id)
            {
                return Err(format!(
                    "{} round {} belongs to debate {}",
                    self.kind(),
                    round.id,
                    round.debate_id
                ));
            }
        }
        if let Payload::GovernanceReviewResult {
            debate_id,
            review,
            reviewer,
        } = &self.payload
        {
            if review.debate_id != *debate_id || review.reviewer != *reviewer {
                return Err("review does not match its envelope".to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brief(id: &str) -> DebateBrief {
        DebateBrief {
            debate_id: id.to_string(),
            team: "cost-team".to_string(),
            domain: "cost".to_string(),
            topic: "Freight".to_string(),
            context: serde_json::Value::Null,
            priority: Priority::Medium,
        }
    }

    #[test]
    fn test_kind_and_debate_id() {
        let env = Envelope::new("chief", Payload::DebateStart { brief: brief("d-1") }).to("x");
        assert_eq!(env.kind(), MessageKind::DebateStart);
        assert_eq!(env.payload.debate_id(), Some("d-1"));
        assert!(env.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_ids() {
        let env = Envelope::new("", Payload::DebateStart { brief: brief("d-1") });
        assert!(env.validate().is_err());
        let env = Envelope::new("chief", Payload::DebateStart { brief: brief("") });
        assert!(env.validate().is_err());
        let env = Envelope::new("chief", Payload::DebateStart { brief: brief("d") }).to(" ");
        assert!(env.validate().is_err());
    }

    #[test]
    fn test_reply_correlation_defaults_to_id() {
        let env = Envelope::new("a", Payload::DebateStart { brief: brief("d") });
        assert_eq!(env.reply_correlation(), env.id);
        let env = env.with_correlation(Some("corr".to_string()));
        assert_eq!(env.reply_correlation(), "corr");
    }

    #[test]
    fn test_review_request_compares_by_record() {
        let record = DebateRecord::new("cost-team", "cost", "Freight", serde_json::json!({}));
        let env = Envelope::new(
            "chief",
            Payload::GovernanceReviewRequest {
                debate: Box::new(record.clone()),
            },
        )
        .to("quality-specialist");
        assert_eq!(env.clone(), env);

        let mut other = record;
        other.topic = "Parcel".to_string();
        let changed = Envelope {
            payload: Payload::GovernanceReviewRequest {
                debate: Box::new(other),
            },
            ..env.clone()
        };
        assert_ne!(changed, env);
    }

    #[test]
    fn test_payload_tag() {
        let json = serde_json::to_value(Payload::DebateStart { brief: brief("d") }).unwrap();
        assert_eq!(json["kind"], "DEBATE_START");
    }
}
