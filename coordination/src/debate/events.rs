//! Lifecycle event feed for debates.
//!
//! Tokio broadcast channel; publishing with no subscribers is not an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use super::queue::QueueTicket;
use super::round::ReviewerRole;
use super::state::{DebateId, DebatePhase, Priority};

/// Default channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Something that happened to a debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebateEvent {
    Admitted {
        debate_id: DebateId,
        team: String,
        ticket: Option<QueueTicket>,
        timestamp: DateTime<Utc>,
    },
    Queued {
        ticket: QueueTicket,
        team: String,
        priority: Priority,
        position: usize,
        timestamp: DateTime<Utc>,
    },
    RoundRecorded {
        debate_id: DebateId,
        phase: DebatePhase,
        confidence: u8,
        timestamp: DateTime<Utc>,
    },
    ReviewAdded {
        debate_id: DebateId,
        reviewer: ReviewerRole,
        approved: bool,
        score: u8,
        timestamp: DateTime<Utc>,
    },
    Completed {
        debate_id: DebateId,
        confidence: u8,
        timestamp: DateTime<Utc>,
    },
    Cancelled {
        debate_id: DebateId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    Restored {
        admitted: usize,
        queued: usize,
        skipped: usize,
        timestamp: DateTime<Utc>,
    },
}

impl DebateEvent {
    /// Short type name for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Admitted { .. } => "admitted",
            Self::Queued { .. } => "queued",
            Self::RoundRecorded { .. } => "round_recorded",
            Self::ReviewAdded { .. } => "review_added",
            Self::Completed { .. } => "completed",
            Self::Cancelled { .. } => "cancelled",
            Self::Restored { .. } => "restored",
        }
    }

    /// Debate this event concerns, if any.
    pub fn debate_id(&self) -> Option<&str> {
        match self {
            Self::Admitted { debate_id, .. }
            | Self::RoundRecorded { debate_id, .. }
            | Self::ReviewAdded { debate_id, .. }
            | Self::Completed { debate_id, .. }
            | Self::Cancelled { debate_id, .. } => Some(debate_id),
            Self::Queued { .. } | Self::Restored { .. } => None,
        }
    }
}

/// Broadcast feed of [`DebateEvent`]s.
pub struct EventFeed {
    sender: broadcast::Sender<DebateEvent>,
}

impl EventFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to all current subscribers.
    pub fn publish(&self, event: DebateEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Debate event published"),
            Err(_) => debug!(event_type, "Debate event published (no receivers)"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DebateEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let feed = EventFeed::default();
        feed.publish(DebateEvent::Cancelled {
            debate_id: "d-1".to_string(),
            reason: "test".to_string(),
            timestamp: Utc::now(),
        });
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives() {
        let feed = EventFeed::default();
        let mut rx = feed.subscribe();
        feed.publish(DebateEvent::Completed {
            debate_id: "d-2".to_string(),
            confidence: 72,
            timestamp: Utc::now(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "completed");
        assert_eq!(event.debate_id(), Some("d-2"));
    }

    #[test]
    fn test_event_serde_tag() {
        let event = DebateEvent::Queued {
            ticket: 4,
            team: "cost-team".to_string(),
            priority: Priority::High,
            position: 1,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "queued");
        assert_eq!(json["priority"], "high");
    }
}
