//! Admission queue for debates waiting on a concurrency slot.
//!
//! Higher priority is served first; within a priority band requests are
//! served in arrival order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{DebatePhase, DebateRecord, Priority};

/// Handle returned for a queued request.
pub type QueueTicket = u64;

/// A request to start a debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRequest {
    pub team: String,
    pub domain: String,
    pub topic: String,
    pub context: serde_json::Value,
    pub priority: Priority,
    /// Send the opening message as soon as the debate is admitted.
    pub immediate: bool,
}

impl DebateRequest {
    pub fn new(team: &str, domain: &str, topic: &str, context: serde_json::Value) -> Self {
        Self {
            team: team.to_string(),
            domain: domain.to_string(),
            topic: topic.to_string(),
            context,
            priority: Priority::default(),
            immediate: true,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn deferred(mut self) -> Self {
        self.immediate = false;
        self
    }
}

/// What sits in the queue: a fresh request, or a restored record that did
/// not fit under the cap.
#[derive(Debug, Clone)]
pub enum QueuedDebate {
    Fresh(DebateRequest),
    Restored(DebateRecord),
}

impl QueuedDebate {
    pub fn priority(&self) -> Priority {
        match self {
            Self::Fresh(req) => req.priority,
            Self::Restored(record) => record.priority,
        }
    }

    pub fn team(&self) -> &str {
        match self {
            Self::Fresh(req) => &req.team,
            Self::Restored(record) => &record.team,
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            Self::Fresh(req) => &req.topic,
            Self::Restored(record) => &record.topic,
        }
    }
}

/// Public view of one queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedSummary {
    pub ticket: QueueTicket,
    /// 1-based position in service order.
    pub position: usize,
    pub team: String,
    pub topic: String,
    pub priority: Priority,
    /// Phase a restored record will resume from.
    pub resume_phase: Option<DebatePhase>,
    pub enqueued_at: DateTime<Utc>,
}

struct Entry {
    ticket: QueueTicket,
    seq: u64,
    enqueued_at: DateTime<Utc>,
    item: QueuedDebate,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Max-heap: higher priority wins, then the lower sequence number.
    fn cmp(&self, other: &Self) -> Ordering {
        self.item
            .priority()
            .cmp(&other.item.priority())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority-aware FIFO of debates waiting for admission.
#[derive(Default)]
pub struct AdmissionQueue {
    heap: BinaryHeap<Entry>,
    seq: u64,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue under `ticket`. Returns the 1-based service position.
    pub fn push(&mut self, ticket: QueueTicket, item: QueuedDebate) -> usize {
        self.seq += 1;
        self.heap.push(Entry {
            ticket,
            seq: self.seq,
            enqueued_at: Utc::now(),
            item,
        });
        self.position(ticket).unwrap_or(self.heap.len())
    }

    /// Take the next request to admit.
    pub fn pop(&mut self) -> Option<(QueueTicket, QueuedDebate)> {
        self.heap.pop().map(|e| (e.ticket, e.item))
    }

    /// Remove a specific ticket.
    pub fn remove(&mut self, ticket: QueueTicket) -> Option<QueuedDebate> {
        let mut entries = std::mem::take(&mut self.heap).into_vec();
        let idx = entries.iter().position(|e| e.ticket == ticket);
        let removed = idx.map(|i| entries.swap_remove(i).item);
        self.heap = BinaryHeap::from(entries);
        removed
    }

    /// 1-based service position of a ticket.
    pub fn position(&self, ticket: QueueTicket) -> Option<usize> {
        self.ordered()
            .iter()
            .position(|e| e.ticket == ticket)
            .map(|i| i + 1)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Entries in service order.
    pub fn snapshot(&self) -> Vec<QueuedSummary> {
        self.ordered()
            .into_iter()
            .enumerate()
            .map(|(i, e)| QueuedSummary {
                ticket: e.ticket,
                position: i + 1,
                team: e.item.team().to_string(),
                topic: e.item.topic().to_string(),
                priority: e.item.priority(),
                resume_phase: match &e.item {
                    QueuedDebate::Fresh(_) => None,
                    QueuedDebate::Restored(record) => Some(record.current_phase),
                },
                enqueued_at: e.enqueued_at,
            })
            .collect()
    }

    fn ordered(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.heap.iter().collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(topic: &str, priority: Priority) -> QueuedDebate {
        QueuedDebate::Fresh(
            DebateRequest::new("cost-team", "cost", topic, serde_json::Value::Null)
                .with_priority(priority),
        )
    }

    #[test]
    fn test_fifo_within_band() {
        let mut queue = AdmissionQueue::new();
        queue.push(1, request("a", Priority::Medium));
        queue.push(2, request("b", Priority::Medium));
        queue.push(3, request("c", Priority::Medium));

        let order: Vec<QueueTicket> = std::iter::from_fn(|| queue.pop().map(|(t, _)| t)).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_higher_priority_first() {
        let mut queue = AdmissionQueue::new();
        queue.push(1, request("low", Priority::Low));
        queue.push(2, request("medium", Priority::Medium));
        let pos = queue.push(3, request("critical", Priority::Critical));
        assert_eq!(pos, 1);
        queue.push(4, request("medium-2", Priority::Medium));

        let order: Vec<QueueTicket> = std::iter::from_fn(|| queue.pop().map(|(t, _)| t)).collect();
        assert_eq!(order, vec![3, 2, 4, 1]);
    }

    #[test]
    fn test_remove_and_positions() {
        let mut queue = AdmissionQueue::new();
        queue.push(1, request("a", Priority::Medium));
        queue.push(2, request("b", Priority::Medium));
        queue.push(3, request("c", Priority::Medium));

        assert!(queue.remove(2).is_some());
        assert!(queue.remove(2).is_none());
        assert_eq!(queue.position(3), Some(2));

        let snap = queue.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].topic, "a");
        assert_eq!(snap[1].position, 2);
    }
}
