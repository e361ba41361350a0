//! In-process message bus.
//!
//! Each subscription owns an unbounded FIFO mailbox drained by one dispatcher
//! task, so an actor handles one message at a time in arrival order. The
//! handler itself runs in a child task: an error or panic is logged and
//! counted, and the dispatcher moves on to the next message.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::types::{ActorId, Envelope, MessageId, MessageKind, Payload};
use crate::debate::Priority;

/// Handle for removing a subscription.
pub type SubscriptionId = u64;

/// Error type for bus operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("no subscriber for {kind} to {target}")]
    Undeliverable { target: String, kind: MessageKind },
}

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Something that consumes envelopes.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<()>;
}

/// Delivery counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    /// Messages accepted by `send`/`broadcast`/`reply`.
    pub sent: u64,
    /// Handler invocations that returned `Ok`.
    pub delivered: u64,
    /// Handler invocations that errored or panicked.
    pub failed: u64,
    /// Messages with no matching subscriber.
    pub undeliverable: u64,
    pub subscriptions: usize,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    undeliverable: AtomicU64,
}

struct Subscription {
    id: SubscriptionId,
    mailbox: mpsc::UnboundedSender<Envelope>,
}

/// Shared reference to a bus.
pub type SharedMessageBus = Arc<MessageBus>;

/// Routes envelopes to actor and kind subscriptions.
#[derive(Default)]
pub struct MessageBus {
    actors: RwLock<HashMap<ActorId, Vec<Subscription>>>,
    kinds: RwLock<HashMap<MessageKind, Vec<Subscription>>>,
    next_id: AtomicU64,
    counters: Arc<Counters>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedMessageBus {
        Arc::new(self)
    }

    /// Deliver messages addressed to `actor_id` to `handler`.
    pub fn subscribe_actor(
        &self,
        actor_id: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> SubscriptionId {
        let sub = self.spawn_mailbox(actor_id.to_string(), handler);
        let id = sub.id;
        write_lock(&self.actors)
            .entry(actor_id.to_string())
            .or_default()
            .push(sub);
        debug!(actor = actor_id, subscription = id, "Actor subscribed");
        id
    }

    /// Deliver every message of `kind` to `handler`, whatever its target.
    pub fn subscribe_kind(
        &self,
        kind: MessageKind,
        handler: Arc<dyn MessageHandler>,
    ) -> SubscriptionId {
        let sub = self.spawn_mailbox(format!("kind:{kind}"), handler);
        let id = sub.id;
        write_lock(&self.kinds).entry(kind).or_default().push(sub);
        debug!(%kind, subscription = id, "Kind subscribed");
        id
    }

    /// Remove a subscription. Messages already in its mailbox are still
    /// handled. Returns false if the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        fn remove<K>(map: &mut HashMap<K, Vec<Subscription>>, id: SubscriptionId) -> bool {
            let mut found = false;
            for subs in map.values_mut() {
                let before = subs.len();
                subs.retain(|s| s.id != id);
                found |= subs.len() != before;
            }
            map.retain(|_, subs| !subs.is_empty());
            found
        }
        remove(&mut *write_lock(&self.actors), id) || remove(&mut *write_lock(&self.kinds), id)
    }

    /// Whether any actor subscription exists for `actor_id`.
    pub fn has_actor(&self, actor_id: &str) -> bool {
        read_lock(&self.actors).contains_key(actor_id)
    }

    /// Send `payload` from `source` to `target`.
    pub fn send(
        &self,
        source: &str,
        target: &str,
        payload: Payload,
        priority: Priority,
        correlation_id: Option<String>,
    ) -> BusResult<MessageId> {
        self.dispatch(
            Envelope::new(source, payload)
                .to(target)
                .with_priority(priority)
                .with_correlation(correlation_id),
        )
    }

    /// Route a prepared envelope to its target's subscriptions and to every
    /// subscription for its kind.
    pub fn dispatch(&self, envelope: Envelope) -> BusResult<MessageId> {
        envelope.validate().map_err(BusError::InvalidMessage)?;
        let kind = envelope.kind();

        let mut mailboxes: Vec<mpsc::UnboundedSender<Envelope>> = Vec::new();
        if let Some(target) = &envelope.target {
            if let Some(subs) = read_lock(&self.actors).get(target) {
                mailboxes.extend(subs.iter().map(|s| s.mailbox.clone()));
            }
        }
        if let Some(subs) = read_lock(&self.kinds).get(&kind) {
            mailboxes.extend(subs.iter().map(|s| s.mailbox.clone()));
        }

        if mailboxes.is_empty() {
            self.counters.undeliverable.fetch_add(1, Ordering::Relaxed);
            let target = envelope.target.clone().unwrap_or_default();
            warn!(%kind, target = %target, source = %envelope.source, "Undeliverable message");
            return Err(BusError::Undeliverable { target, kind });
        }

        let id = envelope.id.clone();
        self.enqueue(&mailboxes, envelope);
        Ok(id)
    }

    /// Deliver to every actor subscription.
    pub fn broadcast(
        &self,
        source: &str,
        payload: Payload,
        priority: Priority,
    ) -> BusResult<MessageId> {
        let envelope = Envelope::new(source, payload).with_priority(priority);
        envelope.validate().map_err(BusError::InvalidMessage)?;

        let mailboxes: Vec<mpsc::UnboundedSender<Envelope>> = read_lock(&self.actors)
            .values()
            .flatten()
            .map(|s| s.mailbox.clone())
            .collect();
        let id = envelope.id.clone();
        if mailboxes.is_empty() {
            self.counters.undeliverable.fetch_add(1, Ordering::Relaxed);
            debug!(kind = %envelope.kind(), "Broadcast with no subscribers");
            return Ok(id);
        }
        self.enqueue(&mailboxes, envelope);
        Ok(id)
    }

    /// Answer `original`, addressed to its source, keeping its correlation id
    /// (or its message id when it had none).
    pub fn reply(&self, original: &Envelope, source: &str, payload: Payload) -> BusResult<MessageId> {
        self.dispatch(
            Envelope::new(source, payload)
                .to(&original.source)
                .with_priority(original.priority)
                .with_correlation(Some(original.reply_correlation())),
        )
    }

    pub fn stats(&self) -> BusStats {
        let subscriptions = read_lock(&self.actors).values().map(Vec::len).sum::<usize>()
            + read_lock(&self.kinds).values().map(Vec::len).sum::<usize>();
        BusStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            undeliverable: self.counters.undeliverable.load(Ordering::Relaxed),
            subscriptions,
        }
    }

    /// Drop every subscription. Dispatchers exit once their mailboxes drain.
    pub fn close(&self) {
        write_lock(&self.actors).clear();
        write_lock(&self.kinds).clear();
    }

    fn enqueue(&self, mailboxes: &[mpsc::UnboundedSender<Envelope>], envelope: Envelope) {
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        for mailbox in mailboxes {
            if mailbox.send(envelope.clone()).is_err() {
                self.counters.undeliverable.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn spawn_mailbox(&self, label: String, handler: Arc<dyn MessageHandler>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let counters = Arc::clone(&self.counters);

        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let kind = envelope.kind();
                let message_id = envelope.id.clone();
                let handler = Arc::clone(&handler);
                let outcome = tokio::spawn(async move { handler.handle(envelope).await }).await;
                match outcome {
                    Ok(Ok(())) => {
                        counters.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Err(e)) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(subscriber = %label, %kind, message_id = %message_id, error = %e, "Handler failed");
                    }
                    Err(join) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        error!(subscriber = %label, %kind, message_id = %message_id, error = %join, "Handler panicked");
                    }
                }
            }
            debug!(subscriber = %label, subscription = id, "Mailbox closed");
        });

        Subscription { id, mailbox: tx }
    }
}

// Lock poisoning only follows a panic inside these short map operations.
fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
