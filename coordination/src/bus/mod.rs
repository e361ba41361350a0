//! Actor message bus.
//!
//! Typed envelopes ([`Payload`] tagged by [`MessageKind`]) routed between
//! named actors. Supports direct send, broadcast to all actors, reply to the
//! sender with correlation, and kind-level subscriptions that see every
//! message of one kind regardless of target.

pub mod dispatch;
pub mod types;

pub use dispatch::{
    BusError, BusResult, BusStats, MessageBus, MessageHandler, SharedMessageBus, SubscriptionId,
};
pub use types::{ActorId, Envelope, MessageId, MessageKind, Payload};
