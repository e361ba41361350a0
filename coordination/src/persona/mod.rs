//! Debate personas.
//!
//! Every team has three personas: an optimist that opens with a thesis, a
//! pessimist that answers it, and a mediator that reconciles both. They share
//! one actor implementation ([`PersonaActor`]) and differ only in their
//! [`RoleStrategy`].

pub mod actor;
pub mod fallback;
pub mod strategy;

pub use actor::{
    spawn_team, PersonaActor, PersonaContext, PersonaSnapshot, PersonaStats, PersonaStatus,
};
pub use fallback::{fallback_entry, FallbackEntry, FALLBACK_DOMAINS};
pub use strategy::{balanced_confidence, context_excerpt, RoleStrategy, PROMPT_VERSION};
