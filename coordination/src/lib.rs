//! Dialectical debate orchestration.
//!
//! Business-analysis teams debate a topic in three fixed rounds: an optimist
//! argues a thesis, a pessimist answers with an antithesis, and a mediator
//! reconciles both into a synthesis with concrete actions. A chief
//! orchestrator gates the synthesis through governance review when priority
//! or confidence calls for it, then finalizes the debate.
//!
//! # Components
//!
//! - [`bus`]: typed actor messages with direct, broadcast, reply and
//!   kind-level delivery
//! - [`persona`]: one actor type per role strategy, with deterministic
//!   fallback content when generation fails
//! - [`debate`]: records, rounds, admission control, persistence contracts
//!   and transcripts
//! - [`governance`]: quality and compliance reviewers
//! - [`orchestrator`]: debate flow, governance gating, coaching sweep and
//!   cross-domain insights
//! - [`engine`]: explicit wiring of all of the above
//!
//! # Usage
//!
//! ```no_run
//! use coordination::{DebateEngine, EngineConfig, Priority};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let engine = DebateEngine::builder(EngineConfig::default()).build()?;
//! engine.start(true).await?;
//! let admission = engine
//!     .orchestrator()
//!     .orchestrate_debate("inventory-team", "Safety stock policy", serde_json::json!({}), Priority::Medium)
//!     .await?;
//! # let _ = admission;
//! # Ok(())
//! # }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod bus;
pub mod coaching;
pub mod config;
pub mod debate;
pub mod engine;
pub mod generation;
pub mod governance;
pub mod orchestrator;
pub mod parse;
pub mod persona;

pub use bus::{
    BusError, BusStats, Envelope, MessageBus, MessageHandler, MessageKind, Payload,
    SharedMessageBus,
};
pub use coaching::{CoachingFeedback, CoachingMetric, Tunables, Verbosity};
pub use config::{CoachingConfig, ConfigError, EngineConfig, GovernanceConfig, TeamSpec};
pub use debate::{
    Admission, DebateBrief, DebateContent, DebateError, DebateEvent, DebateManager, DebatePhase,
    DebateQuery, DebateRecord, DebateRequest, DebateRound, DebateSnapshot, DebateStore,
    FileTranscriptSink, FinalDecision, GovernanceReview, HistoryFilter, MemoryDebateStore,
    NullTranscriptSink, PersistenceError, PersonaRole, Priority, QueueStatus, RestoreReport,
    ReviewerRole, SharedDebateManager, SharedDebateStore, SharedTranscriptSink, Statistics,
    TranscriptMeta, TranscriptSink,
};
pub use engine::{DebateEngine, EngineBuilder};
pub use generation::{
    DisabledGenerator, Generation, GenerationError, GenerationResult, SharedTextGenerator,
    TextGenerator,
};
pub use governance::{
    ComplianceReviewer, GovernanceActor, QualityReviewer, ReviewError, Reviewer, SharedReviewer,
};
pub use orchestrator::{
    ChiefOrchestrator, CrossDomainSummary, OrchestratorError, PendingDebate, ReconcileReport,
    TeamAdmission, TeamStatus, ORCHESTRATOR_ID,
};
pub use persona::{PersonaActor, PersonaSnapshot, PersonaStats, PersonaStatus, RoleStrategy};
