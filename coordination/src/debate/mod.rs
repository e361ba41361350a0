//! Debate lifecycle: records, rounds, admission control and durability.
//!
//! # Lifecycle
//!
//! ```text
//! Pending → Thesis → Antithesis → Synthesis ─┬─────────────────────▶ Complete
//!    │         │          │           │      └─▶ GovernanceReview ──▶ Complete
//!    │         │          │           │                │
//!    └─────────┴──────────┴───────────┴────────────────┴──▶ Cancelled
//! ```
//!
//! The [`DebateManager`] is the single owner of every [`DebateRecord`]. It
//! admits up to a fixed number of active debates and queues the rest by
//! priority, validates each round against the record's phase, and writes
//! snapshots and transcripts on a best-effort basis.

pub mod error;
pub mod events;
pub mod manager;
pub mod persistence;
pub mod queue;
pub mod round;
pub mod state;
pub mod transcript;

pub use error::{DebateError, DebateResult};
pub use events::{DebateEvent, EventFeed};
pub use manager::{
    Admission, AdmittedDebate, Completion, DebateManager, HistoryFilter, ManagerConfig,
    QueueStatus, RestoreReport, SharedDebateManager, SkippedSnapshot, Statistics,
};
pub use persistence::{
    validate_snapshot, DebateQuery, DebateSnapshot, DebateStore, IntegrityStatus,
    MemoryDebateStore, PersistenceError, PersistenceResult, SharedDebateStore,
};
pub use queue::{AdmissionQueue, DebateRequest, QueueTicket, QueuedDebate, QueuedSummary};
pub use round::{
    DebateContent, DebateRound, FinalDecision, GovernanceReview, IssueKind, IssueSeverity,
    ReviewIssue, ReviewerRole, RoundDirective,
};
pub use state::{
    DebateBrief, DebateId, DebatePhase, DebateRecord, PersonaRole, PhaseTransition, Priority,
    TransitionError,
};
pub use transcript::{
    render_transcript, FileTranscriptSink, NullTranscriptSink, SharedTranscriptSink,
    TranscriptError, TranscriptMeta, TranscriptResult, TranscriptSink,
};
