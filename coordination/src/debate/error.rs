//! Protocol errors raised by the debate state machine.

use super::state::{DebatePhase, TransitionError};

/// Error type for debate operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DebateError {
    #[error("debate not found: {0}")]
    NotFound(String),

    #[error("debate {debate_id} is not active (phase {phase})")]
    NotActive {
        debate_id: String,
        phase: DebatePhase,
    },

    #[error("out of order round for debate {debate_id}: expected {expected}, got {actual}")]
    OutOfOrderRound {
        debate_id: String,
        expected: String,
        actual: DebatePhase,
    },

    #[error("invalid round for debate {debate_id}: {reason}")]
    InvalidRound { debate_id: String, reason: String },

    #[error("debate already complete: {0}")]
    AlreadyComplete(String),

    #[error("governance review not applicable to debate {debate_id}: {reason}")]
    GovernanceNotApplicable { debate_id: String, reason: String },

    #[error("queue ticket not found: {0}")]
    TicketNotFound(u64),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Result type for debate operations
pub type DebateResult<T> = Result<T, DebateError>;
