//! Error types for dispatchq.
//!
//! Only cycle-level failures live here. Per-item processor failures are
//! [`crate::processor::ProcessError`] and never escalate.

use thiserror::Error;

/// The stage of a batch cycle in which a fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Claim,
    Mark,
    Commit,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Claim => "claim",
            Phase::Mark => "mark",
            Phase::Commit => "commit",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("claim conflict: requested {requested} items, only {claimed} were still pending")]
    ClaimConflict { requested: usize, claimed: usize },

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{phase} phase failed: {source}")]
    Cycle {
        phase: Phase,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Tag this error with the cycle phase it escaped from.
    pub fn in_phase(self, phase: Phase) -> Self {
        Error::Cycle {
            phase,
            source: Box::new(self),
        }
    }

    /// The failing phase, if this error came out of a cycle.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Error::Cycle { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
