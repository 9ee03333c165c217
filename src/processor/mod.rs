//! The external single-item processor.
//!
//! A processor takes one URL and returns text. Every way that can go wrong
//! comes back as a [`ProcessError`] value so the coordinator can record it
//! and move on; nothing here aborts a batch.

pub mod http;

pub use http::HttpProcessor;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Why a single processor call produced no result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error("processor did not answer within {0:?}")]
    Timeout(Duration),

    #[error("processor returned HTTP {0}")]
    Status(u16),

    #[error("processor request failed: {0}")]
    Transport(String),
}

impl ProcessError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessError::Timeout(_) => "timeout",
            ProcessError::Status(_) => "status",
            ProcessError::Transport(_) => "transport",
        }
    }
}

#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// Process one URL, giving up after `timeout`.
    ///
    /// Implementations enforce the timeout themselves; the caller applies
    /// no second deadline.
    async fn process(&self, url: &str, timeout: Duration) -> Result<String, ProcessError>;
}
