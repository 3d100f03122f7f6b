//! Error types for external collaborators.
//!
//! None of these ever fail a run: the resolver turns every
//! `CollaboratorError` into "tier unavailable" and moves to the next tier.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    /// Call did not finish within the caller-supplied bound
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Network or process failure reported by the collaborator
    #[error("transport error: {0}")]
    Transport(String),

    /// Response arrived but could not be understood
    #[error("unparseable response: {0}")]
    Parse(String),

    /// Source switched off by configuration (e.g. missing API key)
    #[error("source disabled: {0}")]
    Disabled(String),
}

impl From<serde_json::Error> for CollaboratorError {
    fn from(err: serde_json::Error) -> Self {
        CollaboratorError::Parse(err.to_string())
    }
}
