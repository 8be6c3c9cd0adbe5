//! Failure taxonomy shared by the resolver, locator and worker.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    /// Host invoked the adapter without a usable context (no args, no data dir).
    #[error("{0}")]
    Precondition(String),

    #[error("Bad ply arg: {arg}")]
    MalformedArgument { arg: String },

    #[error("Bad ply arg: {arg} ({reason})")]
    InvalidArgumentValue { arg: String, reason: String },

    #[error("git branch check failed: {0}")]
    Diagnostic(String),

    #[error("npm install failed: {0}")]
    DependencyInstall(String),

    #[error("test discovery failed for '{pattern}': {reason}")]
    Discovery { pattern: String, reason: String },

    #[error("ply engine failure: {0}")]
    Engine(String),
}

impl AdapterError {
    /// Argument errors are integration bugs, never retried.
    pub fn is_malformed_argument(&self) -> bool {
        matches!(
            self,
            Self::MalformedArgument { .. } | Self::InvalidArgumentValue { .. }
        )
    }
}
