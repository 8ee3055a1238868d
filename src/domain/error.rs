// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every fallible operation below the application layer returns
// AbsaResult<T>. The variants mirror how a failure must be handled:
//
//   Config    → bad hyperparameters or missing files, never retried
//   Data      → malformed dataset or labels, aborts the dataset build
//   Transient → network trouble while fetching a pretrained asset,
//               the only kind a RetryPolicy will retry
//
// The application and CLI layers wrap these in anyhow::Error.

use thiserror::Error;

/// Result alias used throughout the library layers.
pub type AbsaResult<T> = std::result::Result<T, AbsaError>;

#[derive(Error, Debug)]
pub enum AbsaError {
    /// Invalid configuration, detected before any resources are allocated.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed or inconsistent training/inference data.
    #[error("data error: {0}")]
    Data(String),

    /// Network or connection failure while fetching a remote asset.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Saving or restoring a model artifact failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AbsaError {
    pub fn config(msg: impl Into<String>) -> Self {
        AbsaError::Config(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        AbsaError::Data(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        AbsaError::Transient(msg.into())
    }

    pub fn tokenizer(msg: impl std::fmt::Display) -> Self {
        AbsaError::Tokenizer(msg.to_string())
    }

    pub fn checkpoint(msg: impl Into<String>) -> Self {
        AbsaError::Checkpoint(msg.into())
    }

    /// True only for failures a retry could plausibly fix.
    pub fn is_transient(&self) -> bool {
        matches!(self, AbsaError::Transient(_))
    }
}
