//! Error types for the core library.

use thiserror::Error;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Identifier width outside the supported range
    #[error("Invalid identifier space: {0}")]
    InvalidSpace(String),
    /// Identifier does not fit the configured ring
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// Invalid node configuration
    #[error("Invalid node: {0}")]
    InvalidNode(String),
}
