//! Error types for tierbox.

use thiserror::Error;

/// Result type alias using tierbox's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for tierbox.
///
/// Validation and security failures are detected before any payload runs and
/// are converted into failure `ExecutionResult`s at the tier boundary; they
/// never escape the orchestrator as raw errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed parameters or an unsupported payload language.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Denylisted import/call, path-traversal attempt, or sandbox
    /// preparation failure.
    #[error("Security error: {0}")]
    Security(String),

    /// Wall-clock ceiling exceeded in the restricted or subprocess tier.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Wall-clock ceiling exceeded inside the container tier.
    #[error("Sandbox timeout: {0}")]
    SandboxTimeout(String),

    /// Container-API or archive-transfer failure.
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Missing file on read/copy.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Tool registry miss.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a security error.
    pub fn security(msg: impl Into<String>) -> Self {
        Self::Security(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a sandbox timeout error.
    pub fn sandbox_timeout(msg: impl Into<String>) -> Self {
        Self::SandboxTimeout(msg.into())
    }

    /// Create a sandbox (container API) error.
    pub fn sandbox(msg: impl Into<String>) -> Self {
        Self::Sandbox(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a tool-not-found error.
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound(name.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is a timeout at any tier.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::SandboxTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_symbol() {
        let err = Error::security("use of denylisted import 'os'");
        assert!(err.to_string().contains("'os'"));
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::timeout("60s").is_timeout());
        assert!(Error::sandbox_timeout("60s").is_timeout());
        assert!(!Error::validation("bad").is_timeout());
    }
}
