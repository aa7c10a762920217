//! Konform Core: Error Taxonomy
//!
//! One engine-wide error enum. Every variant carries a stable `code`
//! string and a message that is safe to show to end users.

use crate::types::QuotaKind;
use thiserror::Error;

/// Engine-wide error kinds.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad URL, unknown render mode, malformed request
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// DNS, TCP, TLS failure or a 4xx/5xx from the target site
    #[error("target unreachable: {0}")]
    Unreachable(String),

    /// Headless browser crash or navigation timeout
    #[error("render failure: {0}")]
    RenderFailure(String),

    /// Metered action over the plan limit
    #[error("quota exceeded for {kind}: {remaining} remaining")]
    QuotaExceeded { kind: QuotaKind, remaining: i64 },

    /// Scan or fix does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller does not own the referenced resource
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Too many in-flight scans for this user
    #[error("too many concurrent scans, retry later")]
    Busy,

    /// Persistence, LLM or another collaborator failed
    #[error("dependency failure: {0}")]
    Dependency(String),

    /// The ambient cancellation token tripped
    #[error("operation cancelled")]
    Cancelled,

    /// A bug; the message is still display-safe
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::Unreachable(_) => "unreachable",
            EngineError::RenderFailure(_) => "render_failure",
            EngineError::QuotaExceeded { .. } => "quota_exceeded",
            EngineError::NotFound(_) => "not_found",
            EngineError::PermissionDenied(_) => "permission_denied",
            EngineError::Busy => "busy",
            EngineError::Dependency(_) => "dependency",
            EngineError::Cancelled => "cancelled",
            EngineError::Internal(_) => "internal",
        }
    }

    /// True for faults of the target site rather than of the engine.
    pub fn is_target_fault(&self) -> bool {
        matches!(self, EngineError::Unreachable(_) | EngineError::RenderFailure(_))
    }
}

/// Convenience alias used across the workspace.
pub type EngineResult<T> = Result<T, EngineError>;
