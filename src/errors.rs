//! Core error taxonomy.
//!
//! One enum covers every subsystem boundary named in the error handling
//! design: the pool, the dispatcher, the plugin chain, and the WebRTC
//! coordinator all return `CoreError`. The transport adapter is the only
//! place that knows how to turn a variant into an HTTP status.

use crate::session::SessionKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no session for key {0}")]
    SessionNotFound(SessionKey),

    #[error("driver failed to open session for key {key}: {source}")]
    DriverOpenFailed {
        key: SessionKey,
        #[source]
        source: DriverError,
    },

    #[error("driver operation failed: {0}")]
    DriverOperationFailed(#[source] DriverError),

    #[error("page is closed")]
    PageClosed,

    #[error("command requires manual mode")]
    ManualModeRequired,

    #[error("command priority {requested:?} does not exceed current manual priority {current:?}")]
    PriorityConflict {
        requested: crate::session::Priority,
        current: crate::session::Priority,
    },

    #[error("script rejected by safety checker: {0}")]
    ScriptUnsafe(String),

    #[error("no fingerprint profile {profile_id} for tenant {tenant_id}")]
    ProfileNotFound { tenant_id: u64, profile_id: u64 },

    #[error("tenant {tenant_id} has reached its fingerprint profile limit")]
    FingerprintLimitExceeded { tenant_id: u64 },

    #[error("invalid ICE candidate string: {0}")]
    InvalidCandidate(String),

    #[error("no WebRTC connection for key {0}")]
    NoWebRtcConnection(SessionKey),
}

impl CoreError {
    /// True for driver errors the Retry plugin should treat as transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::DriverOperationFailed(source) => source.is_retryable(),
            CoreError::PageClosed => false,
            _ => false,
        }
    }
}

/// Errors surfaced by the `BrowserDriver` collaborator.
///
/// Kept distinct from `CoreError` because it crosses the external-collaborator
/// boundary named in the error handling design: a `"page closed"`/`"context
/// closed"` substring match upgrades it to `CoreError::PageClosed` at the call
/// site instead of being exposed directly.
#[derive(Debug, Error, Clone)]
pub enum DriverError {
    #[error("open failed: {0}")]
    OpenFailed(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("page closed: {0}")]
    PageClosed(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("transient failure: {0}")]
    Transient(String),
}

impl DriverError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriverError::Transient(_) | DriverError::Timeout(_) | DriverError::NavigationFailed(_)
        )
    }

    /// Classify a raw driver error message, upgrading the well-known
    /// "page closed" / "context closed" substrings to a dedicated kind.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("page closed") || lower.contains("context closed") {
            DriverError::PageClosed(message)
        } else {
            DriverError::Transient(message)
        }
    }
}
