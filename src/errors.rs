use thiserror::Error;

use crate::kind::ElementKind;

/// Error type for the native mirroring bridge.
///
/// Every variant except [`MirrorError::Io`] is fatal: the C ABI layer hands it
/// to the host's fatal-error mechanism instead of returning it to native code.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("failed to bind {what} {name}: {reason}")]
    Binding {
        what: &'static str,
        name: String,
        reason: String,
    },

    #[error("{table} table expansion failure at capacity {capacity}")]
    TableGrowth { table: &'static str, capacity: usize },

    #[error("call stack overflow: depth {depth} exceeds maximum {max}")]
    CallDepthOverflow { depth: usize, max: usize },

    #[error("unexpected element kind {0}")]
    UnexpectedKind(String),

    #[error("{0} requires an active native call")]
    NoActiveCall(&'static str),

    #[error("refresh of entry {index} from an ancestor frame (frame mark {frame_hwm})")]
    CrossFrameRefresh { index: usize, frame_hwm: usize },

    #[error("invalid managed reference in {0}")]
    InvalidReference(&'static str),

    #[error("failed to pin {kind} array")]
    PinFailed { kind: ElementKind },

    #[error("managed exception pending after {0}")]
    PendingException(&'static str),

    #[error("host operation {operation} failed: {message}")]
    Host {
        operation: &'static str,
        message: String,
    },

    #[error("text value contains an interior NUL byte at {0}")]
    InteriorNul(usize),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MirrorError {
    pub fn host(operation: &'static str, message: impl Into<String>) -> Self {
        MirrorError::Host {
            operation,
            message: message.into(),
        }
    }

    /// Stable code used in structured log entries.
    pub fn error_code(&self) -> &'static str {
        match self {
            MirrorError::Binding { .. } => "BINDING_FAILED",
            MirrorError::TableGrowth { .. } => "TABLE_GROWTH",
            MirrorError::CallDepthOverflow { .. } => "CALL_DEPTH_OVERFLOW",
            MirrorError::UnexpectedKind(_) => "UNEXPECTED_KIND",
            MirrorError::NoActiveCall(_) => "NO_ACTIVE_CALL",
            MirrorError::CrossFrameRefresh { .. } => "CROSS_FRAME_REFRESH",
            MirrorError::InvalidReference(_) => "INVALID_REFERENCE",
            MirrorError::PinFailed { .. } => "PIN_FAILED",
            MirrorError::PendingException(_) => "PENDING_EXCEPTION",
            MirrorError::Host { .. } => "HOST_ERROR",
            MirrorError::InteriorNul(_) => "INTERIOR_NUL",
            MirrorError::Configuration(_) => "CONFIGURATION_ERROR",
            MirrorError::Io(_) => "IO_ERROR",
        }
    }

    pub fn is_fatal(&self) -> bool {
        !matches!(self, MirrorError::Io(_))
    }
}

impl From<jni::errors::Error> for MirrorError {
    fn from(e: jni::errors::Error) -> Self {
        MirrorError::host("jni", e.to_string())
    }
}

/// Result type alias using MirrorError
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Error messages module
pub mod messages {
    pub const MIRROR_TABLE: &str = "FFI copied vectors";
    pub const GLOBAL_REF_TABLE: &str = "FFI global refs";
    pub const NOT_INITIALIZED: &str = "native bridge used before initialization";
    pub const STALE_MIRROR: &str = "data in managed array changed, invalidating the cached pointer";
    pub const KIND_MISMATCH: &str = "cached mirror requested with a different element kind";
}
