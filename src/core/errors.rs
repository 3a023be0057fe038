/*!
 * Error Types
 * Centralized error handling with thiserror
 */

use crate::core::limits::PLATFORM_MESSAGE_MAX;
use crate::core::types::Pid;
use thiserror::Error;

/// Failures reported by the OS capability layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("enumeration unavailable: {0}")]
    EnumerationUnavailable(String),

    #[error("access denied")]
    AccessDenied,

    #[error("process no longer exists")]
    ProcessGone,

    #[error("wait timed out")]
    TimedOut,

    #[error("{op} failed: {detail}")]
    Syscall { op: &'static str, detail: String },
}

impl PlatformError {
    /// Wrap a failed OS call, bounding the platform-supplied text
    pub fn syscall(op: &'static str, err: &std::io::Error) -> Self {
        PlatformError::Syscall {
            op,
            detail: platform_message(err),
        }
    }
}

/// Errors surfaced by warden operations
///
/// Every variant is also pushed to the shared diagnostic queue with
/// provenance; the `Result` is the local pass/fail signal so callers do
/// not need to drain the queue to know an operation failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WardenError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("process {0} not found in current snapshot")]
    NotInSnapshot(Pid),

    #[error("enumeration failed: {0}")]
    Enumeration(PlatformError),

    #[error("system counters unavailable: {0}")]
    CountersUnavailable(PlatformError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<PlatformError> for WardenError {
    fn from(err: PlatformError) -> Self {
        WardenError::Internal(err.to_string())
    }
}

/// Bound platform-supplied diagnostic text to `PLATFORM_MESSAGE_MAX` bytes
/// and strip anything from the first CR/LF on (some platforms append one)
pub fn platform_message(err: &std::io::Error) -> String {
    let text = err.to_string();
    let end = text.find(['\r', '\n']).unwrap_or(text.len());
    let mut end = end.min(PLATFORM_MESSAGE_MAX);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
