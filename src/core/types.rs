/*!
 * Core Types
 * Common types used across the crate
 */

/// Process ID type (platform process identifier, stable for the process's lifetime)
pub type Pid = u32;

/// Exit code handed to a terminating process
pub type ExitCode = i32;

/// Common result type for warden operations
pub type Result<T> = std::result::Result<T, super::errors::WardenError>;
