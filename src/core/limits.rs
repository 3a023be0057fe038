/*!
 * Limits and Constants
 *
 * Centralized location for every fixed bound the library exposes.
 * These values are policy, not accidents: callers size their buffers
 * from them, so changing one is a breaking change.
 */

use std::time::Duration;

// =============================================================================
// INVENTORY LIMITS
// =============================================================================

/// Maximum number of records one snapshot may hold (0x8000)
/// Refresh stops accepting entries past this point and reports truncation;
/// a truncated refresh is degraded but still successful
pub const MAX_TRACKED_PROCESSES: usize = 0x8000;

/// Maximum process-name length in bytes
/// Longer source names are truncated; no terminator is guaranteed
pub const MAX_PROCESS_NAME: usize = 260;

// =============================================================================
// DIAGNOSTIC QUEUE LIMITS
// =============================================================================

/// Fixed capacity of the diagnostic ring queue
/// On overflow the oldest unread record is overwritten (lossy under pressure)
pub const ERROR_QUEUE_CAPACITY: usize = 8;

/// Maximum diagnostic-message length in bytes
/// Formatting truncates rather than fails
pub const MAX_ERROR_MESSAGE: usize = 320;

/// Maximum length of platform-supplied diagnostic text in bytes
/// One extra byte beyond this is reserved for a terminator by C consumers
pub const PLATFORM_MESSAGE_MAX: usize = 200;

// =============================================================================
// METRICS LIMITS
// =============================================================================

/// Minimum interval between CPU utilization samples
/// Below this the time deltas are too small to be meaningful and the
/// previous figure is returned instead
pub const MIN_CPU_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);
