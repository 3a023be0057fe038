/*!
 * Process Warden
 * Host-local process inventory, safe lifecycle control, and system
 * metrics sampling
 *
 * Architecture:
 * - Inventory: refreshable snapshot of live processes, one held access
 *   handle per reachable record
 * - Termination: duplicate-probe-request-wait protocol that never kills
 *   blind, against the handles the snapshot holds
 * - Metrics: host-wide CPU and memory figures, CPU derived from deltas
 *   between samples
 * - Reporter: fixed-capacity diagnostic queue every component records
 *   recoverable failures into
 *
 * Platform specifics live behind capability traits in [`platform`]; a
 * procfs/pidfd backend is provided on Linux.
 */

pub mod core;
pub mod inventory;
pub mod metrics;
pub mod platform;
pub mod reporter;
pub mod terminate;
mod warden;

#[cfg(target_os = "linux")]
pub mod ffi;

pub use self::core::errors::{PlatformError, WardenError};
pub use self::core::types::{ExitCode, Pid, Result};
pub use self::inventory::ProcessEntry;
pub use self::metrics::SystemMetrics;
pub use self::reporter::{ErrorKind, ErrorRecord, Provenance};
pub use self::terminate::TerminatorConfig;
pub use self::warden::{Warden, WardenConfig};

use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - WARDEN_TRACE_JSON: Enable JSON output (default: false)
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("WARDEN_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        // JSON output for production/parsing
        let _ = registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init();
    } else {
        // Human-readable output for development
        let _ = registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init();
    }
}
