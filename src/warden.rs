/*!
 * Warden Facade
 * Assembles the reporter, inventory, sampler, and terminator behind one
 * object with the full operation surface
 */

use crate::core::limits::MAX_TRACKED_PROCESSES;
use crate::core::types::{Pid, Result};
use crate::inventory::{ProcessCache, ProcessEntry};
use crate::metrics::{MetricsSampler, SystemMetrics};
use crate::platform::{CounterSource, ProcessAccess, ProcessEnumerator};
use crate::reporter::{ErrorKind, ErrorRecord, ErrorReporter, Provenance};
use crate::terminate::{SafeTerminator, TerminatorConfig};
use std::sync::Arc;

/// Construction-time policy for a [`Warden`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WardenConfig {
    /// Snapshot capacity; the policy default is `MAX_TRACKED_PROCESSES`
    pub capacity: usize,
    pub terminator: TerminatorConfig,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            capacity: MAX_TRACKED_PROCESSES,
            terminator: TerminatorConfig::default(),
        }
    }
}

/// Host-local process inventory and lifecycle control
///
/// Each instance owns its own cache, terminator, sampler, and diagnostic
/// queue; instances are fully independent.
pub struct Warden {
    reporter: Arc<ErrorReporter>,
    cache: Arc<ProcessCache>,
    sampler: MetricsSampler,
    terminator: SafeTerminator,
}

impl Warden {
    /// Build against the host platform
    ///
    /// Fails when the counter subscriptions cannot be established, in
    /// which case metrics stay absent and no instance is produced.
    #[cfg(target_os = "linux")]
    pub fn new() -> Result<Self> {
        let platform = Arc::new(crate::platform::LinuxPlatform::new());
        Self::with_platform(
            platform.clone(),
            platform.clone(),
            platform,
            WardenConfig::default(),
        )
    }

    /// Build against explicit capability implementations
    pub fn with_platform(
        enumerator: Arc<dyn ProcessEnumerator>,
        access: Arc<dyn ProcessAccess>,
        counters: Arc<dyn CounterSource>,
        config: WardenConfig,
    ) -> Result<Self> {
        let reporter = Arc::new(ErrorReporter::new());
        let sampler = MetricsSampler::new(counters, Arc::clone(&reporter))?;
        let cache = Arc::new(ProcessCache::with_capacity(
            enumerator,
            access,
            Arc::clone(&reporter),
            config.capacity,
        ));
        let terminator = SafeTerminator::with_config(
            Arc::clone(&cache),
            Arc::clone(&reporter),
            config.terminator,
        );
        Ok(Self {
            reporter,
            cache,
            sampler,
            terminator,
        })
    }

    /// Replace the snapshot; returns the number of records cached
    pub fn refresh_processes(&self) -> Result<usize> {
        self.cache.refresh()
    }

    /// Copy the snapshot into `out`, truncating to what is available
    pub fn read_processes(&self, out: &mut [ProcessEntry]) -> usize {
        self.cache.read_into(out)
    }

    /// Number of records in the current snapshot
    pub fn process_count(&self) -> usize {
        self.cache.len()
    }

    /// Release every held handle and empty the snapshot
    pub fn clear_processes(&self) {
        self.cache.clear();
    }

    /// Safely terminate a set of ids; returns how many succeeded
    pub fn terminate(&self, pids: &[Pid]) -> usize {
        self.terminator.terminate(pids)
    }

    /// Current host-wide metrics
    pub fn system_metrics(&self) -> Result<SystemMetrics> {
        self.sampler.sample()
    }

    /// Oldest unread diagnostic, if any
    pub fn pop_error(&self) -> Option<ErrorRecord> {
        self.reporter.pop()
    }

    /// Unread diagnostics, bounded by the queue capacity
    pub fn error_count(&self) -> usize {
        self.reporter.len()
    }

    /// Drop all unread diagnostics
    pub fn clear_errors(&self) {
        self.reporter.clear();
    }

    /// Record a diagnostic on behalf of an outer surface, such as a
    /// binding layer enforcing its own argument contracts
    pub fn push_diagnostic(&self, kind: ErrorKind, origin: Provenance, message: impl Into<String>) {
        self.reporter.push(kind, origin, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{PlatformError, WardenError};
    use crate::platform::{
        CoreTimes, EnumeratedProcess, MemoryCounters, MockCounterSource, MockProcessAccess,
        MockProcessEnumerator,
    };
    use pretty_assertions::assert_eq;

    fn mock_counters() -> Arc<MockCounterSource> {
        let mut counters = MockCounterSource::new();
        counters.expect_num_cores().returning(|| Ok(4));
        counters.expect_memory().returning(|| {
            Ok(MemoryCounters {
                total: 8_000,
                used: 3_000,
            })
        });
        counters
            .expect_cpu_times()
            .returning(|| Ok(vec![CoreTimes::default(); 4]));
        Arc::new(counters)
    }

    fn mock_inventory(pids: Vec<Pid>) -> (Arc<MockProcessEnumerator>, Arc<MockProcessAccess>) {
        let mut enumerator = MockProcessEnumerator::new();
        enumerator.expect_enumerate().returning(move || {
            Ok(pids
                .iter()
                .map(|&pid| EnumeratedProcess {
                    pid,
                    name: format!("proc-{pid}"),
                    threads: 1,
                })
                .collect())
        });
        let mut access = MockProcessAccess::new();
        access
            .expect_open()
            .returning(|_| Err(PlatformError::AccessDenied));
        (Arc::new(enumerator), Arc::new(access))
    }

    #[test]
    fn test_initialize_fails_without_counters() {
        let (enumerator, access) = mock_inventory(vec![]);
        let mut counters = MockCounterSource::new();
        counters.expect_num_cores().returning(|| {
            Err(PlatformError::Syscall {
                op: "read stat",
                detail: "unavailable".into(),
            })
        });
        let result = Warden::with_platform(
            enumerator,
            access,
            Arc::new(counters),
            WardenConfig::default(),
        );
        assert!(matches!(result, Err(WardenError::CountersUnavailable(_))));
    }

    #[test]
    fn test_refresh_read_clear_cycle() {
        let (enumerator, access) = mock_inventory(vec![11, 22]);
        let warden =
            Warden::with_platform(enumerator, access, mock_counters(), WardenConfig::default())
                .unwrap();

        let count = warden.refresh_processes().unwrap();
        assert_eq!(count, 2);
        assert_eq!(warden.process_count(), 2);

        let mut out = vec![ProcessEntry::default(); count];
        assert_eq!(warden.read_processes(&mut out), 2);
        assert_eq!(out[0].id, 11);
        assert_eq!(out[1].name, "proc-22");

        warden.clear_processes();
        assert_eq!(warden.read_processes(&mut out), 0);
    }

    #[test]
    fn test_error_queue_surface() {
        let (enumerator, access) = mock_inventory(vec![1]);
        let warden =
            Warden::with_platform(enumerator, access, mock_counters(), WardenConfig::default())
                .unwrap();
        warden.refresh_processes().unwrap();

        // Unknown id termination leaves exactly one diagnostic behind
        assert_eq!(warden.terminate(&[404]), 0);
        assert_eq!(warden.error_count(), 1);
        assert!(warden.pop_error().is_some());
        assert!(warden.pop_error().is_none());

        warden.terminate(&[404]);
        warden.clear_errors();
        assert_eq!(warden.error_count(), 0);
    }

    #[test]
    fn test_system_metrics_surface() {
        let (enumerator, access) = mock_inventory(vec![]);
        let warden =
            Warden::with_platform(enumerator, access, mock_counters(), WardenConfig::default())
                .unwrap();
        let metrics = warden.system_metrics().unwrap();
        assert_eq!(metrics.num_cores, 4);
        assert_eq!(metrics.total_memory, 8_000);
        assert_eq!(metrics.used_memory, 3_000);
    }
}
