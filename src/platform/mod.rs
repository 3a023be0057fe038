/*!
 * Platform Capabilities
 *
 * Trait seams over the raw OS primitives: process enumeration, per-process
 * handle resources, and the system performance counters. The inventory,
 * terminator, and sampler are written entirely against these traits; the
 * host backend lives in `linux`, tests script the mocks.
 */

use crate::core::errors::PlatformError;
use crate::core::types::{ExitCode, Pid};
use std::time::Duration;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "linux")]
pub use linux::LinuxPlatform;

#[cfg(test)]
use mockall::automock;

/// One process as yielded by the enumeration capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumeratedProcess {
    pub pid: Pid,
    pub name: String,
    pub threads: u32,
}

/// Enumerate live processes, yielding id/thread-count/name tuples
///
/// Only a failure to start enumeration itself is an error; individual
/// processes vanishing mid-scan are silently skipped.
#[cfg_attr(test, automock)]
pub trait ProcessEnumerator: Send + Sync {
    fn enumerate(&self) -> Result<Vec<EnumeratedProcess>, PlatformError>;
}

/// Open handle resources to live processes
///
/// Opens with the minimal rights needed for memory reads and later
/// duplication. Denial is an expected outcome for protected system
/// processes and yields a handle-less inventory record, not an error.
#[cfg_attr(test, automock)]
pub trait ProcessAccess: Send + Sync {
    fn open(&self, pid: Pid) -> Result<Box<dyn ProcessHandle>, PlatformError>;
}

/// An exclusively-owned handle to a live process
///
/// The underlying resource is released on drop; release is not skippable
/// by any error path.
#[cfg_attr(test, automock)]
pub trait ProcessHandle: Send {
    /// Current working-set size in bytes
    fn working_set_size(&self) -> Result<u64, PlatformError>;

    /// Duplicate the handle with the escalated rights termination needs
    fn duplicate_for_exit(&self) -> Result<Box<dyn ExitHandle>, PlatformError>;
}

/// Result of probing a handle's exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitProbe {
    Active,
    Exited,
}

/// Resolved address of the target's clean exit entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitEntry(u64);

impl ExitEntry {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A duplicated handle carrying the rights to drive safe termination
///
/// Released on drop, on every protocol path including early aborts.
#[cfg_attr(test, automock)]
pub trait ExitHandle: Send {
    /// Query whether the target has already exited
    fn probe(&self) -> Result<ExitProbe, PlatformError>;

    /// Resolve the process-exit entry point inside the target
    fn resolve_exit_entry(&self) -> Result<ExitEntry, PlatformError>;

    /// Inject an execution unit at the entry point with the exit code as
    /// its argument
    fn request_exit(&self, entry: &ExitEntry, code: ExitCode) -> Result<(), PlatformError>;

    /// Block until the target has fully exited; `None` waits indefinitely
    fn wait(&self, timeout: Option<Duration>) -> Result<(), PlatformError>;
}

/// Host-wide memory counters in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryCounters {
    pub total: u64,
    pub used: u64,
}

/// Cumulative busy/total time of one core, in platform ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoreTimes {
    pub busy: u64,
    pub total: u64,
}

/// Sample instantaneous and counted host metrics
///
/// Subscriptions are established when the sampler is built and torn down
/// together with it; individual values are read per query.
#[cfg_attr(test, automock)]
pub trait CounterSource: Send + Sync {
    fn num_cores(&self) -> Result<u32, PlatformError>;
    fn memory(&self) -> Result<MemoryCounters, PlatformError>;
    fn cpu_times(&self) -> Result<Vec<CoreTimes>, PlatformError>;
}
