/*!
 * Process Cache
 * Owns the current inventory snapshot; refresh / read / clear operations
 */

use super::record::{ProcessEntry, ProcessRecord};
use crate::core::errors::{PlatformError, WardenError};
use crate::core::limits::MAX_TRACKED_PROCESSES;
use crate::core::types::{Pid, Result};
use crate::platform::{ExitHandle, ProcessAccess, ProcessEnumerator};
use crate::reporter::{ErrorKind, ErrorReporter, Provenance};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Outcome of looking up and duplicating a cached handle for termination
pub(crate) enum HandleLookup {
    /// The id is not in the current snapshot
    Missing,
    /// The record exists but no duplicated handle could be produced
    Failed(PlatformError),
    /// Duplicated handle, ready to drive the termination protocol
    Ready(Box<dyn ExitHandle>),
}

/// Snapshot-owning process inventory
///
/// Exactly one snapshot is live at a time; a refresh replaces it whole.
/// Each record owns its handle resource, released on eviction or once
/// termination succeeds. The interior lock covers in-memory bookkeeping
/// and the refresh itself, never a termination wait.
pub struct ProcessCache {
    enumerator: Arc<dyn ProcessEnumerator>,
    access: Arc<dyn ProcessAccess>,
    reporter: Arc<ErrorReporter>,
    capacity: usize,
    snapshot: Mutex<Vec<ProcessRecord>>,
}

impl ProcessCache {
    pub fn new(
        enumerator: Arc<dyn ProcessEnumerator>,
        access: Arc<dyn ProcessAccess>,
        reporter: Arc<ErrorReporter>,
    ) -> Self {
        Self::with_capacity(enumerator, access, reporter, MAX_TRACKED_PROCESSES)
    }

    /// Cache with a non-default snapshot capacity
    ///
    /// The policy default is `MAX_TRACKED_PROCESSES`; smaller instances
    /// exist for tests that exercise the truncation path.
    pub fn with_capacity(
        enumerator: Arc<dyn ProcessEnumerator>,
        access: Arc<dyn ProcessAccess>,
        reporter: Arc<ErrorReporter>,
        capacity: usize,
    ) -> Self {
        Self {
            enumerator,
            access,
            reporter,
            capacity,
            snapshot: Mutex::new(Vec::new()),
        }
    }

    /// Discard the current snapshot and acquire a fresh one
    ///
    /// Returns the number of records accepted. Per-process open or
    /// sampling failures degrade single records; hitting the capacity
    /// bound truncates with a diagnostic but still succeeds. Only a
    /// failure to start enumeration is a hard failure, and it leaves the
    /// snapshot empty.
    pub fn refresh(&self) -> Result<usize> {
        let origin = Provenance::new(module_path!(), "refresh");
        let mut snapshot = self.snapshot.lock();
        snapshot.clear();

        let enumerated = match self.enumerator.enumerate() {
            Ok(entries) => entries,
            Err(err) => {
                self.reporter.push(
                    ErrorKind::Internal,
                    origin,
                    format!("failed to start enumeration: {err}"),
                );
                return Err(WardenError::Enumeration(err));
            }
        };

        let mut truncated = false;
        for entry in enumerated {
            if entry.pid == 0 {
                continue;
            }
            if snapshot.len() == self.capacity {
                truncated = true;
                break;
            }
            let handle = match self.access.open(entry.pid) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    // Expected for access-restricted processes
                    debug!(pid = entry.pid, error = %err, "handle-less record");
                    None
                }
            };
            let working_set_size = handle
                .as_ref()
                .map(|h| {
                    h.working_set_size().unwrap_or_else(|err| {
                        debug!(pid = entry.pid, error = %err, "working set unavailable");
                        0
                    })
                })
                .unwrap_or(0);
            snapshot.push(ProcessRecord::new(entry, handle, working_set_size));
        }

        if truncated {
            self.reporter.push(
                ErrorKind::Internal,
                origin,
                format!("snapshot truncated at capacity {}", self.capacity),
            );
        }
        debug!(count = snapshot.len(), truncated, "snapshot refreshed");
        Ok(snapshot.len())
    }

    /// Copy up to `out.len()` records into `out`, in snapshot order
    ///
    /// Never errors; returns the number copied. Snapshot order is the
    /// order enumeration produced, with no stability across refreshes.
    pub fn read_into(&self, out: &mut [ProcessEntry]) -> usize {
        let snapshot = self.snapshot.lock();
        let count = out.len().min(snapshot.len());
        for (slot, record) in out.iter_mut().zip(snapshot.iter()) {
            *slot = record.entry();
        }
        count
    }

    /// Number of records in the current snapshot
    pub fn len(&self) -> usize {
        self.snapshot.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every held handle and reset to empty; idempotent
    pub fn clear(&self) {
        self.snapshot.lock().clear();
    }

    /// Duplicate the cached handle for `pid` with termination rights
    ///
    /// Linear scan of the snapshot under the cache lock; the returned
    /// handle is independent of the snapshot, so the caller's blocking
    /// wait happens with the lock long released.
    pub(crate) fn duplicate_for_exit(&self, pid: Pid) -> HandleLookup {
        let snapshot = self.snapshot.lock();
        let Some(record) = snapshot.iter().find(|r| r.id == pid) else {
            return HandleLookup::Missing;
        };
        match &record.handle {
            None => HandleLookup::Failed(PlatformError::AccessDenied),
            Some(handle) => match handle.duplicate_for_exit() {
                Ok(duplicated) => HandleLookup::Ready(duplicated),
                Err(err) => HandleLookup::Failed(err),
            },
        }
    }

    /// Give up the handle owned by `pid`'s record once it is released
    ///
    /// Records are otherwise immutable after creation.
    pub(crate) fn release_handle(&self, pid: Pid) {
        let mut snapshot = self.snapshot.lock();
        if let Some(record) = snapshot.iter_mut().find(|r| r.id == pid) {
            record.handle = None;
        }
    }
}
