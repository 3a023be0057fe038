/*!
 * Safe Terminator
 *
 * Terminates cached processes without a one-shot forced kill. Per id the
 * protocol is: duplicate the cached handle with escalated rights, probe
 * the exit status, resolve the target's clean exit entry point, inject
 * an exit request, and block until the target has fully exited. Going
 * through the target's own exit path avoids killing it mid-critical-
 * section and avoids racing a stale handle.
 */

use crate::core::types::{ExitCode, Pid};
use crate::inventory::{HandleLookup, ProcessCache};
use crate::reporter::{ErrorKind, ErrorReporter, Provenance};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Termination policy knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminatorConfig {
    /// Exit code handed to the injected exit request
    pub exit_code: ExitCode,
    /// How long to block for the target to exit
    ///
    /// `None` waits indefinitely, which is the long-standing contract of
    /// this operation. A bounded wait is opt-in; its expiry aborts the id
    /// with a diagnostic and does not fall back to a forced kill.
    pub wait_timeout: Option<Duration>,
}

impl Default for TerminatorConfig {
    fn default() -> Self {
        Self {
            exit_code: 0,
            wait_timeout: None,
        }
    }
}

/// Consumes cache entries to drive the termination protocol
pub struct SafeTerminator {
    cache: Arc<ProcessCache>,
    reporter: Arc<ErrorReporter>,
    config: TerminatorConfig,
}

impl SafeTerminator {
    pub fn new(cache: Arc<ProcessCache>, reporter: Arc<ErrorReporter>) -> Self {
        Self::with_config(cache, reporter, TerminatorConfig::default())
    }

    pub fn with_config(
        cache: Arc<ProcessCache>,
        reporter: Arc<ErrorReporter>,
        config: TerminatorConfig,
    ) -> Self {
        Self {
            cache,
            reporter,
            config,
        }
    }

    /// Attempt to terminate every id in the set, each fully independently
    ///
    /// Duplicate ids are attempted separately, deliberately without
    /// deduplication. Returns the number of ids for which termination
    /// (including "already exited") succeeded; per-id failures are pushed
    /// to the diagnostic queue and never abort the batch.
    pub fn terminate(&self, pids: &[Pid]) -> usize {
        let succeeded = pids
            .iter()
            .filter(|&&pid| self.terminate_one(pid))
            .count();
        info!(requested = pids.len(), succeeded, "termination batch done");
        succeeded
    }

    fn terminate_one(&self, pid: Pid) -> bool {
        use crate::platform::ExitProbe;
        let origin = Provenance::new(module_path!(), "terminate");

        // Duplication happens under the cache lock; the blocking wait
        // below runs on the duplicated handle with the lock released
        let exit = match self.cache.duplicate_for_exit(pid) {
            HandleLookup::Missing => {
                self.reporter.push(
                    ErrorKind::InvalidArgument,
                    origin,
                    format!("process {pid} not found in current snapshot"),
                );
                return false;
            }
            HandleLookup::Failed(err) => {
                self.reporter.push(
                    ErrorKind::Internal,
                    origin,
                    format!("handle duplication for {pid} failed: {err}"),
                );
                return false;
            }
            HandleLookup::Ready(exit) => exit,
        };

        // The duplicated handle is dropped on every path below
        match exit.probe() {
            Ok(ExitProbe::Exited) => {
                // Terminating an already-dead process is a no-op success
                debug!(pid, "target already exited");
                self.cache.release_handle(pid);
                return true;
            }
            Ok(ExitProbe::Active) => {}
            Err(err) => {
                self.reporter.push(
                    ErrorKind::Internal,
                    origin,
                    format!("exit-status query for {pid} failed: {err}"),
                );
                return false;
            }
        }

        let entry = match exit.resolve_exit_entry() {
            Ok(entry) => entry,
            Err(err) => {
                self.reporter.push(
                    ErrorKind::Internal,
                    origin,
                    format!("exit entry resolution for {pid} failed: {err}"),
                );
                return false;
            }
        };

        if let Err(err) = exit.request_exit(&entry, self.config.exit_code) {
            self.reporter.push(
                ErrorKind::Internal,
                origin,
                format!("exit injection for {pid} failed: {err}"),
            );
            return false;
        }

        if let Err(err) = exit.wait(self.config.wait_timeout) {
            self.reporter.push(
                ErrorKind::Internal,
                origin,
                format!("wait for {pid} failed: {err}"),
            );
            return false;
        }

        info!(pid, "process terminated");
        self.cache.release_handle(pid);
        true
    }
}
