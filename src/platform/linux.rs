/*!
 * Linux Platform Backend
 *
 * procfs-based enumeration and counters, pidfd-based process handles.
 * The pidfd is the handle resource: opened with `pidfd_open(2)`,
 * duplicated for termination, probed and waited on with `poll(2)`
 * (a pidfd becomes readable once the process exits), and the clean exit
 * path is a SIGTERM delivered through `pidfd_send_signal(2)` so the
 * target unwinds through its own handlers instead of being killed
 * outright.
 */

use super::{
    CoreTimes, CounterSource, EnumeratedProcess, ExitEntry, ExitHandle, ExitProbe, MemoryCounters,
    ProcessAccess, ProcessEnumerator, ProcessHandle,
};
use crate::core::errors::{platform_message, PlatformError};
use crate::core::types::{ExitCode, Pid};
use nix::libc;
use nix::sys::signal::Signal;
use std::fs;
use std::io;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Host backend implementing all platform capabilities
#[derive(Debug, Clone)]
pub struct LinuxPlatform {
    proc_root: PathBuf,
}

impl LinuxPlatform {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }

    /// Point the backend at an alternate procfs tree (fixtures in tests)
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_os_error(op: &'static str, err: io::Error) -> PlatformError {
    match err.raw_os_error() {
        Some(libc::EPERM) | Some(libc::EACCES) => PlatformError::AccessDenied,
        Some(libc::ESRCH) => PlatformError::ProcessGone,
        _ if err.kind() == io::ErrorKind::NotFound => PlatformError::ProcessGone,
        _ => PlatformError::syscall(op, &err),
    }
}

impl ProcessEnumerator for LinuxPlatform {
    fn enumerate(&self) -> Result<Vec<EnumeratedProcess>, PlatformError> {
        let dir = fs::read_dir(&self.proc_root)
            .map_err(|e| PlatformError::EnumerationUnavailable(platform_message(&e)))?;

        let mut out = Vec::new();
        for entry in dir.flatten() {
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<Pid>().ok())
            else {
                continue;
            };
            // Processes may vanish between readdir and the stat read
            let Ok(stat) = fs::read_to_string(self.proc_root.join(pid.to_string()).join("stat"))
            else {
                continue;
            };
            match parse_stat(&stat) {
                Some((name, threads)) => out.push(EnumeratedProcess { pid, name, threads }),
                None => debug!(pid, "malformed stat entry skipped"),
            }
        }
        Ok(out)
    }
}

/// Extract the command name and thread count from a `/proc/[pid]/stat` line
///
/// The command appears parenthesized and may itself contain spaces and
/// parentheses, so it is delimited by the first `(` and the *last* `)`.
fn parse_stat(content: &str) -> Option<(String, u32)> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    if close < open {
        return None;
    }
    let name = content[open + 1..close].to_string();
    // Fields after the command: state is field 3 of the full line, so
    // num_threads (field 20) sits at offset 17 in the remainder
    let threads = content[close + 1..]
        .split_whitespace()
        .nth(17)?
        .parse()
        .ok()?;
    Some((name, threads))
}

impl ProcessAccess for LinuxPlatform {
    fn open(&self, pid: Pid) -> Result<Box<dyn ProcessHandle>, PlatformError> {
        let fd = pidfd_open(pid)?;
        Ok(Box::new(LinuxProcessHandle {
            pid,
            fd,
            proc_root: self.proc_root.clone(),
        }))
    }
}

/// Owned pidfd, closed on drop
#[derive(Debug)]
struct PidFd(RawFd);

impl PidFd {
    fn raw(&self) -> RawFd {
        self.0
    }
}

impl Drop for PidFd {
    fn drop(&mut self) {
        // SAFETY: the fd is owned by this wrapper and closed exactly once
        if unsafe { libc::close(self.0) } != 0 {
            warn!(
                fd = self.0,
                error = %io::Error::last_os_error(),
                "pidfd close failed"
            );
        }
    }
}

fn pidfd_open(pid: Pid) -> Result<PidFd, PlatformError> {
    // SAFETY: plain syscall, no pointers involved
    let ret = unsafe { libc::syscall(libc::SYS_pidfd_open, pid as libc::pid_t, 0u32) };
    if ret < 0 {
        return Err(classify_os_error("pidfd_open", io::Error::last_os_error()));
    }
    Ok(PidFd(ret as RawFd))
}

fn pidfd_duplicate(fd: &PidFd) -> Result<PidFd, PlatformError> {
    // SAFETY: duplicating an fd we own
    let ret = unsafe { libc::fcntl(fd.raw(), libc::F_DUPFD_CLOEXEC, 0) };
    if ret < 0 {
        return Err(classify_os_error("dup", io::Error::last_os_error()));
    }
    Ok(PidFd(ret))
}

/// Poll the pidfd; it reads ready once the process has exited
///
/// Returns `Some(true)` when exited, `Some(false)` on timeout, and retries
/// interrupted waits.
fn pidfd_poll(fd: &PidFd, timeout_ms: libc::c_int) -> Result<bool, PlatformError> {
    let mut pollfd = libc::pollfd {
        fd: fd.raw(),
        events: libc::POLLIN,
        revents: 0,
    };
    loop {
        // SAFETY: pollfd outlives the call and the array length is 1
        let ret = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        if ret > 0 {
            return Ok(true);
        }
        if ret == 0 {
            return Ok(false);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(classify_os_error("poll", err));
        }
    }
}

struct LinuxProcessHandle {
    pid: Pid,
    fd: PidFd,
    proc_root: PathBuf,
}

impl ProcessHandle for LinuxProcessHandle {
    fn working_set_size(&self) -> Result<u64, PlatformError> {
        let status = fs::read_to_string(
            self.proc_root.join(self.pid.to_string()).join("status"),
        )
        .map_err(|e| classify_os_error("read status", e))?;
        Ok(parse_vm_rss(&status))
    }

    fn duplicate_for_exit(&self) -> Result<Box<dyn ExitHandle>, PlatformError> {
        let fd = pidfd_duplicate(&self.fd)?;
        Ok(Box::new(LinuxExitHandle { pid: self.pid, fd }))
    }
}

/// Resident set size in bytes from `/proc/[pid]/status`, 0 if absent
fn parse_vm_rss(status: &str) -> u64 {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
        .unwrap_or(0)
}

struct LinuxExitHandle {
    pid: Pid,
    fd: PidFd,
}

impl ExitHandle for LinuxExitHandle {
    fn probe(&self) -> Result<ExitProbe, PlatformError> {
        match pidfd_poll(&self.fd, 0)? {
            true => Ok(ExitProbe::Exited),
            false => Ok(ExitProbe::Active),
        }
    }

    fn resolve_exit_entry(&self) -> Result<ExitEntry, PlatformError> {
        // The clean exit path on this platform is signal delivery; the
        // entry point is the signal's disposition inside the target
        Ok(ExitEntry::new(Signal::SIGTERM as i32 as u64))
    }

    fn request_exit(&self, entry: &ExitEntry, code: ExitCode) -> Result<(), PlatformError> {
        // The requested exit code cannot ride along a signal; the target's
        // own handlers decide the status it exits with
        let _ = code;
        let sig = entry.raw() as libc::c_int;
        // SAFETY: null siginfo lets the kernel fill in SI_USER semantics
        let ret = unsafe {
            libc::syscall(
                libc::SYS_pidfd_send_signal,
                self.fd.raw(),
                sig,
                std::ptr::null::<libc::siginfo_t>(),
                0u32,
            )
        };
        if ret < 0 {
            return Err(classify_os_error(
                "pidfd_send_signal",
                io::Error::last_os_error(),
            ));
        }
        debug!(pid = self.pid, signal = sig, "exit requested");
        Ok(())
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<(), PlatformError> {
        let timeout_ms = match timeout {
            Some(t) => libc::c_int::try_from(t.as_millis()).unwrap_or(libc::c_int::MAX),
            None => -1,
        };
        match pidfd_poll(&self.fd, timeout_ms)? {
            true => Ok(()),
            false => Err(PlatformError::TimedOut),
        }
    }
}

impl CounterSource for LinuxPlatform {
    fn num_cores(&self) -> Result<u32, PlatformError> {
        Ok(self.cpu_times()?.len() as u32)
    }

    fn memory(&self) -> Result<MemoryCounters, PlatformError> {
        let meminfo = fs::read_to_string(self.proc_root.join("meminfo"))
            .map_err(|e| PlatformError::syscall("read meminfo", &e))?;
        parse_meminfo(&meminfo)
    }

    fn cpu_times(&self) -> Result<Vec<CoreTimes>, PlatformError> {
        let stat = fs::read_to_string(self.proc_root.join("stat"))
            .map_err(|e| PlatformError::syscall("read stat", &e))?;
        let cores: Vec<CoreTimes> = stat
            .lines()
            .filter(|line| line.starts_with("cpu") && !line.starts_with("cpu "))
            .filter_map(parse_cpu_line)
            .collect();
        if cores.is_empty() {
            return Err(PlatformError::Syscall {
                op: "read stat",
                detail: "no per-core counters present".into(),
            });
        }
        Ok(cores)
    }
}

/// Busy/total ticks from one `cpuN` line of `/proc/stat`
///
/// Fields: user nice system idle iowait irq softirq steal. Idle and
/// iowait count as not-busy.
fn parse_cpu_line(line: &str) -> Option<CoreTimes> {
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(|f| f.parse().unwrap_or(0))
        .collect();
    if fields.len() < 5 {
        return None;
    }
    let total: u64 = fields.iter().sum();
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CoreTimes {
        busy: total - idle,
        total,
    })
}

fn parse_meminfo(meminfo: &str) -> Result<MemoryCounters, PlatformError> {
    let field = |key: &str| -> Option<u64> {
        meminfo
            .lines()
            .find_map(|line| line.strip_prefix(key))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|kb| kb.parse::<u64>().ok())
            .map(|kb| kb * 1024)
    };
    let total = field("MemTotal:").ok_or(PlatformError::Syscall {
        op: "read meminfo",
        detail: "MemTotal missing".into(),
    })?;
    let available = field("MemAvailable:").or_else(|| field("MemFree:")).unwrap_or(0);
    Ok(MemoryCounters {
        total,
        used: total.saturating_sub(available),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_stat_plain() {
        let line = "1234 (bash) S 1 1234 1234 0 -1 4194304 1000 0 0 0 10 5 0 0 20 0 3 0 100 0 0";
        let (name, threads) = parse_stat(line).unwrap();
        assert_eq!(name, "bash");
        assert_eq!(threads, 3);
    }

    #[test]
    fn test_parse_stat_name_with_spaces_and_parens() {
        let line =
            "42 (tmux: server (1)) S 1 42 42 0 -1 4194304 1000 0 0 0 10 5 0 0 20 0 7 0 100 0 0";
        let (name, threads) = parse_stat(line).unwrap();
        assert_eq!(name, "tmux: server (1)");
        assert_eq!(threads, 7);
    }

    #[test]
    fn test_parse_stat_malformed() {
        assert!(parse_stat("not a stat line").is_none());
        assert!(parse_stat("1 (short) S 1").is_none());
    }

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tbash\nVmRSS:\t    5120 kB\nThreads:\t1\n";
        assert_eq!(parse_vm_rss(status), 5120 * 1024);
        assert_eq!(parse_vm_rss("Name:\tkthreadd\n"), 0);
    }

    #[test]
    fn test_parse_cpu_line() {
        let times = parse_cpu_line("cpu0 100 0 50 800 20 5 5 0 0 0").unwrap();
        assert_eq!(times.total, 980);
        assert_eq!(times.busy, 160);
    }

    #[test]
    fn test_parse_meminfo() {
        let meminfo = "MemTotal:       16000 kB\nMemFree:         2000 kB\nMemAvailable:    8000 kB\n";
        let mem = parse_meminfo(meminfo).unwrap();
        assert_eq!(mem.total, 16000 * 1024);
        assert_eq!(mem.used, 8000 * 1024);
    }

    #[test]
    fn test_parse_meminfo_without_available() {
        let meminfo = "MemTotal:       16000 kB\nMemFree:         2000 kB\n";
        let mem = parse_meminfo(meminfo).unwrap();
        assert_eq!(mem.used, 14000 * 1024);
    }

    #[test]
    fn test_enumerate_fixture_tree() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("17")).unwrap();
        fs::write(
            root.path().join("17").join("stat"),
            "17 (fixture) S 1 17 17 0 -1 0 0 0 0 0 0 0 0 0 20 0 2 0 100 0 0",
        )
        .unwrap();
        fs::create_dir(root.path().join("irq")).unwrap();

        let platform = LinuxPlatform::with_proc_root(root.path());
        let procs = platform.enumerate().unwrap();
        assert_eq!(
            procs,
            vec![EnumeratedProcess {
                pid: 17,
                name: "fixture".into(),
                threads: 2,
            }]
        );
    }

    #[test]
    fn test_enumerate_missing_root_is_hard_failure() {
        let platform = LinuxPlatform::with_proc_root("/nonexistent/proc/root");
        assert!(matches!(
            platform.enumerate(),
            Err(PlatformError::EnumerationUnavailable(_))
        ));
    }

    #[test]
    fn test_open_self_and_sample_working_set() {
        let platform = LinuxPlatform::new();
        let handle = platform.open(std::process::id()).unwrap();
        assert!(handle.working_set_size().unwrap() > 0);
    }

    #[test]
    fn test_probe_self_reports_active() {
        let platform = LinuxPlatform::new();
        let handle = platform.open(std::process::id()).unwrap();
        let exit = handle.duplicate_for_exit().unwrap();
        assert_eq!(exit.probe().unwrap(), ExitProbe::Active);
    }

    #[test]
    fn test_counters_on_live_host() {
        let platform = LinuxPlatform::new();
        assert!(platform.num_cores().unwrap() >= 1);
        let mem = platform.memory().unwrap();
        assert!(mem.total > 0 && mem.used <= mem.total);
    }
}
