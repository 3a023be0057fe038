/*!
 * C ABI Surface
 *
 * Flat `pw_*` functions over a single process-wide [`Warden`] instance.
 * Pointer contracts live here and only here: a null output pointer is an
 * invalid-argument failure, recorded in the diagnostic queue where the
 * call has one to record into. The safe API underneath never sees raw
 * pointers.
 */

use crate::core::limits::{MAX_ERROR_MESSAGE, MAX_PROCESS_NAME};
use crate::inventory::ProcessEntry;
use crate::reporter::{ErrorKind, Provenance};
use crate::warden::Warden;
use std::sync::OnceLock;
use tracing::error;

pub const PW_OK: i32 = 0;
pub const PW_INVALID_ARGUMENT: i32 = 1;
pub const PW_INTERNAL: i32 = 2;

const ORIGIN_MAX: usize = 128;

static WARDEN: OnceLock<Warden> = OnceLock::new();

fn warden() -> Option<&'static Warden> {
    WARDEN.get()
}

/// One inventory record as exposed over the C ABI
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PwProcess {
    pub id: u32,
    pub num_threads: u32,
    pub working_set_size: u64,
    /// NUL-terminated, truncated to fit
    pub name: [u8; MAX_PROCESS_NAME],
}

impl PwProcess {
    pub const fn zeroed() -> Self {
        Self {
            id: 0,
            num_threads: 0,
            working_set_size: 0,
            name: [0; MAX_PROCESS_NAME],
        }
    }
}

/// Host-wide metrics as exposed over the C ABI
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PwSystemInfo {
    pub num_cores: u32,
    pub total_memory: u64,
    pub used_memory: u64,
    pub cpu_usage: f32,
}

impl PwSystemInfo {
    pub const fn zeroed() -> Self {
        Self {
            num_cores: 0,
            total_memory: 0,
            used_memory: 0,
            cpu_usage: 0.0,
        }
    }
}

/// One diagnostic record as exposed over the C ABI
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PwError {
    /// `PW_OK` when popped from an empty queue
    pub code: i32,
    /// NUL-terminated "module.routine" call site
    pub origin: [u8; ORIGIN_MAX],
    /// NUL-terminated, truncated to fit
    pub message: [u8; MAX_ERROR_MESSAGE],
}

impl PwError {
    pub const fn zeroed() -> Self {
        Self {
            code: PW_OK,
            origin: [0; ORIGIN_MAX],
            message: [0; MAX_ERROR_MESSAGE],
        }
    }
}

/// Copy `src` into `dst` as a NUL-terminated C string, truncating to fit
fn fill_cstr(dst: &mut [u8], src: &str) {
    let take = src.len().min(dst.len().saturating_sub(1));
    dst[..take].copy_from_slice(&src.as_bytes()[..take]);
    dst[take] = 0;
}

fn entry_to_c(entry: &ProcessEntry) -> PwProcess {
    let mut out = PwProcess::zeroed();
    out.id = entry.id;
    out.num_threads = entry.thread_count;
    out.working_set_size = entry.working_set_size;
    fill_cstr(&mut out.name, &entry.name);
    out
}

/// Build the process-wide instance. Idempotent; later calls are no-ops.
///
/// Returns `PW_OK`, or `PW_INTERNAL` when the host counter
/// subscriptions cannot be established.
#[no_mangle]
pub extern "C" fn pw_initialize() -> i32 {
    crate::init_tracing();
    if WARDEN.get().is_some() {
        return PW_OK;
    }
    match Warden::new() {
        Ok(instance) => {
            // A racing initializer may have won; either way one is in place
            let _ = WARDEN.set(instance);
            PW_OK
        }
        Err(err) => {
            error!(error = %err, "initialization failed");
            PW_INTERNAL
        }
    }
}

/// Rebuild the snapshot; returns the record count, or -1 on failure
#[no_mangle]
pub extern "C" fn pw_refresh_process_list() -> i32 {
    let Some(warden) = warden() else { return -1 };
    match warden.refresh_processes() {
        Ok(count) => count as i32,
        Err(_) => -1,
    }
}

/// Copy up to `capacity` snapshot records into `out`
///
/// Returns the number copied, or -1 when `out` is null with a nonzero
/// `capacity`.
///
/// # Safety
/// `out` must point to at least `capacity` writable `PwProcess` slots.
#[no_mangle]
pub unsafe extern "C" fn pw_get_process_list(out: *mut PwProcess, capacity: u32) -> i32 {
    let Some(warden) = warden() else { return -1 };
    if capacity == 0 {
        return 0;
    }
    if out.is_null() {
        warden.push_diagnostic(
            ErrorKind::InvalidArgument,
            Provenance::new("ffi", "pw_get_process_list"),
            "null output buffer",
        );
        return -1;
    }
    // Allocate for what is actually readable, not the caller's capacity
    let want = (capacity as usize).min(warden.process_count());
    let mut entries = vec![ProcessEntry::default(); want];
    let copied = warden.read_processes(&mut entries);
    for (i, entry) in entries[..copied].iter().enumerate() {
        unsafe { out.add(i).write(entry_to_c(entry)) };
    }
    copied as i32
}

/// Release all held handles and empty the snapshot
#[no_mangle]
pub extern "C" fn pw_clear_process_list() {
    if let Some(warden) = warden() {
        warden.clear_processes();
    }
}

/// Safely terminate `count` ids read from `ids`
///
/// Returns how many terminated, or -1 when `ids` is null with a nonzero
/// `count`.
///
/// # Safety
/// `ids` must point to at least `count` readable `u32` values.
#[no_mangle]
pub unsafe extern "C" fn pw_kill_processes(ids: *const u32, count: u32) -> i32 {
    let Some(warden) = warden() else { return -1 };
    if count == 0 {
        return 0;
    }
    if ids.is_null() {
        warden.push_diagnostic(
            ErrorKind::InvalidArgument,
            Provenance::new("ffi", "pw_kill_processes"),
            "null id buffer",
        );
        return -1;
    }
    let pids = unsafe { std::slice::from_raw_parts(ids, count as usize) };
    warden.terminate(pids) as i32
}

/// Fill `out` with current host metrics
///
/// A null `out` fails before any sampling happens.
///
/// # Safety
/// `out` must be null or point to a writable `PwSystemInfo`.
#[no_mangle]
pub unsafe extern "C" fn pw_get_system_info(out: *mut PwSystemInfo) -> i32 {
    let Some(warden) = warden() else {
        return PW_INTERNAL;
    };
    if out.is_null() {
        warden.push_diagnostic(
            ErrorKind::InvalidArgument,
            Provenance::new("ffi", "pw_get_system_info"),
            "null output pointer",
        );
        return PW_INVALID_ARGUMENT;
    }
    match warden.system_metrics() {
        Ok(metrics) => {
            unsafe {
                out.write(PwSystemInfo {
                    num_cores: metrics.num_cores,
                    total_memory: metrics.total_memory,
                    used_memory: metrics.used_memory,
                    cpu_usage: metrics.cpu_usage,
                })
            };
            PW_OK
        }
        Err(_) => PW_INTERNAL,
    }
}

/// Pop the oldest unread diagnostic into `out`
///
/// An empty queue is not an error: `out` is zeroed and `PW_OK` is
/// returned. A null `out` returns `PW_INVALID_ARGUMENT` without touching
/// the queue.
///
/// # Safety
/// `out` must be null or point to a writable `PwError`.
#[no_mangle]
pub unsafe extern "C" fn pw_get_error(out: *mut PwError) -> i32 {
    let Some(warden) = warden() else {
        return PW_INTERNAL;
    };
    if out.is_null() {
        return PW_INVALID_ARGUMENT;
    }
    let mut record = PwError::zeroed();
    if let Some(popped) = warden.pop_error() {
        record.code = popped.kind as i32;
        fill_cstr(
            &mut record.origin,
            &format!("{}.{}", popped.origin.module, popped.origin.routine),
        );
        fill_cstr(&mut record.message, &popped.message);
    }
    unsafe { out.write(record) };
    PW_OK
}

/// Number of unread diagnostics
#[no_mangle]
pub extern "C" fn pw_get_error_count() -> u32 {
    warden().map(|w| w.error_count() as u32).unwrap_or(0)
}

/// Drop all unread diagnostics
#[no_mangle]
pub extern "C" fn pw_clear_errors() {
    if let Some(warden) = warden() {
        warden.clear_errors();
    }
}
