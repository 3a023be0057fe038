/*!
 * Inventory Records
 * Internal handle-owning records and the caller-visible view
 */

use crate::core::limits::MAX_PROCESS_NAME;
use crate::core::types::Pid;
use crate::platform::{EnumeratedProcess, ProcessHandle};
use serde::{Deserialize, Serialize};

/// One live process at snapshot time
///
/// Owns the handle resource for its process. A record without a handle is
/// a valid terminal state (access was denied, common for protected system
/// processes); its metrics stay zero. Records are created only by a
/// refresh and never mutated afterwards, except to give up the handle
/// once it is released.
pub(crate) struct ProcessRecord {
    pub id: Pid,
    pub name: String,
    pub thread_count: u32,
    pub working_set_size: u64,
    pub handle: Option<Box<dyn ProcessHandle>>,
}

impl ProcessRecord {
    pub fn new(
        entry: EnumeratedProcess,
        handle: Option<Box<dyn ProcessHandle>>,
        working_set_size: u64,
    ) -> Self {
        Self {
            id: entry.pid,
            name: bounded_name(entry.name),
            thread_count: entry.threads,
            working_set_size,
            handle,
        }
    }

    pub fn entry(&self) -> ProcessEntry {
        ProcessEntry {
            id: self.id,
            name: self.name.clone(),
            thread_count: self.thread_count,
            working_set_size: self.working_set_size,
        }
    }
}

/// Caller-visible copy of one inventory record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessEntry {
    pub id: Pid,
    pub name: String,
    pub thread_count: u32,
    pub working_set_size: u64,
}

/// Truncate to `MAX_PROCESS_NAME` bytes on a char boundary
fn bounded_name(name: String) -> String {
    if name.len() <= MAX_PROCESS_NAME {
        return name;
    }
    let mut end = MAX_PROCESS_NAME;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let mut name = name;
    name.truncate(end);
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn enumerated(name: &str) -> EnumeratedProcess {
        EnumeratedProcess {
            pid: 7,
            name: name.to_string(),
            threads: 2,
        }
    }

    #[test]
    fn test_name_within_bound_kept() {
        let record = ProcessRecord::new(enumerated("bash"), None, 0);
        assert_eq!(record.name, "bash");
    }

    #[test]
    fn test_name_truncated_at_bound() {
        let long = "n".repeat(MAX_PROCESS_NAME + 40);
        let record = ProcessRecord::new(enumerated(&long), None, 0);
        assert_eq!(record.name.len(), MAX_PROCESS_NAME);
    }

    #[test]
    fn test_handleless_record_is_valid_with_zero_metrics() {
        let record = ProcessRecord::new(enumerated("protected"), None, 0);
        assert!(record.handle.is_none());
        assert_eq!(record.working_set_size, 0);
    }

    #[test]
    fn test_entry_serialization_round_trip() {
        let entry = ProcessEntry {
            id: 42,
            name: "bash".into(),
            thread_count: 3,
            working_set_size: 4096,
        };
        let json = serde_json::to_string(&entry).unwrap();
        let back: ProcessEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, back);
    }
}
