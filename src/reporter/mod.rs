/*!
 * Diagnostic Reporter
 *
 * Process-wide bounded ring queue of diagnostic records. Every component
 * pushes recoverable failures here with provenance; the caller drains
 * them on demand. Push never blocks and never fails: when the ring is
 * full the oldest unread record is overwritten. That lossy-under-pressure
 * policy is deliberate and documented, not a defect.
 */

use crate::core::limits::{ERROR_QUEUE_CAPACITY, MAX_ERROR_MESSAGE};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

/// Diagnostic record kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A caller-supplied id or pointer was unusable
    InvalidArgument = 1,
    /// An underlying OS capability failed unexpectedly
    Internal = 2,
}

/// Originating call site of a record, for post-hoc debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub module: &'static str,
    pub routine: &'static str,
}

impl Provenance {
    pub const fn new(module: &'static str, routine: &'static str) -> Self {
        Self { module, routine }
    }
}

/// One diagnostic event, immutable once pushed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub origin: Provenance,
}

/// Fixed-capacity overwrite-on-full FIFO of diagnostic records
pub struct ErrorReporter {
    state: Mutex<Ring>,
}

struct Ring {
    slots: Box<[Option<ErrorRecord>]>,
    head: usize,
    tail: usize,
    len: usize,
    overwritten: u64,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Ring {
                slots: (0..ERROR_QUEUE_CAPACITY).map(|_| None).collect(),
                head: 0,
                tail: 0,
                len: 0,
                overwritten: 0,
            }),
        }
    }

    /// Push a record; on a full queue the oldest unread record is lost
    ///
    /// The message is truncated to `MAX_ERROR_MESSAGE` bytes rather than
    /// rejected. Also emitted as a tracing event so records are observable
    /// live even if the queue is never drained.
    pub fn push(&self, kind: ErrorKind, origin: Provenance, message: impl Into<String>) {
        let record = ErrorRecord {
            kind,
            message: bounded_message(message.into()),
            origin,
        };
        match kind {
            ErrorKind::Internal => warn!(
                module = origin.module,
                routine = origin.routine,
                message = %record.message,
                "diagnostic pushed"
            ),
            ErrorKind::InvalidArgument => debug!(
                module = origin.module,
                routine = origin.routine,
                message = %record.message,
                "diagnostic pushed"
            ),
        }

        let mut ring = self.state.lock();
        let capacity = ring.slots.len();
        let tail = ring.tail;
        ring.slots[tail] = Some(record);
        ring.tail = (tail + 1) % capacity;
        if ring.len == capacity {
            // Tail caught head: drop the oldest unread record
            ring.head = (ring.head + 1) % capacity;
            ring.overwritten += 1;
            warn!(overwritten = ring.overwritten, "diagnostic queue overflow");
        } else {
            ring.len += 1;
        }
    }

    /// Pop the oldest unread record; FIFO among records not yet overwritten
    pub fn pop(&self) -> Option<ErrorRecord> {
        let mut ring = self.state.lock();
        if ring.len == 0 {
            return None;
        }
        let head = ring.head;
        let record = ring.slots[head].take();
        ring.head = (head + 1) % ring.slots.len();
        ring.len -= 1;
        record
    }

    /// Number of readable records, bounded by the queue capacity
    pub fn len(&self) -> usize {
        self.state.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total records lost to overflow since creation
    pub fn overwritten(&self) -> u64 {
        self.state.lock().overwritten
    }

    /// Reset the queue to empty in O(1) index terms
    pub fn clear(&self) {
        let mut ring = self.state.lock();
        ring.head = 0;
        ring.tail = 0;
        ring.len = 0;
        for slot in ring.slots.iter_mut() {
            *slot = None;
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncate to `MAX_ERROR_MESSAGE` bytes on a char boundary
fn bounded_message(message: String) -> String {
    if message.len() <= MAX_ERROR_MESSAGE {
        return message;
    }
    let mut end = MAX_ERROR_MESSAGE;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    let mut message = message;
    message.truncate(end);
    message
}
