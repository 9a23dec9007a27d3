//! Unknown-sequence diagnostics
//!
//! A bounded log of the bytes the recognizer could not match, for
//! "last N unknown sequences" displays. It is a ring buffer with a fixed
//! capacity; the oldest report is overwritten once it is full.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::recognizer::Recognizer;

/// One unknown-sequence report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownSequence {
    /// Position of this report among all reports the log has seen,
    /// including evicted ones
    pub ordinal: u64,
    pub bytes: Vec<u8>,
}

/// Ring buffer of unknown-sequence reports
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    entries: Vec<UnknownSequence>,
    /// Index of the oldest entry
    head: usize,
    len: usize,
    capacity: usize,
    /// Reports seen since creation or the last `clear`
    total: u64,
}

impl DiagnosticLog {
    /// Create a log keeping at most `capacity` reports. A zero capacity
    /// keeps nothing but still counts.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity.min(1000)),
            head: 0,
            len: 0,
            capacity,
            total: 0,
        }
    }

    /// Number of reports currently kept
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no reports are kept
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of reports kept
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reports seen, including those already evicted
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Record `bytes` as the next report
    pub fn push(&mut self, bytes: &[u8]) {
        let entry = UnknownSequence {
            ordinal: self.total,
            bytes: bytes.to_vec(),
        };
        self.total += 1;

        if self.capacity == 0 {
            return;
        }

        if self.entries.len() < self.capacity {
            self.entries.push(entry);
            self.len += 1;
        } else {
            // Full: overwrite the oldest
            self.entries[self.head] = entry;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Get a report by index (0 = oldest kept)
    pub fn get(&self, index: usize) -> Option<&UnknownSequence> {
        if index >= self.len {
            return None;
        }
        self.entries.get((self.head + index) % self.entries.len())
    }

    /// Iterate from oldest to newest
    /// Iterate over kept reports, oldest first
    pub fn iter(&self) -> DiagnosticIter<'_> {
        DiagnosticIter { log: self, index: 0 }
    }

    /// Drop every report and restart the count
    pub fn clear(&mut self) {
        self.entries.clear();
        self.head = 0;
        self.len = 0;
        self.total = 0;
    }
}

/// Iterator over kept reports
pub struct DiagnosticIter<'a> {
    log: &'a DiagnosticLog,
    index: usize,
}

impl<'a> Iterator for DiagnosticIter<'a> {
    type Item = &'a UnknownSequence;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.log.get(self.index)?;
        self.index += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.log.len.saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for DiagnosticIter<'a> {}

/// A [`DiagnosticLog`] shared between a recognizer hook and its reader
#[derive(Debug, Clone)]
pub struct SharedDiagnosticLog(Arc<Mutex<DiagnosticLog>>);

impl SharedDiagnosticLog {
    /// Create a shared log with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self(Arc::new(Mutex::new(DiagnosticLog::new(capacity))))
    }

    /// Lock the log. A hook that panicked mid-push leaves the log usable.
    pub fn lock(&self) -> MutexGuard<'_, DiagnosticLog> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A hook suitable for [`Recognizer::on_unknown_sequence`]
    pub fn hook(&self) -> impl FnMut(&[u8]) + Send + 'static {
        let log = self.clone();
        move |bytes: &[u8]| log.lock().push(bytes)
    }

    /// Register this log's hook on `recognizer`
    pub fn attach(&self, recognizer: &mut Recognizer) {
        recognizer.on_unknown_sequence(self.hook());
    }

    /// Copy of the kept reports, oldest first
    pub fn snapshot(&self) -> Vec<UnknownSequence> {
        self.lock().iter().cloned().collect()
    }
}
