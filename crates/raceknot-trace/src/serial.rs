//! Timestamp-ordered per-thread access sequences.
//!
//! A [`SerialTrace`] keeps its accesses sorted by timestamp at all times.
//! Insertion uses a binary search so that appending in order (the common
//! case when replaying a raw log) stays O(1).

use crate::access::Access;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Index;

/// Ordered sequence of accesses for one logical thread.
///
/// Invariant: `timestamp` is non-decreasing along the sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Access>", into = "Vec<Access>")]
pub struct SerialTrace {
    accesses: Vec<Access>,
}

impl SerialTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a trace from an unsorted collection.
    ///
    /// Sorts once (stable, so equal timestamps keep their input order)
    /// and then takes the append fast path for every element.
    pub fn from_accesses(mut accesses: Vec<Access>) -> Self {
        accesses.sort_by_key(|acc| acc.timestamp);
        let mut serial = Self::new();
        serial.accesses.reserve(accesses.len());
        for acc in accesses {
            serial.add(acc);
        }
        serial
    }

    /// Insert an access at its sorted position.
    ///
    /// The access is placed before any existing access with an equal or
    /// greater timestamp.
    pub fn add(&mut self, acc: Access) {
        let n = self.accesses.len();
        if n == 0 || self.accesses[n - 1].timestamp < acc.timestamp {
            self.accesses.push(acc);
            return;
        }
        let idx = self
            .accesses
            .partition_point(|existing| existing.timestamp < acc.timestamp);
        self.accesses.insert(idx, acc);
    }

    /// Index of an access with the same timestamp, if any.
    pub fn find_index(&self, acc: &Access) -> Option<usize> {
        let idx = self
            .accesses
            .partition_point(|existing| existing.timestamp < acc.timestamp);
        match self.accesses.get(idx) {
            Some(found) if found.timestamp == acc.timestamp => Some(idx),
            _ => None,
        }
    }

    /// Merge two traces into one timestamp-ordered trace.
    pub fn combine(a: &SerialTrace, b: &SerialTrace) -> SerialTrace {
        let mut merged = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            if a.accesses[i].timestamp <= b.accesses[j].timestamp {
                merged.push(a.accesses[i]);
                i += 1;
            } else {
                merged.push(b.accesses[j]);
                j += 1;
            }
        }
        merged.extend_from_slice(&a.accesses[i..]);
        merged.extend_from_slice(&b.accesses[j..]);
        SerialTrace { accesses: merged }
    }

    /// Find at most `max` accesses per thread that execute `inst`.
    ///
    /// At most two threads race at a time, so the search stops once
    /// `2 * max` accesses are collected.
    pub fn find_foreach_thread(&self, inst: u32, max: usize) -> SerialTrace {
        let mut per_thread: HashMap<u64, usize> = HashMap::new();
        let mut found = SerialTrace::new();
        for acc in &self.accesses {
            if found.len() >= max * 2 {
                break;
            }
            let count = per_thread.entry(acc.thread).or_insert(0);
            if acc.inst == inst && *count < max {
                found.add(*acc);
                *count += 1;
            }
        }
        found
    }

    /// Thread that owns this trace (taken from the first access).
    pub fn thread(&self) -> Option<u64> {
        self.accesses.first().map(|acc| acc.thread)
    }

    /// Rewrite the owning thread of every access.
    pub fn reassign_thread(&mut self, thread: u64) {
        for acc in &mut self.accesses {
            acc.thread = thread;
        }
    }

    pub fn len(&self) -> usize {
        self.accesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accesses.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Access> {
        self.accesses.iter()
    }

    pub fn as_slice(&self) -> &[Access] {
        &self.accesses
    }

    pub fn into_vec(self) -> Vec<Access> {
        self.accesses
    }
}

impl From<Vec<Access>> for SerialTrace {
    fn from(accesses: Vec<Access>) -> Self {
        Self::from_accesses(accesses)
    }
}

impl From<SerialTrace> for Vec<Access> {
    fn from(serial: SerialTrace) -> Self {
        serial.accesses
    }
}

impl FromIterator<Access> for SerialTrace {
    fn from_iter<I: IntoIterator<Item = Access>>(iter: I) -> Self {
        Self::from_accesses(iter.into_iter().collect())
    }
}

impl Index<usize> for SerialTrace {
    type Output = Access;

    fn index(&self, index: usize) -> &Access {
        &self.accesses[index]
    }
}

impl<'a> IntoIterator for &'a SerialTrace {
    type Item = &'a Access;
    type IntoIter = std::slice::Iter<'a, Access>;

    fn into_iter(self) -> Self::IntoIter {
        self.accesses.iter()
    }
}
