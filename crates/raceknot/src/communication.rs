//! Communications: cross-thread ordered access pairs.
//!
//! A [`Communication`] says that `former` happened (or is assumed to
//! happen) before `latter`, where the two accesses come from different
//! threads and touch overlapping memory.  It is the edge of every race
//! candidate.
//!
//! All predicates compare logical timestamps, which after alignment are
//! global across both traces and follow program order within a thread.

use raceknot_trace::Access;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered pair of accesses from different threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Communication {
    pub former: Access,
    pub latter: Access,
}

impl Communication {
    pub fn new(former: Access, latter: Access) -> Self {
        Self { former, latter }
    }

    /// The same pair in the opposite orientation.
    pub fn reversed(&self) -> Self {
        Self {
            former: self.latter,
            latter: self.former,
        }
    }

    /// Endpoint by role index (0 = former, 1 = latter).
    pub fn endpoint(&self, role: usize) -> &Access {
        if role == 0 {
            &self.former
        } else {
            &self.latter
        }
    }

    /// Both communications connect the same two threads in the same roles.
    pub fn parallel(&self, other: &Communication) -> bool {
        self.former.thread == other.former.thread && self.latter.thread == other.latter.thread
    }

    /// Enforcing both orderings at once would contradict program order.
    ///
    /// Parallel communications never conflict.
    pub fn conflict(&self, other: &Communication) -> bool {
        if self.parallel(other) {
            return false;
        }
        let (f0, l0) = (self.former.timestamp, self.latter.timestamp);
        let (f1, l1) = (other.former.timestamp, other.latter.timestamp);
        (l0 <= f1 && l1 <= f0) || (l1 <= f0 && l0 <= f1)
    }

    /// `self` completes strictly before `other` begins, on both sides.
    pub fn happens_before(&self, other: &Communication) -> bool {
        self.latter.timestamp < other.former.timestamp
            && self.former.timestamp < other.latter.timestamp
    }

    /// `self`'s window lies inside `other`'s window.
    pub fn implies(&self, other: &Communication) -> bool {
        self.former.timestamp >= other.former.timestamp
            && self.latter.timestamp <= other.latter.timestamp
    }

    /// Same instruction pair in the same roles.
    pub fn same(&self, other: &Communication) -> bool {
        self.former.inst == other.former.inst && self.latter.inst == other.latter.inst
    }

    /// Whether both endpoints are the same two accesses as `other`'s,
    /// in either orientation.
    pub fn same_accesses(&self, other: &Communication) -> bool {
        (self.former == other.former && self.latter == other.latter)
            || (self.former == other.latter && self.latter == other.former)
    }
}

impl fmt::Display for Communication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.former, self.latter)
    }
}
