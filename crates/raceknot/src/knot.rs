//! Knots: unordered pairs of communications, the unit of a race candidate.
//!
//! Two communications between the same pair of threads form a knot.  Its
//! [`KnotKind`] says whether the pair can be meaningfully reordered:
//!
//! ```text
//! Parallel    same threads, same roles: a pure reordering candidate
//! Invalid     the two orderings contradict program order
//! Separated   one communication completes before the other starts
//! Overlapped  the windows interleave: a genuine alternate interleaving
//! ```
//!
//! Only `Parallel` and `Overlapped` knots are worth fuzzing.

use crate::communication::Communication;
use raceknot_trace::Access;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a knot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnotKind {
    Invalid,
    Parallel,
    Overlapped,
    Separated,
}

impl KnotKind {
    /// Whether knots of this kind are worth scheduling.
    pub fn is_target(self) -> bool {
        matches!(self, Self::Parallel | Self::Overlapped)
    }
}

impl fmt::Display for KnotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Invalid => "invalid",
            Self::Parallel => "parallel",
            Self::Overlapped => "overlapped",
            Self::Separated => "separated",
        };
        f.write_str(name)
    }
}

/// Returned by [`Knot::implies`] when the knots do not pair up into
/// parallel communications.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("knot implication requires parallel communications")]
pub struct NotParallel;

/// An unordered pair of communications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Knot(pub [Communication; 2]);

impl Knot {
    pub fn new(c0: Communication, c1: Communication) -> Self {
        Self([c0, c1])
    }

    pub fn first(&self) -> &Communication {
        &self.0[0]
    }

    pub fn second(&self) -> &Communication {
        &self.0[1]
    }

    pub fn communications(&self) -> &[Communication; 2] {
        &self.0
    }

    /// The same knot with its communications swapped.
    pub fn swapped(&self) -> Self {
        Self([self.0[1], self.0[0]])
    }

    /// Order-independent equality on instruction pairs.
    pub fn same(&self, other: &Knot) -> bool {
        let [a0, a1] = &self.0;
        let [b0, b1] = &other.0;
        (a0.same(b0) && a1.same(b1)) || (a0.same(b1) && a1.same(b0))
    }

    /// Classify the knot.  Invariant under [`Knot::swapped`].
    pub fn kind(&self) -> KnotKind {
        let [c0, c1] = &self.0;
        if c0.parallel(c1) {
            KnotKind::Parallel
        } else if c0.conflict(c1) || c1.conflict(c0) {
            KnotKind::Invalid
        } else if c0.happens_before(c1) || c1.happens_before(c0) {
            KnotKind::Separated
        } else {
            KnotKind::Overlapped
        }
    }

    /// All four accesses, communication by communication.
    pub fn accesses(&self) -> [Access; 4] {
        let [c0, c1] = &self.0;
        [c0.former, c0.latter, c1.former, c1.latter]
    }

    /// For every thread, the knot's accesses on that thread either lie on
    /// the common path or share a context.
    pub fn contexts_compatible(&self) -> bool {
        let accs = self.accesses();
        for i in 0..accs.len() {
            for j in (i + 1)..accs.len() {
                let (a, b) = (&accs[i], &accs[j]);
                if a.thread != b.thread || a.on_common_path() || b.on_common_path() {
                    continue;
                }
                if a.context != b.context {
                    return false;
                }
            }
        }
        true
    }

    /// Whether `self` implies `other`: each of `self`'s communications lies
    /// inside the window of its parallel counterpart in `other`.
    pub fn implies(&self, other: &Knot) -> Result<bool, NotParallel> {
        let (mut c00, mut c01) = (self.0[0], self.0[1]);
        let [c10, c11] = other.0;
        if !c10.parallel(&c00) {
            std::mem::swap(&mut c00, &mut c01);
        }
        if !c10.parallel(&c00) || !c11.parallel(&c01) {
            return Err(NotParallel);
        }
        Ok(c00.implies(&c10) && c01.implies(&c11))
    }
}

impl fmt::Display for Knot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "knot ({})", self.kind())?;
        writeln!(f, "  {}", self.0[0])?;
        write!(f, "  {}", self.0[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raceknot_trace::COMMON_PATH;

    fn at(timestamp: u32, thread: u64) -> Access {
        Access {
            timestamp,
            thread,
            ..Default::default()
        }
    }

    fn knot(c: [[(u32, u64); 2]; 2]) -> Knot {
        Knot::new(
            Communication::new(at(c[0][0].0, c[0][0].1), at(c[0][1].0, c[0][1].1)),
            Communication::new(at(c[1][0].0, c[1][0].1), at(c[1][1].0, c[1][1].1)),
        )
    }

    fn kind_table() -> Vec<(Knot, KnotKind)> {
        vec![
            (knot([[(0, 0), (2, 1)], [(1, 0), (3, 1)]]), KnotKind::Parallel),
            (knot([[(2, 1), (0, 0)], [(3, 1), (1, 0)]]), KnotKind::Parallel),
            (knot([[(0, 0), (3, 1)], [(1, 1), (2, 0)]]), KnotKind::Overlapped),
            (knot([[(3, 1), (0, 0)], [(2, 0), (1, 1)]]), KnotKind::Invalid),
            (knot([[(0, 1), (2, 0)], [(1, 0), (3, 1)]]), KnotKind::Overlapped),
            (knot([[(0, 1), (1, 0)], [(2, 0), (3, 1)]]), KnotKind::Separated),
            (knot([[(2, 0), (3, 1)], [(0, 1), (1, 0)]]), KnotKind::Separated),
        ]
    }

    #[test]
    fn knot_kind_table() {
        for (i, (k, want)) in kind_table().into_iter().enumerate() {
            assert_eq!(k.kind(), want, "case #{}", i);
        }
    }

    #[test]
    fn kind_invariant_under_swap() {
        for (k, want) in kind_table() {
            assert_eq!(k.swapped().kind(), want);
        }
    }

    #[test]
    fn only_parallel_and_overlapped_are_targets() {
        assert!(KnotKind::Parallel.is_target());
        assert!(KnotKind::Overlapped.is_target());
        assert!(!KnotKind::Invalid.is_target());
        assert!(!KnotKind::Separated.is_target());
    }

    #[test]
    fn same_ignores_order() {
        let mut k = knot([[(0, 0), (3, 1)], [(1, 1), (2, 0)]]);
        k.0[0].former.inst = 0x10;
        k.0[1].former.inst = 0x20;
        assert!(k.same(&k.swapped()));

        let mut other = k;
        other.0[0].former.inst = 0x30;
        assert!(!k.same(&other));
    }

    #[test]
    fn contexts_must_match_off_common_path() {
        let mut k = knot([[(0, 0), (3, 1)], [(1, 1), (2, 0)]]);
        assert!(k.contexts_compatible());

        // thread 0 accesses in different contexts
        k.0[0].former.context = 4;
        k.0[1].latter.context = 5;
        assert!(!k.contexts_compatible());

        // one of them on the common path
        k.0[1].latter.context = COMMON_PATH;
        assert!(k.contexts_compatible());
    }

    #[test]
    fn implies_parallel_knots() {
        let inner = knot([[(3, 0), (8, 1)], [(4, 0), (7, 1)]]);
        let outer = knot([[(1, 0), (10, 1)], [(2, 0), (9, 1)]]);
        assert_eq!(inner.implies(&outer), Ok(true));
        assert_eq!(outer.implies(&inner), Ok(false));
        assert_eq!(inner.swapped().implies(&outer), Ok(true));
    }

    #[test]
    fn implies_rejects_non_parallel() {
        let a = knot([[(0, 0), (3, 1)], [(1, 1), (2, 0)]]);
        let b = knot([[(0, 0), (2, 1)], [(1, 0), (3, 1)]]);
        assert_eq!(a.implies(&b), Err(NotParallel));
    }
}
