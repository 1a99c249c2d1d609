//! Interleaving coverage signal.
//!
//! A [`Signal`] is a set of segment content hashes.  It carries no lock of
//! its own; shared state lives in [`crate::ledger::Ledger`].  Elements are
//! kept ordered so that serialization and [`Signal::split`] are
//! deterministic.

use crate::segment::Segment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::num::ParseIntError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("malformed signal hash {token:?} at token {index}: {source}")]
    Hex {
        index: usize,
        token: String,
        #[source]
        source: ParseIntError,
    },
}

/// Set of 64-bit content hashes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signal(BTreeSet<u64>);

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal made of the content hashes of `segs`.
    pub fn from_segments<T: Segment>(segs: &[T]) -> Self {
        Self(segs.iter().map(Segment::content_hash).collect())
    }

    pub fn insert(&mut self, hash: u64) -> bool {
        self.0.insert(hash)
    }

    pub fn contains(&self, hash: u64) -> bool {
        self.0.contains(&hash)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter().copied()
    }

    /// Union `other` into `self`.
    pub fn merge(&mut self, other: &Signal) {
        self.0.extend(other.0.iter().copied());
    }

    /// Elements of `other` that `self` does not have yet.
    pub fn diff(&self, other: &Signal) -> Signal {
        Self(other.0.difference(&self.0).copied().collect())
    }

    pub fn intersect(&self, other: &Signal) -> Signal {
        Self(self.0.intersection(&other.0).copied().collect())
    }

    /// Keep only the segments whose hash is new to `self`, recording them
    /// as seen.  Duplicates within `segs` are returned once.
    pub fn diff_merge<T: Segment + Clone>(&mut self, segs: &[T]) -> Vec<T> {
        segs.iter()
            .filter(|seg| self.0.insert(seg.content_hash()))
            .cloned()
            .collect()
    }

    /// Move up to `n` elements out of `self`.
    pub fn split(&mut self, n: usize) -> Signal {
        let mut taken = BTreeSet::new();
        while taken.len() < n {
            match self.0.pop_first() {
                Some(hash) => {
                    taken.insert(hash);
                }
                None => break,
            }
        }
        Self(taken)
    }

    pub fn serialize(&self) -> Vec<u64> {
        self.0.iter().copied().collect()
    }

    pub fn deserialize(raw: &[u64]) -> Signal {
        Self(raw.iter().copied().collect())
    }

    /// One lowercase hex hash per line.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.0.len() * 17);
        for hash in &self.0 {
            out.push_str(&format!("{:x}\n", hash));
        }
        out
    }

    /// Parse whitespace-separated hex hashes, as produced by
    /// [`Signal::to_hex`].
    pub fn from_hex(text: &str) -> Result<Signal, SignalError> {
        let mut sig = Signal::new();
        for (index, token) in text.split_whitespace().enumerate() {
            let hash = u64::from_str_radix(token, 16).map_err(|source| SignalError::Hex {
                index,
                token: token.to_string(),
                source,
            })?;
            sig.insert(hash);
        }
        Ok(sig)
    }
}

impl FromIterator<u64> for Signal {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<u64> for Signal {
    fn extend<I: IntoIterator<Item = u64>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(v: &[u64]) -> Signal {
        v.iter().copied().collect()
    }

    #[test]
    fn merge_is_idempotent() {
        let mut s = sig(&[1, 2]);
        s.merge(&sig(&[2, 3]));
        assert_eq!(s, sig(&[1, 2, 3]));
        s.merge(&sig(&[2, 3]));
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn diff_returns_unseen_elements_of_argument() {
        let seen = sig(&[1, 2, 3]);
        assert_eq!(seen.diff(&sig(&[2, 4, 5])), sig(&[4, 5]));
        assert!(seen.diff(&sig(&[1])).is_empty());
        assert!(seen.diff(&Signal::new()).is_empty());
    }

    #[test]
    fn intersect_keeps_common() {
        assert_eq!(sig(&[1, 2, 3]).intersect(&sig(&[3, 4])), sig(&[3]));
        assert!(sig(&[1]).intersect(&sig(&[2])).is_empty());
    }

    #[test]
    fn split_moves_elements() {
        let mut s = sig(&[1, 2, 3, 4, 5]);
        let part = s.split(2);
        assert_eq!(part.len(), 2);
        assert_eq!(s.len(), 3);
        assert!(part.intersect(&s).is_empty());

        let rest = s.split(10);
        assert_eq!(rest.len(), 3);
        assert!(s.is_empty());
        assert!(s.split(1).is_empty());
    }

    #[test]
    fn serialize_round_trip() {
        let s = sig(&[9, 1, 0xdead_beef_0000_0001]);
        assert_eq!(Signal::deserialize(&s.serialize()), s);
    }

    #[test]
    fn hex_round_trip() {
        let s = sig(&[0, 0xff, u64::MAX]);
        let text = s.to_hex();
        assert_eq!(text, "0\nff\nffffffffffffffff\n");
        assert_eq!(Signal::from_hex(&text), Ok(s));
    }

    #[test]
    fn malformed_hex_is_rejected() {
        let err = Signal::from_hex("ff\nzz\n").unwrap_err();
        match err {
            SignalError::Hex { index, token, .. } => {
                assert_eq!(index, 1);
                assert_eq!(token, "zz");
            }
        }
        assert!(Signal::from_hex("1ffffffffffffffff").is_err());
    }

    #[test]
    fn diff_merge_reports_new_segments_once() {
        use crate::communication::Communication;
        use raceknot_trace::Access;

        let c = |inst: u32| {
            Communication::new(
                Access {
                    inst,
                    ..Default::default()
                },
                Access {
                    inst: inst + 1,
                    thread: 1,
                    ..Default::default()
                },
            )
        };
        let mut seen = Signal::from_segments(&[c(1)]);
        let fresh = seen.diff_merge(&[c(1), c(3), c(3)]);
        assert_eq!(fresh, vec![c(3)]);
        assert_eq!(seen.len(), 2);
        assert!(seen.diff_merge(&[c(3)]).is_empty());
    }
}
