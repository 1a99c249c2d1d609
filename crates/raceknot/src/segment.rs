//! Content hashes for communications and knots.
//!
//! Every segment reduces to a 64-bit FNV-1a hash over little-endian `u32`
//! words.  The hash is the identity used for deduplication and for the
//! coverage signal, so collisions are accepted as a bounded loss of
//! precision.

use crate::communication::Communication;
use crate::knot::Knot;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Something that can be identified by a content hash.
pub trait Segment {
    fn content_hash(&self) -> u64;
}

/// FNV-1a over the little-endian bytes of `words`.
pub fn fnv1a(words: &[u32]) -> u64 {
    let mut hash = FNV_OFFSET;
    for word in words {
        for byte in word.to_le_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

impl Segment for Communication {
    /// Order-sensitive: a communication and its reversal hash differently.
    fn content_hash(&self) -> u64 {
        let (f, l) = (&self.former, &self.latter);
        fnv1a(&[
            f.inst,
            f.thread as u32,
            f.timestamp,
            l.inst,
            l.thread as u32,
            l.timestamp,
        ])
    }
}

impl Segment for Knot {
    /// Order-insensitive, and blind to absolute timestamps: each endpoint
    /// only records whether it runs after the other communication's latter.
    fn content_hash(&self) -> u64 {
        let comms = self.communications();
        let mut encoded = [[0u32; 6]; 2];
        for (i, comm) in comms.iter().enumerate() {
            let other_latter = comms[1 - i].latter.timestamp;
            for (j, acc) in [&comm.former, &comm.latter].into_iter().enumerate() {
                let normalized = u32::from(acc.timestamp > other_latter);
                encoded[i][j * 3] = acc.inst;
                encoded[i][j * 3 + 1] = acc.thread as u32;
                encoded[i][j * 3 + 2] = normalized;
            }
        }
        encoded.sort_unstable();
        let words: Vec<u32> = encoded.iter().flatten().copied().collect();
        fnv1a(&words)
    }
}

/// Items of `b` whose content hash also occurs in `a`.
pub fn intersect<T: Segment + Clone>(a: &[T], b: &[T]) -> Vec<T> {
    let hashes: std::collections::HashSet<u64> = a.iter().map(Segment::content_hash).collect();
    b.iter()
        .filter(|seg| hashes.contains(&seg.content_hash()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use raceknot_trace::Access;

    fn at(inst: u32, timestamp: u32, thread: u64) -> Access {
        Access {
            inst,
            timestamp,
            thread,
            ..Default::default()
        }
    }

    fn sample_knot(shift: u32) -> Knot {
        Knot::new(
            Communication::new(at(0x10, shift, 0), at(0x20, 3 + shift, 1)),
            Communication::new(at(0x30, 1 + shift, 1), at(0x40, 2 + shift, 0)),
        )
    }

    #[test]
    fn fnv1a_known_values() {
        assert_eq!(fnv1a(&[]), FNV_OFFSET);
        // FNV-1a 64 of the four bytes 00 00 00 00
        assert_eq!(fnv1a(&[0]), 0x4d25_767f_9dce_13f5);
    }

    #[test]
    fn communication_hash_is_order_sensitive() {
        let c = Communication::new(at(0x10, 0, 0), at(0x20, 1, 1));
        assert_eq!(c.content_hash(), c.content_hash());
        assert_ne!(c.content_hash(), c.reversed().content_hash());
    }

    #[test]
    fn knot_hash_ignores_communication_order() {
        let k = sample_knot(0);
        assert_eq!(k.content_hash(), k.swapped().content_hash());
    }

    #[test]
    fn knot_hash_ignores_timestamp_shift() {
        assert_eq!(sample_knot(0).content_hash(), sample_knot(40).content_hash());
    }

    #[test]
    fn knot_hash_tracks_instructions() {
        let mut other = sample_knot(0);
        other.0[0].former.inst = 0x11;
        assert_ne!(sample_knot(0).content_hash(), other.content_hash());
    }

    #[test]
    fn intersect_keeps_items_of_second_list() {
        let c0 = Communication::new(at(1, 0, 0), at(2, 1, 1));
        let c1 = Communication::new(at(3, 2, 0), at(4, 3, 1));
        let c2 = Communication::new(at(5, 4, 0), at(6, 5, 1));
        let shared = intersect(&[c0, c1], &[c1, c2]);
        assert_eq!(shared, vec![c1]);
        assert!(intersect(&[c0], &[c2]).is_empty());
    }
}
