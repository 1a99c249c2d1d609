//! Flat `u32` wire format for knots handed back to the execution layer.
//!
//! Each knot occupies [`WORDS_PER_KNOT`] words: two communications, two
//! accesses each, seven fields per access in the order
//! `inst, addr, size, kind, timestamp, thread, context`.  Thread ids
//! that do not fit in 32 bits are rejected rather than truncated, so
//! decoding always gives back the encoded knots.

use crate::communication::Communication;
use crate::knot::Knot;
use raceknot_trace::{Access, AccessKind, UnknownKind};
use thiserror::Error;

const WORDS_PER_ACCESS: usize = 7;
pub const WORDS_PER_KNOT: usize = 4 * WORDS_PER_ACCESS;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoverError {
    #[error("cover length {0} is not a multiple of 28")]
    Length(usize),

    #[error("knot #{knot}: {source}")]
    Kind {
        knot: usize,
        #[source]
        source: UnknownKind,
    },

    #[error("knot #{knot}: thread {thread} does not fit in 32 bits")]
    Thread { knot: usize, thread: u64 },
}

pub fn serialize(knots: &[Knot]) -> Result<Vec<u32>, CoverError> {
    let mut out = Vec::with_capacity(knots.len() * WORDS_PER_KNOT);
    for (idx, knot) in knots.iter().enumerate() {
        for acc in knot.accesses() {
            let thread = u32::try_from(acc.thread).map_err(|_| CoverError::Thread {
                knot: idx,
                thread: acc.thread,
            })?;
            out.extend_from_slice(&[
                acc.inst,
                acc.addr,
                acc.size,
                acc.kind.as_u32(),
                acc.timestamp,
                thread,
                acc.context,
            ]);
        }
    }
    Ok(out)
}

pub fn deserialize(words: &[u32]) -> Result<Vec<Knot>, CoverError> {
    if words.len() % WORDS_PER_KNOT != 0 {
        return Err(CoverError::Length(words.len()));
    }
    let mut knots = Vec::with_capacity(words.len() / WORDS_PER_KNOT);
    for (idx, chunk) in words.chunks_exact(WORDS_PER_KNOT).enumerate() {
        let mut accs = [Access::default(); 4];
        for (acc, w) in accs.iter_mut().zip(chunk.chunks_exact(WORDS_PER_ACCESS)) {
            let kind = AccessKind::try_from(w[3])
                .map_err(|source| CoverError::Kind { knot: idx, source })?;
            *acc = Access {
                inst: w[0],
                addr: w[1],
                size: w[2],
                kind,
                timestamp: w[4],
                thread: u64::from(w[5]),
                context: w[6],
            };
        }
        knots.push(Knot::new(
            Communication::new(accs[0], accs[1]),
            Communication::new(accs[2], accs[3]),
        ));
    }
    Ok(knots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use raceknot_trace::COMMON_PATH;

    fn sample() -> Knot {
        let mut latter = Access::new(0x20, 0x1000, 4, AccessKind::Load, 3, 1);
        latter.context = COMMON_PATH;
        Knot::new(
            Communication::new(Access::new(0x10, 0x1000, 8, AccessKind::Store, 0, 0), latter),
            Communication::new(
                Access::new(0x30, 0x1004, 4, AccessKind::Store, 1, 1),
                Access::new(0x40, 0x1004, 4, AccessKind::Load, 2, 0),
            ),
        )
    }

    #[test]
    fn layout_is_fixed_width() {
        let words = serialize(&[sample(), sample()]).unwrap();
        assert_eq!(words.len(), 2 * WORDS_PER_KNOT);
        assert_eq!(&words[..7], &[0x10, 0x1000, 8, 1, 0, 0, 0]);
        assert_eq!(words[7 + 6], COMMON_PATH);
    }

    #[test]
    fn decodes_what_it_encodes() {
        let knots = vec![sample()];
        assert_eq!(deserialize(&serialize(&knots).unwrap()), Ok(knots));
        assert_eq!(deserialize(&[]), Ok(vec![]));
    }

    #[test]
    fn rejects_truncated_input() {
        let mut words = serialize(&[sample()]).unwrap();
        words.pop();
        assert_eq!(deserialize(&words), Err(CoverError::Length(27)));
    }

    #[test]
    fn rejects_unknown_kind() {
        let mut words = serialize(&[sample(), sample()]).unwrap();
        words[WORDS_PER_KNOT + 3] = 9;
        assert_eq!(
            deserialize(&words),
            Err(CoverError::Kind {
                knot: 1,
                source: UnknownKind(9)
            })
        );
    }

    #[test]
    fn thread_ids_up_to_u32_max_survive() {
        let mut knot = sample();
        knot.0[1].former.thread = u64::from(u32::MAX);
        let words = serialize(&[sample(), knot]).unwrap();
        assert_eq!(deserialize(&words), Ok(vec![sample(), knot]));
    }

    #[test]
    fn rejects_wide_thread_ids() {
        let mut knot = sample();
        knot.0[1].former.thread = u64::from(u32::MAX) + 1;
        assert_eq!(
            serialize(&[sample(), knot]),
            Err(CoverError::Thread {
                knot: 1,
                thread: 1 << 32
            })
        );
    }
}
