//! Pairwise alignment of two serial traces.
//!
//! The two traces of a raced pair usually run much of the same code.  The
//! aligner finds the longest common subsequence of instruction addresses,
//! marks the matched accesses as the *common path*, and rewrites every
//! timestamp so both traces share one global logical clock.  Knot
//! classification relies on that clock, so alignment always runs first.

use raceknot_trace::{Access, SerialTrace, COMMON_PATH};
use serde::{Deserialize, Serialize};

/// Context id given to unaligned accesses of the first trace.
pub const CONTEXT_A: u32 = 0;
/// Context id given to unaligned accesses of the second trace.
pub const CONTEXT_B: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignConfig {
    /// Only match accesses whose indices differ by at most this much.
    /// `None` runs the unbanded LCS.
    pub window: Option<usize>,
}

/// Result of [`lcs`]: its length and, per input, which accesses belong to
/// the common subsequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    pub len: usize,
    pub mask_a: Vec<bool>,
    pub mask_b: Vec<bool>,
}

/// LCS lengths stored only inside the band `|i - j| <= w`.
///
/// No match lies outside the band, so an out-of-band cell equals the
/// nearest in-band cell of its row or column.
struct Band {
    w: usize,
    m: usize,
    rows: Vec<Vec<usize>>,
}

impl Band {
    fn new(n: usize, m: usize, w: usize) -> Self {
        let rows = (0..=n)
            .map(|i| {
                let (lo, hi) = (i.saturating_sub(w), m.min(i.saturating_add(w)));
                vec![0; (hi + 1).saturating_sub(lo)]
            })
            .collect();
        Self { w, m, rows }
    }

    fn in_band(&self, i: usize, j: usize) -> bool {
        i.abs_diff(j) <= self.w
    }

    fn get(&self, i: usize, j: usize) -> usize {
        let (i, j) = if i > j.saturating_add(self.w) {
            (j + self.w, j)
        } else if j > i.saturating_add(self.w) {
            (i, i + self.w)
        } else {
            (i, j)
        };
        self.rows[i][j - i.saturating_sub(self.w)]
    }

    fn set(&mut self, i: usize, j: usize, len: usize) {
        let lo = i.saturating_sub(self.w);
        self.rows[i][j - lo] = len;
    }

    fn columns(&self, i: usize) -> std::ops::RangeInclusive<usize> {
        i.saturating_sub(self.w).max(1)..=self.m.min(i.saturating_add(self.w))
    }
}

/// Longest common subsequence of `a` and `b` by instruction address.
///
/// With a window only the band of cells within `w` of the diagonal is
/// computed, in O(n·w) time and memory.
pub fn lcs(a: &[Access], b: &[Access], window: Option<usize>) -> Alignment {
    let (n, m) = (a.len(), b.len());
    let mut band = Band::new(n, m, window.unwrap_or(n.max(m)));

    for i in 1..=n {
        for j in band.columns(i) {
            let len = if a[i - 1].inst == b[j - 1].inst {
                band.get(i - 1, j - 1) + 1
            } else {
                band.get(i - 1, j).max(band.get(i, j - 1))
            };
            band.set(i, j, len);
        }
    }

    let mut mask_a = vec![false; n];
    let mut mask_b = vec![false; m];
    let (mut i, mut j) = (n, m);
    while i > 0 && j > 0 {
        if band.in_band(i, j) && a[i - 1].inst == b[j - 1].inst {
            mask_a[i - 1] = true;
            mask_b[j - 1] = true;
            i -= 1;
            j -= 1;
        } else if band.get(i - 1, j) > band.get(i, j - 1) {
            i -= 1;
        } else {
            j -= 1;
        }
    }

    Alignment {
        len: band.get(n, m),
        mask_a,
        mask_b,
    }
}

/// Align two traces onto one logical clock.
///
/// Walking gap by gap, the unaligned run of `a` comes first, then the
/// unaligned run of `b`, then the next matched pair, which shares a
/// single timestamp.  Timestamps restart from zero.  Matched accesses get
/// [`COMMON_PATH`] as context, the rest [`CONTEXT_A`] or [`CONTEXT_B`].
/// The inputs are left untouched.
pub fn align(a: &SerialTrace, b: &SerialTrace, config: &AlignConfig) -> (SerialTrace, SerialTrace) {
    let (a, b) = (a.as_slice(), b.as_slice());
    let alignment = lcs(a, b, config.window);
    log::debug!(
        "aligned {} and {} accesses, {} on the common path",
        a.len(),
        b.len(),
        alignment.len
    );

    let mut out_a = Vec::with_capacity(a.len());
    let mut out_b = Vec::with_capacity(b.len());
    let mut clock = 0u32;
    let (mut i, mut j) = (0, 0);

    let stamp = |acc: &Access, context: u32, clock: u32| Access {
        timestamp: clock,
        context,
        ..*acc
    };

    while i < a.len() || j < b.len() {
        while i < a.len() && !alignment.mask_a[i] {
            out_a.push(stamp(&a[i], CONTEXT_A, clock));
            clock += 1;
            i += 1;
        }
        while j < b.len() && !alignment.mask_b[j] {
            out_b.push(stamp(&b[j], CONTEXT_B, clock));
            clock += 1;
            j += 1;
        }
        if i < a.len() && j < b.len() {
            out_a.push(stamp(&a[i], COMMON_PATH, clock));
            out_b.push(stamp(&b[j], COMMON_PATH, clock));
            clock += 1;
            i += 1;
            j += 1;
        }
    }

    (
        SerialTrace::from_accesses(out_a),
        SerialTrace::from_accesses(out_b),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insts(insts: &[u32], thread: u64) -> SerialTrace {
        insts
            .iter()
            .enumerate()
            .map(|(ts, &inst)| Access {
                inst,
                thread,
                timestamp: ts as u32,
                ..Default::default()
            })
            .collect()
    }

    fn common(mask: &[bool], trace: &SerialTrace) -> Vec<u32> {
        trace
            .iter()
            .zip(mask)
            .filter(|(_, &m)| m)
            .map(|(acc, _)| acc.inst)
            .collect()
    }

    #[test]
    fn lcs_vectors() {
        let a = insts(&[0, 3, 7, 10], 0);

        let b = insts(&[2, 3, 10], 1);
        let al = lcs(a.as_slice(), b.as_slice(), None);
        assert_eq!(al.len, 2);
        assert_eq!(al.mask_a, vec![false, true, false, true]);
        assert_eq!(al.mask_b, vec![false, true, true]);
        assert_eq!(common(&al.mask_a, &a), vec![3, 10]);

        let b = insts(&[0, 3, 10], 1);
        let al = lcs(a.as_slice(), b.as_slice(), None);
        assert_eq!(al.len, 3);
        assert_eq!(common(&al.mask_b, &b), vec![0, 3, 10]);

        let al = lcs(insts(&[0, 1], 0).as_slice(), insts(&[2, 3], 1).as_slice(), None);
        assert_eq!(al.len, 0);
        assert!(al.mask_a.iter().chain(&al.mask_b).all(|m| !m));
    }

    #[test]
    fn window_limits_matches() {
        let a = insts(&[1, 2, 3, 9], 0);
        let b = insts(&[9], 1);
        assert_eq!(lcs(a.as_slice(), b.as_slice(), None).len, 1);
        assert_eq!(lcs(a.as_slice(), b.as_slice(), Some(1)).len, 0);
        assert_eq!(lcs(a.as_slice(), b.as_slice(), Some(3)).len, 1);
    }

    /// Full-grid banded LCS length, for comparison.
    fn full_grid_len(a: &[u32], b: &[u32], w: usize) -> usize {
        let mut len = vec![vec![0usize; b.len() + 1]; a.len() + 1];
        for i in 1..=a.len() {
            for j in 1..=b.len() {
                len[i][j] = if i.abs_diff(j) <= w && a[i - 1] == b[j - 1] {
                    len[i - 1][j - 1] + 1
                } else {
                    len[i - 1][j].max(len[i][j - 1])
                };
            }
        }
        len[a.len()][b.len()]
    }

    #[test]
    fn band_matches_full_grid() {
        let xs = [1, 4, 4, 8, 2, 9, 11, 4, 7, 7, 3];
        let ys = [4, 8, 3, 3, 9, 4, 11, 7];
        let (a, b) = (insts(&xs, 0), insts(&ys, 1));
        for w in 0..12 {
            let al = lcs(a.as_slice(), b.as_slice(), Some(w));
            assert_eq!(al.len, full_grid_len(&xs, &ys, w), "window {}", w);
            assert_eq!(al.mask_a.iter().filter(|&&m| m).count(), al.len);
            assert_eq!(common(&al.mask_a, &a), common(&al.mask_b, &b));
        }
        let al = lcs(a.as_slice(), b.as_slice(), None);
        assert_eq!(al.len, full_grid_len(&xs, &ys, usize::MAX));
    }

    #[test]
    fn band_handles_uneven_lengths() {
        let xs: Vec<u32> = (0..40).collect();
        let ys = [0, 1, 39];
        let (a, b) = (insts(&xs, 0), insts(&ys, 1));
        for w in [0, 1, 5, 36, 37] {
            let al = lcs(a.as_slice(), b.as_slice(), Some(w));
            assert_eq!(al.len, full_grid_len(&xs, &ys, w), "window {}", w);
        }
        assert_eq!(lcs(insts(&[], 0).as_slice(), b.as_slice(), Some(1)).len, 0);
    }

    #[test]
    fn narrow_window_scales_to_long_traces() {
        // a full grid for this pair would need billions of cells
        let n = 60_000u32;
        let a = insts(&(0..n).collect::<Vec<_>>(), 0);
        let b = insts(&(0..n).map(|x| x * 2).collect::<Vec<_>>(), 1);
        // only 0, 2 and 4 sit close enough to their partners
        let al = lcs(a.as_slice(), b.as_slice(), Some(2));
        assert_eq!(al.len, 3);
        let al = lcs(a.as_slice(), a.as_slice(), Some(2));
        assert_eq!(al.len, n as usize);
    }

    #[test]
    fn align_interleaves_gaps() {
        let a = insts(&[0, 3, 7, 10], 0);
        let b = insts(&[2, 3, 10], 1);
        let (ra, rb) = align(&a, &b, &AlignConfig { window: Some(1) });

        let ts_a: Vec<(u32, u32, u32)> = ra.iter().map(|x| (x.inst, x.timestamp, x.context)).collect();
        let ts_b: Vec<(u32, u32, u32)> = rb.iter().map(|x| (x.inst, x.timestamp, x.context)).collect();
        assert_eq!(
            ts_a,
            vec![(0, 0, 0), (3, 2, COMMON_PATH), (7, 3, 0), (10, 4, COMMON_PATH)]
        );
        assert_eq!(ts_b, vec![(2, 1, 1), (3, 2, COMMON_PATH), (10, 4, COMMON_PATH)]);
    }

    #[test]
    fn align_without_overlap_runs_a_then_b() {
        let a = insts(&[0, 1], 0);
        let b = insts(&[2, 3], 1);
        let (ra, rb) = align(&a, &b, &AlignConfig::default());
        let ts_a: Vec<(u32, u32)> = ra.iter().map(|x| (x.timestamp, x.context)).collect();
        let ts_b: Vec<(u32, u32)> = rb.iter().map(|x| (x.timestamp, x.context)).collect();
        assert_eq!(ts_a, vec![(0, CONTEXT_A), (1, CONTEXT_A)]);
        assert_eq!(ts_b, vec![(2, CONTEXT_B), (3, CONTEXT_B)]);
    }

    #[test]
    fn align_leaves_inputs_alone() {
        let a = insts(&[5, 6], 0);
        let b = insts(&[6, 5], 1);
        let before = (a.clone(), b.clone());
        let _ = align(&a, &b, &AlignConfig::default());
        assert_eq!((a, b), before);
    }

    #[test]
    fn aligned_traces_share_common_path() {
        let a = insts(&[1, 4, 4, 8, 2, 9, 11, 4], 0);
        let b = insts(&[4, 8, 3, 3, 9, 4, 11], 1);
        let (ra, rb) = align(&a, &b, &AlignConfig::default());

        let ca: Vec<&Access> = ra.iter().filter(|x| x.on_common_path()).collect();
        let cb: Vec<&Access> = rb.iter().filter(|x| x.on_common_path()).collect();
        assert_eq!(ca.len(), cb.len());
        for (x, y) in ca.iter().zip(&cb) {
            assert_eq!(x.inst, y.inst);
            assert_eq!(x.timestamp, y.timestamp);
        }

        for (trace, ctx) in [(&ra, CONTEXT_A), (&rb, CONTEXT_B)] {
            assert!(trace
                .as_slice()
                .windows(2)
                .all(|w| w[0].timestamp < w[1].timestamp));
            assert!(trace.iter().all(|x| x.context == ctx || x.on_common_path()));
        }
    }
}
