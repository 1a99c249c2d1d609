//! Schedule candidates: one critical communication plus the accesses that
//! must be reordered around it.
//!
//! Knots sharing their second communication describe the same reordering
//! target.  Aggregating them yields a [`Candidate`] whose delaying stores
//! (or following loads) feed the flush-vector generator.

use crate::communication::Communication;
use crate::dag::{schedule_from_accesses, SchedPoint};
use crate::knot::Knot;
use crate::segment::Segment;
use crate::signal::Signal;
use rand::Rng;
use raceknot_trace::{Access, AccessKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte length of the call instruction preceding a load's return site
/// (x86 `call rel32`).
pub const DEFAULT_CALL_INST_SIZE: u32 = 5;

/// Which store-buffer effect the candidate tries to expose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarrierKind {
    /// A missing store barrier: delay earlier stores past the critical one.
    #[default]
    Store,
    /// A missing load barrier: let later loads run ahead.
    Load,
}

impl fmt::Display for BarrierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store => f.write_str("store reordering"),
            Self::Load => f.write_str("load reordering"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub critical: Communication,
    pub delaying: Vec<Access>,
    pub following: Vec<Access>,
    pub barrier: BarrierKind,
}

impl Candidate {
    pub fn with_barrier(mut self, barrier: BarrierKind) -> Self {
        self.barrier = barrier;
        self
    }

    /// Accesses reordered under the candidate's barrier kind.
    pub fn relevant(&self) -> &[Access] {
        match self.barrier {
            BarrierKind::Store => &self.delaying,
            BarrierKind::Load => &self.following,
        }
    }

    /// Endpoint of the critical communication the barrier sits at.
    pub fn pivot(&self) -> &Access {
        match self.barrier {
            BarrierKind::Store => &self.critical.former,
            BarrierKind::Load => &self.critical.latter,
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.relevant().is_empty() || self.critical.former.inst == 0 || self.critical.latter.inst == 0
    }

    /// Number of relevant accesses of the barrier's own kind.
    pub fn score(&self) -> usize {
        let kind = match self.barrier {
            BarrierKind::Store => AccessKind::Store,
            BarrierKind::Load => AccessKind::Load,
        };
        self.relevant().iter().filter(|acc| acc.kind == kind).count()
    }

    /// One hash per (pivot, relevant access) instruction pair.
    pub fn coverage(&self) -> Signal {
        const FNV32_OFFSET: u32 = 0x811c_9dc5;
        const FNV32_PRIME: u32 = 0x0100_0193;
        let pivot = self.pivot().inst;
        self.relevant()
            .iter()
            .map(|acc| {
                let mut h = FNV32_OFFSET;
                h ^= pivot;
                h = h.wrapping_mul(FNV32_PRIME);
                h ^= acc.inst;
                h = h.wrapping_mul(FNV32_PRIME);
                u64::from(h)
            })
            .collect()
    }

    /// Accesses to stall on, in order.
    ///
    /// A load barrier stalls at the call that precedes the critical load,
    /// `call_inst_size` bytes before it, and then at the critical store.
    pub fn schedule(&self, call_inst_size: u32) -> Vec<Access> {
        let c = &self.critical;
        match self.barrier {
            BarrierKind::Store => vec![c.former],
            BarrierKind::Load => {
                let mut call = c.latter;
                call.inst = call.inst.wrapping_sub(call_inst_size);
                vec![call, c.former]
            }
        }
    }

    pub fn sched_points(&self, call_inst_size: u32) -> Vec<SchedPoint> {
        schedule_from_accesses(&self.schedule(call_inst_size))
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sorted = |accs: &[Access]| {
            let mut v = accs.to_vec();
            v.sort_by_key(|acc| acc.timestamp);
            v
        };
        writeln!(f, "type: {}", self.barrier)?;
        writeln!(f, "score: {}", self.score())?;
        writeln!(f, "critical communication")?;
        writeln!(f, " - {}", self.critical)?;
        writeln!(f, "delaying accesses")?;
        for acc in sorted(&self.delaying) {
            writeln!(f, " - {}", acc)?;
        }
        writeln!(f, "following accesses")?;
        for acc in sorted(&self.following) {
            writeln!(f, " - {}", acc)?;
        }
        Ok(())
    }
}

/// The communication a knot asks to reorder.
pub fn critical_communication(knot: &Knot) -> Communication {
    *knot.second()
}

/// Gather every knot whose critical communication matches `critical`.
///
/// Returns the candidate, the knots it was built from, and the rest.
pub fn aggregate(critical: Communication, knots: &[Knot]) -> (Candidate, Vec<Knot>, Vec<Knot>) {
    let hash = critical.content_hash();
    let (collected, remaining): (Vec<Knot>, Vec<Knot>) = knots
        .iter()
        .copied()
        .partition(|knot| critical_communication(knot).content_hash() == hash);
    let candidate = Candidate {
        critical,
        delaying: collected.iter().map(|k| k.first().former).collect(),
        following: collected.iter().map(|k| k.first().latter).collect(),
        barrier: BarrierKind::Store,
    };
    (candidate, collected, remaining)
}

/// Aggregate around a randomly chosen pivot knot.  `None` without knots.
pub fn generate_candidate<R: Rng + ?Sized>(
    rng: &mut R,
    knots: &[Knot],
) -> Option<(Candidate, Vec<Knot>, Vec<Knot>)> {
    if knots.is_empty() {
        return None;
    }
    let pivot = &knots[rng.gen_range(0..knots.len())];
    Some(aggregate(critical_communication(pivot), knots))
}

/// Candidates of `a` whose coverage overlaps the combined coverage of `b`.
pub fn select(a: &[Candidate], b: &[Candidate]) -> Vec<Candidate> {
    let mut covered = Signal::new();
    for cand in b {
        covered.merge(&cand.coverage());
    }
    a.iter()
        .filter(|cand| !covered.intersect(&cand.coverage()).is_empty())
        .cloned()
        .collect()
}
