//! Knot excavation: from two aligned traces to classified race candidates.
//!
//! The pipeline runs in fixed stages:
//!
//! 1. keep only memory that some thread stores to (communication channels)
//! 2. optionally keep only selected dynamic instances of each instruction
//! 3. annotate every memory access with the locks its thread holds
//! 4. pair conflicting cross-thread accesses into communications
//! 5. pair communications into knots and keep the schedulable ones
//!
//! Inputs should come out of [`crate::align::align`]; the excavator trusts
//! timestamps to be one global clock.

use crate::communication::Communication;
use crate::knot::{Knot, KnotKind};
use crate::segment::Segment;
use crate::signal::Signal;
use log::{debug, warn};
use raceknot_trace::{Access, AccessKind, SerialTrace};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExcavateError {
    #[error("expected two traces, got {0}")]
    TooManyTraces(usize),
}

/// Excavation options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcavatorConfig {
    /// Renumber the owning thread of trace `i` to `i`.
    pub reassign_thread_id: bool,
    /// Only form communications in their observed direction.
    pub strict_timestamp: bool,
    /// Keep only `Parallel` knots.
    pub want_parallel_only: bool,
    /// Reject communications protected by a common lock.
    pub lock_aware: bool,
    /// Keep only the k-th executions (1-based) of each instruction.  Empty
    /// keeps every execution.
    pub loop_allowed: Vec<u32>,
}

impl Default for ExcavatorConfig {
    fn default() -> Self {
        Self {
            reassign_thread_id: true,
            strict_timestamp: false,
            want_parallel_only: false,
            lock_aware: true,
            loop_allowed: Vec::new(),
        }
    }
}

/// Everything the excavator found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Excavation {
    pub communications: Vec<Communication>,
    pub knots: Vec<Knot>,
}

impl Excavation {
    pub fn is_empty(&self) -> bool {
        self.knots.is_empty()
    }

    /// Coverage signal of the knots.
    pub fn signal(&self) -> Signal {
        Signal::from_segments(&self.knots)
    }

    pub fn communication_signal(&self) -> Signal {
        Signal::from_segments(&self.communications)
    }
}

/// A memory access plus the locks its thread held at the time.
#[derive(Debug, Clone)]
struct Annotated {
    acc: Access,
    locks: Vec<u32>,
}

pub struct Excavator {
    config: ExcavatorConfig,
}

impl Excavator {
    pub fn new(config: ExcavatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExcavatorConfig {
        &self.config
    }

    /// Excavate knots from a pair of traces.
    ///
    /// Fewer than two traces cannot race and yield an empty excavation.
    pub fn excavate(&self, traces: &[SerialTrace]) -> Result<Excavation, ExcavateError> {
        if traces.len() > 2 {
            warn!("refusing to excavate {} traces", traces.len());
            return Err(ExcavateError::TooManyTraces(traces.len()));
        }
        if traces.len() < 2 {
            debug!("nothing to excavate from {} trace(s)", traces.len());
            return Ok(Excavation::default());
        }

        let mut traces = traces.to_vec();
        if self.config.reassign_thread_id {
            for (i, serial) in traces.iter_mut().enumerate() {
                serial.reassign_thread(i as u64);
            }
        }

        let channels = comm_channels(&traces);
        let annotated: Vec<Vec<Annotated>> = traces
            .iter()
            .map(|serial| self.annotate(&self.distill(serial, &channels)))
            .collect();

        let (communications, contending) = self.form_communications(&annotated);
        let knots = self.form_knots(&communications, &contending);
        debug!(
            "excavated {} communications over {} channels, {} knots",
            communications.len(),
            channels.len(),
            knots.len()
        );
        Ok(Excavation {
            communications,
            knots,
        })
    }

    /// Drop memory accesses outside the communication channels and
    /// dynamic instances not in `loop_allowed`.  Lock events stay.
    fn distill(&self, serial: &SerialTrace, channels: &HashSet<u32>) -> Vec<Access> {
        let mut seen: HashMap<u32, u32> = HashMap::new();
        let mut out = Vec::with_capacity(serial.len());
        for acc in serial {
            if !acc.is_memory() {
                out.push(*acc);
                continue;
            }
            if !channels.contains(&acc.granule()) {
                continue;
            }
            let count = seen.entry(acc.inst).or_insert(0);
            *count += 1;
            if self.config.loop_allowed.is_empty() || self.config.loop_allowed.contains(count) {
                out.push(*acc);
            }
        }
        out
    }

    /// Attach the held lock set to every memory access.
    ///
    /// Lock events form a stack unless a trylock acquire went unrecorded;
    /// a release that matches nothing on the stack clears it.
    fn annotate(&self, accesses: &[Access]) -> Vec<Annotated> {
        let mut held: Vec<u32> = Vec::new();
        let mut out = Vec::with_capacity(accesses.len());
        for acc in accesses {
            match acc.kind {
                AccessKind::Load | AccessKind::Store => out.push(Annotated {
                    acc: *acc,
                    locks: if self.config.lock_aware {
                        held.clone()
                    } else {
                        Vec::new()
                    },
                }),
                AccessKind::LockAcquire => held.push(acc.lock_id()),
                AccessKind::LockRelease => match held.iter().rposition(|&l| l == acc.lock_id()) {
                    Some(pos) => held.truncate(pos),
                    None => held.clear(),
                },
            }
        }
        out
    }

    /// Pair conflicting accesses per granule.  Returns the deduplicated
    /// communications and, for each, whether it is lock-contending.
    fn form_communications(&self, annotated: &[Vec<Annotated>]) -> (Vec<Communication>, Vec<bool>) {
        let mut granules: BTreeMap<u32, Vec<&Annotated>> = BTreeMap::new();
        for entry in annotated.iter().flatten() {
            granules.entry(entry.acc.granule()).or_default().push(entry);
        }

        let mut seen = HashSet::new();
        let mut comms = Vec::new();
        let mut contending = Vec::new();
        let mut emit = |comm: Communication, locked: bool| {
            if seen.insert(comm.content_hash()) {
                comms.push(comm);
                contending.push(locked);
            }
        };

        for entries in granules.values() {
            for (i, x) in entries.iter().enumerate() {
                for y in &entries[i + 1..] {
                    let (mut a, mut b) = (*x, *y);
                    if a.acc.thread == b.acc.thread {
                        continue;
                    }
                    if a.acc.kind == AccessKind::Load && b.acc.kind == AccessKind::Load {
                        continue;
                    }
                    if !a.acc.overlaps(&b.acc) {
                        continue;
                    }
                    if a.acc.timestamp > b.acc.timestamp {
                        std::mem::swap(&mut a, &mut b);
                    }
                    let locked = lock_contending(a, b);
                    emit(Communication::new(a.acc, b.acc), locked);
                    if !self.config.strict_timestamp {
                        emit(Communication::new(b.acc, a.acc), locked);
                    }
                }
            }
        }
        (comms, contending)
    }

    fn form_knots(&self, comms: &[Communication], contending: &[bool]) -> Vec<Knot> {
        let mut seen = HashSet::new();
        let mut knots = Vec::new();
        let mut counts: HashMap<KnotKind, usize> = HashMap::new();

        for i in 0..comms.len() {
            for j in (i + 1)..comms.len() {
                let (mut c0, mut c1) = (comms[i], comms[j]);
                if c0.same_accesses(&c1) {
                    continue;
                }
                if c1.former.timestamp < c0.former.timestamp {
                    std::mem::swap(&mut c0, &mut c1);
                }
                let knot = Knot::new(c0, c1);
                let kind = if contending[i] || contending[j] || !knot.contexts_compatible() {
                    KnotKind::Invalid
                } else {
                    knot.kind()
                };
                *counts.entry(kind).or_insert(0) += 1;

                let wanted = if self.config.want_parallel_only {
                    kind == KnotKind::Parallel
                } else {
                    kind.is_target()
                };
                if wanted && seen.insert(knot.content_hash()) {
                    knots.push(knot);
                }
            }
        }
        debug!("knot kinds: {:?}", counts);
        knots
    }
}

/// Granules written by at least one store.
fn comm_channels(traces: &[SerialTrace]) -> HashSet<u32> {
    traces
        .iter()
        .flatten()
        .filter(|acc| acc.kind == AccessKind::Store)
        .map(Access::granule)
        .collect()
}

/// Both accesses hold a common lock and neither is on the common path.
fn lock_contending(a: &Annotated, b: &Annotated) -> bool {
    if a.acc.on_common_path() || b.acc.on_common_path() {
        return false;
    }
    a.locks.iter().any(|l| b.locks.contains(l))
}
