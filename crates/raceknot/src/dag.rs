//! Schedule points from selected knots.
//!
//! The knots of one harmonious round are turned into a dependency graph:
//! nodes are the accesses they touch, edges are program order within each
//! thread plus `former -> latter` for every communication.  A topological
//! order of that graph is a schedule that realizes every selected
//! communication at once.  A cycle means the round is self-contradictory
//! and no schedule exists.

use crate::knot::Knot;
use log::debug;
use raceknot_trace::Access;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A position in the enforced global order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchedPoint {
    pub thread: u64,
    pub inst: u32,
    pub order: u64,
}

impl fmt::Display for SchedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} thread {} @ {:x}", self.order, self.thread, self.inst)
    }
}

/// Node identity and tie-break order.
type NodeKey = (u32, u64, u32);

fn key(acc: &Access) -> NodeKey {
    (acc.timestamp, acc.thread, acc.inst)
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    knots: Vec<Knot>,
}

impl Scheduler {
    pub fn new(knots: Vec<Knot>) -> Self {
        Self { knots }
    }

    pub fn knots(&self) -> &[Knot] {
        &self.knots
    }

    /// Topologically order the accesses of the selected knots.
    ///
    /// Ready nodes are taken smallest `(timestamp, thread, inst)` first,
    /// so the result is deterministic.  Returns `None` on a cycle.
    pub fn generate_sched_points(&self) -> Option<Vec<SchedPoint>> {
        // BTreeMap order doubles as node index order.
        let mut index: BTreeMap<NodeKey, usize> = BTreeMap::new();
        for knot in &self.knots {
            for acc in knot.accesses() {
                index.insert(key(&acc), 0);
            }
        }
        for (i, slot) in index.values_mut().enumerate() {
            *slot = i;
        }
        let nodes: Vec<NodeKey> = index.keys().copied().collect();

        let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); nodes.len()];

        let mut per_thread: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        for (i, &(_, thread, _)) in nodes.iter().enumerate() {
            per_thread.entry(thread).or_default().push(i);
        }
        for ids in per_thread.values() {
            for w in ids.windows(2) {
                if nodes[w[0]].0 != nodes[w[1]].0 {
                    edges[w[0]].insert(w[1]);
                }
            }
        }

        for knot in &self.knots {
            for comm in knot.communications() {
                let from = index.get(&key(&comm.former));
                let to = index.get(&key(&comm.latter));
                if let (Some(&from), Some(&to)) = (from, to) {
                    edges[from].insert(to);
                }
            }
        }

        let mut indegree = vec![0usize; nodes.len()];
        for targets in &edges {
            for &t in targets {
                indegree[t] += 1;
            }
        }
        let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
        let mut points = Vec::with_capacity(nodes.len());

        while let Some(n) = ready.pop_first() {
            let (_, thread, inst) = nodes[n];
            points.push(SchedPoint {
                thread,
                inst,
                order: points.len() as u64,
            });
            for &t in &edges[n] {
                indegree[t] -= 1;
                if indegree[t] == 0 {
                    ready.insert(t);
                }
            }
        }

        if points.len() != nodes.len() {
            debug!(
                "unschedulable: cycle among {} of {} accesses",
                nodes.len() - points.len(),
                nodes.len()
            );
            return None;
        }
        Some(points)
    }
}

/// Collapse each run of same-thread points to its last point.
///
/// Only thread switches need an injected delay.  Orders are renumbered
/// densely from zero.
pub fn squeeze_sched_points(points: &[SchedPoint]) -> Vec<SchedPoint> {
    let mut out: Vec<SchedPoint> = Vec::with_capacity(points.len());
    for (i, point) in points.iter().enumerate() {
        let next_same = points
            .get(i + 1)
            .map_or(false, |next| next.thread == point.thread);
        if !next_same {
            out.push(*point);
        }
    }
    for (order, point) in out.iter_mut().enumerate() {
        point.order = order as u64;
    }
    out
}

/// Schedule points for an already ordered list of accesses.
pub fn schedule_from_accesses(accesses: &[Access]) -> Vec<SchedPoint> {
    accesses
        .iter()
        .enumerate()
        .map(|(order, acc)| SchedPoint {
            thread: acc.thread,
            inst: acc.inst,
            order: order as u64,
        })
        .collect()
}
