//! Grouping knots into mutually compatible rounds.
//!
//! One execution can only enforce communications that do not contradict
//! each other.  The orchestrator greedily packs knots into such rounds.

use crate::communication::Communication;
use crate::knot::Knot;
use log::debug;

#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    remaining: Vec<Knot>,
}

impl Orchestrator {
    pub fn new(knots: Vec<Knot>) -> Self {
        Self { remaining: knots }
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    pub fn remaining(&self) -> &[Knot] {
        &self.remaining
    }

    /// Take the next round of harmonious knots.
    ///
    /// Knots are visited in input order.  A knot joins the round when
    /// neither of its communications conflicts with one already claimed;
    /// otherwise it waits for a later round.  The first remaining knot is
    /// always taken, so every call makes progress.
    pub fn select_harmonious_knots(&mut self) -> Vec<Knot> {
        let mut claimed: Vec<Communication> = Vec::new();
        let mut round = Vec::new();
        let mut deferred = Vec::new();

        for knot in self.remaining.drain(..) {
            if harmonious(&knot, &claimed) {
                claimed.extend_from_slice(knot.communications());
                round.push(knot);
            } else {
                deferred.push(knot);
            }
        }
        self.remaining = deferred;
        debug!(
            "selected {} harmonious knots, {} deferred",
            round.len(),
            self.remaining.len()
        );
        round
    }

    /// Drain every round.
    pub fn into_rounds(mut self) -> Vec<Vec<Knot>> {
        let mut rounds = Vec::new();
        while !self.is_empty() {
            rounds.push(self.select_harmonious_knots());
        }
        rounds
    }
}

fn harmonious(knot: &Knot, claimed: &[Communication]) -> bool {
    claimed.iter().all(|c| {
        knot.communications()
            .iter()
            .all(|k| !k.conflict(c) && !c.conflict(k))
    })
}
