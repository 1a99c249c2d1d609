//! End-to-end driver: traces in, schedule and flush vector out.
//!
//! [`Pipeline::analyze`] aligns and excavates a pair of traces.
//! [`Pipeline::plan`] turns the excavated knots into one concrete [`Plan`]:
//!
//! ```text
//! knots ─▶ novelty filter ─▶ orchestrator rounds ─▶ first schedulable round
//!       ─▶ schedule points ─▶ candidate ─▶ flush vector
//! ```
//!
//! Every stage output is a plain value.  The only state a pipeline keeps
//! is its seeded RNG, so two pipelines with the same seed and inputs
//! produce the same plans.

use crate::align::{align, AlignConfig};
use crate::candidate::{generate_candidate, BarrierKind, Candidate, DEFAULT_CALL_INST_SIZE};
use crate::cover::CoverError;
use crate::dag::{squeeze_sched_points, SchedPoint, Scheduler};
use crate::excavator::{ExcavateError, Excavation, Excavator, ExcavatorConfig};
use crate::flush::{generate_flush_vector, FlushConfig, FlushVector};
use crate::knot::Knot;
use crate::ledger::Ledger;
use crate::orchestrator::Orchestrator;
use crate::segment::Segment;
use crate::signal::{Signal, SignalError};
use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use raceknot_trace::{SerialTrace, TraceLogError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("excavation failed: {0}")]
    Excavate(#[from] ExcavateError),
    #[error("cover encoding: {0}")]
    Cover(#[from] CoverError),
    #[error("signal file: {0}")]
    Signal(#[from] SignalError),
    #[error("trace file: {0}")]
    TraceLog(#[from] TraceLogError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Seed for candidate selection and random flush vectors.
    pub seed: u64,
    pub align: AlignConfig,
    pub excavator: ExcavatorConfig,
    pub flush: FlushConfig,
    pub barrier: BarrierKind,
    /// Byte length of the call instruction before a load's return site.
    pub call_inst_size: u32,
    /// Collapse same-thread runs of schedule points.
    pub squeeze: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            align: AlignConfig::default(),
            excavator: ExcavatorConfig::default(),
            flush: FlushConfig::default(),
            barrier: BarrierKind::Store,
            call_inst_size: DEFAULT_CALL_INST_SIZE,
            squeeze: true,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }
}

/// One concrete attempt at reproducing a race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Knots that survived the novelty filter.
    pub novel: usize,
    /// Orchestrator rounds over the novel knots.
    pub rounds: usize,
    /// The round that was scheduled.
    pub round: Vec<Knot>,
    pub sched_points: Vec<SchedPoint>,
    pub candidate: Candidate,
    /// Points realizing the candidate alone.
    pub candidate_points: Vec<SchedPoint>,
    pub flush_vector: FlushVector,
    /// Signal of the scheduled round.
    pub signal: Signal,
}

impl Plan {
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    excavator: Excavator,
    rng: ChaCha8Rng,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let excavator = Excavator::new(config.excavator.clone());
        Self {
            config,
            excavator,
            rng,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Align two traces onto one clock.
    pub fn align(&self, a: &SerialTrace, b: &SerialTrace) -> (SerialTrace, SerialTrace) {
        align(a, b, &self.config.align)
    }

    /// Align and excavate.  Trace counts other than two are left to the
    /// excavator to judge.
    pub fn analyze(&self, traces: &[SerialTrace]) -> Result<Excavation, PipelineError> {
        let excavation = match traces {
            [a, b] => {
                let (a, b) = self.align(a, b);
                self.excavator.excavate(&[a, b])?
            }
            _ => self.excavator.excavate(traces)?,
        };
        info!(
            "analysis: {} communications, {} knots",
            excavation.communications.len(),
            excavation.knots.len()
        );
        Ok(excavation)
    }

    /// Plan one execution from `knots`.
    ///
    /// Knots already in the ledger are skipped.  The first orchestrator
    /// round that yields a schedule is used, and its signal is recorded in
    /// the ledger.  Returns `None` when nothing novel is schedulable.
    pub fn plan(&mut self, knots: &[Knot], ledger: &Ledger) -> Option<Plan> {
        let fresh = ledger.novel(&Signal::from_segments(knots));
        let mut taken = Signal::new();
        let novel: Vec<Knot> = knots
            .iter()
            .filter(|knot| {
                let hash = knot.content_hash();
                fresh.contains(hash) && taken.insert(hash)
            })
            .copied()
            .collect();
        if novel.is_empty() {
            info!("no novel knots among {}", knots.len());
            return None;
        }

        let rounds = Orchestrator::new(novel.clone()).into_rounds();
        let n_rounds = rounds.len();
        let (round, points) = rounds.into_iter().find_map(|round| {
            let points = Scheduler::new(round.clone()).generate_sched_points()?;
            Some((round, points))
        })?;
        let sched_points = if self.config.squeeze {
            squeeze_sched_points(&points)
        } else {
            points
        };

        let (candidate, collected, _) = generate_candidate(&mut self.rng, &round)?;
        let candidate = candidate.with_barrier(self.config.barrier);
        debug!("candidate aggregates {} knots", collected.len());
        let flush_vector = generate_flush_vector(&candidate, Some(&mut self.rng), &self.config.flush);

        let signal = Signal::from_segments(&round);
        ledger.check_new(&signal);
        info!(
            "planned {} knots ({} novel, {} rounds), {} schedule points",
            round.len(),
            novel.len(),
            n_rounds,
            sched_points.len()
        );

        Some(Plan {
            novel: novel.len(),
            rounds: n_rounds,
            candidate_points: candidate.sched_points(self.config.call_inst_size),
            round,
            sched_points,
            candidate,
            flush_vector,
            signal,
        })
    }
}
