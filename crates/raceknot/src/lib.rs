//! Race excavation and interleaving control for kernel concurrency fuzzing.
//!
//! Given the memory-access traces of two system calls that ran
//! concurrently, this crate finds the cross-thread orderings that program
//! order leaves open, decides which of them are worth reproducing, and
//! turns a chosen one into a concrete schedule plus a flush vector that
//! steers store-buffer behavior on the next execution.
//!
//! # Architecture
//!
//! ```text
//! 1. Align the two traces onto one logical clock (LCS over instructions)
//! 2. Excavate communications (cross-thread conflicting access pairs)
//! 3. Pair communications into knots and classify them
//! 4. Drop knots the shared ledger has already seen
//! 5. Group the rest into conflict-free rounds
//! 6. Topologically sort a round into schedule points
//! 7. Aggregate knots into a candidate and emit its flush vector
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use raceknot::ledger::Ledger;
//! use raceknot::pipeline::{Pipeline, PipelineConfig};
//! use raceknot::report::format_plan;
//! use raceknot_trace::TraceLog;
//! use std::path::Path;
//!
//! let log = TraceLog::load_any(Path::new("traces.txt")).unwrap();
//! let mut pipeline = Pipeline::new(PipelineConfig::default());
//! let excavation = pipeline.analyze(&log.serials).unwrap();
//!
//! let ledger = Ledger::new();
//! if let Some(plan) = pipeline.plan(&excavation.knots, &ledger) {
//!     println!("{}", format_plan(&plan));
//! }
//! ```
//!
//! # Module Structure
//!
//! - [`communication`] — Ordered cross-thread access pairs
//! - [`knot`] — Communication pairs and their classification
//! - [`segment`] — Content hashes for deduplication and coverage
//! - [`cover`] — Flat `u32` knot encoding for the execution layer
//! - [`align`] — LCS alignment of two traces onto one clock
//! - [`excavator`] — Communication and knot discovery
//! - [`signal`] — Sets of segment hashes
//! - [`ledger`] — Corpus-wide signal shared between workers
//! - [`orchestrator`] — Conflict-free rounds of knots
//! - [`dag`] — Schedule points by topological sort
//! - [`candidate`] — Critical communications and their reordered accesses
//! - [`flush`] — Flush-vector generation
//! - [`pipeline`] — Stage-by-stage driver
//! - [`report`] — Human-readable summaries

pub mod align;
pub mod candidate;
pub mod communication;
pub mod cover;
pub mod dag;
pub mod excavator;
pub mod flush;
pub mod knot;
pub mod ledger;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod segment;
pub mod signal;

pub use communication::Communication;
pub use knot::{Knot, KnotKind};
pub use segment::Segment;
pub use signal::Signal;
