//! Memory-access trace model for the raceknot engine.
//!
//! The instrumented kernel reports every load, store, and lock operation
//! performed by a raced system call as an [`Access`].  Accesses of one
//! logical thread are kept in a timestamp-ordered [`SerialTrace`]; the
//! traces captured from one execution are bundled into a [`TraceLog`]
//! that can be saved, loaded, and parsed from the execution layer's text
//! dump.
//!
//! # Module Structure
//!
//! - [`access`] — The access record, its kinds, overlap and granule helpers
//! - [`serial`] — Sorted per-thread access sequences
//! - [`file`] — JSON and text trace files

pub mod access;
pub mod file;
pub mod serial;

pub use access::{Access, AccessKind, UnknownKind, COMMON_PATH, GRANULE_SIZE};
pub use file::{TraceLog, TraceLogError};
pub use serial::SerialTrace;
