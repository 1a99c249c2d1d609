//! Flush vectors: the delay program handed to the execution layer.
//!
//! A targeted vector is a table keyed by sign-extended instruction
//! pointers.  Value `1` forces a store-buffer flush (or delay) at that
//! instruction, `0` explicitly leaves it alone.  A random vector is a
//! plain list of `0`/`1` decisions used for exploration.

use crate::candidate::{BarrierKind, Candidate};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

const RANDOM_MIN_LEN: usize = 2;
const RANDOM_MAX_LEN: usize = 10;

/// Canonical 64-bit form of a 32-bit kernel instruction pointer.
pub fn sign_extend(inst: u32) -> u64 {
    inst as u64 | 0xffff_ffff_0000_0000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    pub inst: u64,
    pub value: u32,
}

impl fmt::Display for TableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{:#x} {}}}", self.inst, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlushVector {
    Table(Vec<TableEntry>),
    Vector(Vec<u32>),
}

impl FlushVector {
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Table(t) => !t.is_empty(),
            Self::Vector(v) => !v.is_empty(),
        }
    }

    pub fn is_random(&self) -> bool {
        matches!(self, Self::Vector(_))
    }

    /// The plain vector form; empty for a table.
    pub fn serialize_vector(&self) -> &[u32] {
        match self {
            Self::Vector(v) => v,
            Self::Table(_) => &[],
        }
    }

    /// Flat `(inst, value)` pairs of the table form; empty for a vector.
    pub fn serialize_table(&self) -> Vec<u64> {
        match self {
            Self::Table(t) => t.iter().flat_map(|e| [e.inst, e.value as u64]).collect(),
            Self::Vector(_) => Vec::new(),
        }
    }
}

impl fmt::Display for FlushVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table(t) => {
                write!(f, "table [")?;
                for (i, e) in t.iter().enumerate() {
                    if i != 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "]")
            }
            Self::Vector(v) => write!(f, "vector {:?}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    /// Occasionally replace a targeted vector with a random one.
    pub random_reordering: bool,
    /// Chance of that replacement, per thousand.
    pub random_permille: u32,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            random_reordering: true,
            random_permille: 5,
        }
    }
}

/// Build the flush vector for `candidate`.
///
/// Invalid candidates get a random vector, as does a small share of valid
/// ones when `random_reordering` is on.  Without an rng there is no
/// randomness at all: invalid candidates then get the fixed vector `[0, 1]`.
pub fn generate_flush_vector<R: Rng + ?Sized>(
    candidate: &Candidate,
    mut rng: Option<&mut R>,
    config: &FlushConfig,
) -> FlushVector {
    let roll = match rng.as_mut() {
        Some(r) if config.random_reordering => r.gen_range(0..1000u32) < config.random_permille,
        _ => false,
    };
    if !candidate.is_invalid() && !roll {
        return targeted(candidate);
    }
    match rng {
        Some(r) => random_vector(r),
        None => FlushVector::Vector(vec![0, 1]),
    }
}

fn targeted(candidate: &Candidate) -> FlushVector {
    let mut seen = HashSet::new();
    let mut table = Vec::new();
    let mut add = |inst: u32, value: u32| {
        if seen.insert(inst) {
            table.push(TableEntry {
                inst: sign_extend(inst),
                value,
            });
        }
    };
    let (accs, crit) = match candidate.barrier {
        BarrierKind::Store => (&candidate.delaying, candidate.critical.former),
        BarrierKind::Load => (&candidate.following, candidate.critical.latter),
    };
    // a loop can put the critical instruction among the reordered ones;
    // its entry must stay the single `1`
    for acc in accs.iter().filter(|acc| acc.inst != crit.inst) {
        add(acc.inst, 0);
    }
    add(crit.inst, 1);
    FlushVector::Table(table)
}

fn random_vector<R: Rng + ?Sized>(rng: &mut R) -> FlushVector {
    let len = rng.gen_range(RANDOM_MIN_LEN..=RANDOM_MAX_LEN);
    FlushVector::Vector((0..len).map(|_| rng.gen_range(0..=1u32)).collect())
}
