//! Memory access events recorded by the instrumented kernel.
//!
//! An [`Access`] is the atomic unit of every trace: one load, store, or
//! lock operation executed by one logical thread at one logical
//! timestamp.  The field layout mirrors the fixed-width record handed
//! over by the execution layer, so every field is a plain integer.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════
//  Access kinds
// ═══════════════════════════════════════════════════════════════════════

/// Reserved context value marking an access on the common path of two
/// aligned traces.
pub const COMMON_PATH: u32 = u32::MAX;

/// Width of a memory granule in bytes.  Accesses are bucketed by
/// `addr & !(GRANULE_SIZE - 1)` before forming communications.
pub const GRANULE_SIZE: u32 = 8;

/// Returned when a raw kind discriminant does not name an [`AccessKind`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("unknown access kind discriminant: {0}")]
pub struct UnknownKind(pub u32);

/// What an access did.  Discriminants match the wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u32)]
pub enum AccessKind {
    Load = 0,
    Store = 1,
    LockAcquire = 2,
    LockRelease = 3,
}

impl AccessKind {
    /// Wire discriminant.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Whether this kind touches memory (as opposed to a lock event).
    pub fn is_memory(self) -> bool {
        matches!(self, Self::Load | Self::Store)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Store => "store",
            Self::LockAcquire => "lock-acquire",
            Self::LockRelease => "lock-release",
        }
    }
}

impl TryFrom<u32> for AccessKind {
    type Error = UnknownKind;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Load),
            1 => Ok(Self::Store),
            2 => Ok(Self::LockAcquire),
            3 => Ok(Self::LockRelease),
            other => Err(UnknownKind(other)),
        }
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Access
// ═══════════════════════════════════════════════════════════════════════

/// One observed memory or lock event.
///
/// Two accesses with identical `(inst, addr)` but different timestamps
/// are repeated executions of the same code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Access {
    /// Instruction pointer (lower 32 bits).
    pub inst: u32,
    /// Accessed address (lower 32 bits).  For lock events, the lock id.
    pub addr: u32,
    /// Access width in bytes.
    pub size: u32,
    pub kind: AccessKind,
    /// Logical timestamp; also encodes program order within a thread.
    pub timestamp: u32,
    /// Owning logical thread.
    pub thread: u64,
    /// Call-site context tag.  [`COMMON_PATH`] after alignment marks code
    /// executed by both traces.
    #[serde(default)]
    pub context: u32,
}

impl Access {
    /// Construct an access with a zero context.
    pub fn new(inst: u32, addr: u32, size: u32, kind: AccessKind, timestamp: u32, thread: u64) -> Self {
        Self {
            inst,
            addr,
            size,
            kind,
            timestamp,
            thread,
            context: 0,
        }
    }

    /// Whether the byte ranges `[addr, addr + size)` of both accesses
    /// intersect.
    pub fn overlaps(&self, other: &Access) -> bool {
        let (a0, a1) = (self.addr as u64, self.addr as u64 + self.size as u64);
        let (b0, b1) = (other.addr as u64, other.addr as u64 + other.size as u64);
        a0 < b1 && b0 < a1
    }

    /// Address rounded down to its granule.
    pub fn granule(&self) -> u32 {
        self.addr & !(GRANULE_SIZE - 1)
    }

    pub fn is_memory(&self) -> bool {
        self.kind.is_memory()
    }

    /// Lock id of a lock event (the lock's address).
    pub fn lock_id(&self) -> u32 {
        self.addr
    }

    pub fn on_common_path(&self) -> bool {
        self.context == COMMON_PATH
    }
}

impl Default for Access {
    fn default() -> Self {
        Self::new(0, 0, 0, AccessKind::Load, 0, 0)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "thread #{}: {:x} accesses {:x} (size: {}, kind: {}, timestamp: {})",
            self.thread, self.inst, self.addr, self.size, self.kind, self.timestamp
        )?;
        if self.on_common_path() {
            write!(f, " [common]")?;
        }
        Ok(())
    }
}
