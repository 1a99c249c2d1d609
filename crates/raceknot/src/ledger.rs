//! Corpus-wide interleaving coverage shared between workers.
//!
//! The ledger tracks three signals: `max` (everything ever observed),
//! `corpus` (what the saved corpus covers), and `new` (observed since the
//! last [`Ledger::grab_new`]).  All three sit behind one `RwLock` so that
//! readers never see them out of step.

use crate::signal::Signal;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct State {
    max: Signal,
    corpus: Signal,
    new: Signal,
}

/// Signal sizes at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub max: usize,
    pub corpus: usize,
    pub new: usize,
}

#[derive(Debug, Default)]
pub struct Ledger {
    state: RwLock<State>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking writer can only leave a signal partially merged, which
    // is still a valid set.
    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hashes in `sig` never seen before.
    pub fn novel(&self, sig: &Signal) -> Signal {
        self.read().max.diff(sig)
    }

    /// Record `sig`; returns whether any of it was new.
    pub fn check_new(&self, sig: &Signal) -> bool {
        let mut state = self.write();
        let diff = state.max.diff(sig);
        if diff.is_empty() {
            return false;
        }
        info!("new interleaving signal: {} hashes", diff.len());
        state.max.merge(&diff);
        state.new.merge(&diff);
        true
    }

    pub fn add_to_corpus(&self, sig: &Signal) {
        let mut state = self.write();
        state.corpus.merge(sig);
        state.max.merge(sig);
        debug!("corpus signal: {} hashes", state.corpus.len());
    }

    /// Take the signal gathered since the last call.
    pub fn grab_new(&self) -> Signal {
        std::mem::take(&mut self.write().new)
    }

    /// Merge signal learned elsewhere (for example from a manager) without
    /// reporting it as new.
    pub fn merge_max(&self, sig: &Signal) {
        self.write().max.merge(sig);
    }

    pub fn max_signal(&self) -> Signal {
        self.read().max.clone()
    }

    pub fn corpus_signal(&self) -> Signal {
        self.read().corpus.clone()
    }

    pub fn snapshot(&self) -> LedgerStats {
        let state = self.read();
        LedgerStats {
            max: state.max.len(),
            corpus: state.corpus.len(),
            new: state.new.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn sig(v: &[u64]) -> Signal {
        v.iter().copied().collect()
    }

    #[test]
    fn check_new_reports_once() {
        let ledger = Ledger::new();
        assert!(ledger.check_new(&sig(&[1, 2])));
        assert!(!ledger.check_new(&sig(&[1, 2])));
        assert!(ledger.check_new(&sig(&[2, 3])));
        assert_eq!(
            ledger.snapshot(),
            LedgerStats {
                max: 3,
                corpus: 0,
                new: 3
            }
        );
    }

    #[test]
    fn novel_does_not_record() {
        let ledger = Ledger::new();
        ledger.merge_max(&sig(&[1]));
        assert_eq!(ledger.novel(&sig(&[1, 2])), sig(&[2]));
        assert_eq!(ledger.novel(&sig(&[1, 2])), sig(&[2]));
        assert_eq!(ledger.snapshot().new, 0);
    }

    #[test]
    fn grab_new_resets() {
        let ledger = Ledger::new();
        ledger.check_new(&sig(&[5, 6]));
        assert_eq!(ledger.grab_new(), sig(&[5, 6]));
        assert!(ledger.grab_new().is_empty());
        assert_eq!(ledger.snapshot().max, 2);
    }

    #[test]
    fn corpus_feeds_max() {
        let ledger = Ledger::new();
        ledger.add_to_corpus(&sig(&[7]));
        assert!(!ledger.check_new(&sig(&[7])));
        assert_eq!(ledger.corpus_signal(), sig(&[7]));
        assert_eq!(ledger.max_signal(), sig(&[7]));
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let ledger = Arc::new(Ledger::new());
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    let mut fresh = 0;
                    for i in 0..100u64 {
                        // every writer offers the same hashes
                        if ledger.check_new(&sig(&[i])) {
                            fresh += 1;
                        }
                        let _ = ledger.novel(&sig(&[i, 1000 + t]));
                    }
                    fresh
                })
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 100);
        assert_eq!(ledger.snapshot().max, 100);
    }
}
