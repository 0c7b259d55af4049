//! Live progress shared across workers: who is building what, and how many
//! tasks remain. The registry's own synchronization is the only locking —
//! callers never wrap it in anything else.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

pub struct ProgressRegistry {
    active: Mutex<BTreeMap<usize, (usize, String)>>,
    remaining: AtomicUsize,
}

impl ProgressRegistry {
    pub fn new(total: usize) -> Self {
        Self {
            active: Mutex::new(BTreeMap::new()),
            remaining: AtomicUsize::new(total),
        }
    }

    /// Publish a worker's current task before it starts executing.
    pub fn begin(&self, worker: usize, index: usize, name: &str) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(worker, (index, name.to_string()));
    }

    /// Remove the worker's entry and decrement the remaining count.
    pub fn finish(&self, worker: usize) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&worker);
        self.remaining.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::SeqCst)
    }

    /// One line per busy worker plus the remaining count, for the progress
    /// display.
    pub fn snapshot(&self) -> String {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = String::new();
        for (worker, (index, name)) in active.iter() {
            out.push_str(&format!("| worker-{worker:03}\t{index}\t{name}\n"));
        }
        out.push_str(&format!("| {} build(s) left", self.remaining()));
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn begin_and_finish_track_remaining() {
        let registry = ProgressRegistry::new(2);
        registry.begin(0, 0, "alpha");
        assert!(registry.snapshot().contains("alpha"));
        assert_eq!(registry.remaining(), 2);

        registry.finish(0);
        assert_eq!(registry.remaining(), 1);
        assert!(!registry.snapshot().contains("alpha"));
    }

    #[test]
    fn concurrent_mutation_is_consistent() {
        let registry = Arc::new(ProgressRegistry::new(64));
        let mut handles = Vec::new();
        for worker in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                for task in 0..8 {
                    registry.begin(worker, task, "repo");
                    registry.finish(worker);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.remaining(), 0);
        assert_eq!(registry.snapshot(), "| 0 build(s) left");
    }
}
