//! Read accounting and fault injection for storage handles.

use std::io;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// A thread-safe container for read statistics of one storage handle.
#[derive(Debug, Default)]
pub struct ReadStats {
    /// Calls to a `read` entry point.
    pub reads: AtomicU64,
    /// Batches handed out by the resulting streams.
    pub batches: AtomicU64,
    /// Rows across those batches.
    pub rows: AtomicU64,
}

/// Point-in-time copy of [`ReadStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStatsSnapshot {
    pub reads: u64,
    pub batches: u64,
    pub rows: u64,
}

impl ReadStats {
    pub fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self, rows: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.rows.fetch_add(rows as u64, Ordering::Relaxed);
    }

    /// Capture a point-in-time snapshot of the accumulated metrics.
    pub fn snapshot(&self) -> ReadStatsSnapshot {
        ReadStatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            rows: self.rows.load(Ordering::Relaxed),
        }
    }

    /// Reset all statistics to zero.
    pub fn reset(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.batches.store(0, Ordering::Relaxed);
        self.rows.store(0, Ordering::Relaxed);
    }
}

/// Makes the next `n` reads of a handle fail with an I/O error.
#[derive(Debug, Default)]
pub struct FaultInjector {
    pending: AtomicU32,
}

impl FaultInjector {
    pub fn fail_next(&self, n: u32) {
        self.pending.store(n, Ordering::SeqCst);
    }

    /// Consume one pending failure, if any.
    pub fn check(&self, what: &str) -> io::Result<()> {
        let took = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            tracing::debug!(handle = what, "injected storage failure");
            return Err(io::Error::other(format!("injected failure reading {what}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_are_consumed_one_at_a_time() {
        let faults = FaultInjector::default();
        assert!(faults.check("obs").is_ok());
        faults.fail_next(2);
        assert!(faults.check("obs").is_err());
        assert!(faults.check("obs").is_err());
        assert!(faults.check("obs").is_ok());
    }

    #[test]
    fn stats_snapshot_and_reset() {
        let stats = ReadStats::default();
        stats.record_read();
        stats.record_batch(10);
        stats.record_batch(5);
        assert_eq!(
            stats.snapshot(),
            ReadStatsSnapshot {
                reads: 1,
                batches: 2,
                rows: 15
            }
        );
        stats.reset();
        assert_eq!(stats.snapshot(), ReadStatsSnapshot::default());
    }
}
