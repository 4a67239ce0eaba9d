//! Garbage collection operations for the Runtime.
//!
//! This module contains:
//! - collect: one full mark-and-sweep cycle over the stack and pin roots
//! - maybe_collect: a cycle only when the allocation budget is spent
//! - check_roots / shutdown: the pre-shutdown consistency check and final cycle

use std::fmt;

use crate::core::heap::HeapStats;
use crate::core::value::Value;
use crate::Runtime;

/// Where the collector is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcPhase {
    #[default]
    Idle,
    /// Root sources are graying the objects they name.
    Premark,
    /// The gray worklist is being drained.
    Mark,
    /// Unreached objects are being finalized and unlinked.
    Sweep,
}

/// Cumulative collector counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub collections: u64,
    pub total_allocated: u64,
    pub total_freed: u64,
    pub peak_live: usize,
    pub last_marked: usize,
    pub last_freed: usize,
}

impl fmt::Display for GcStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== GC Stats ===")?;
        writeln!(f, "Collections:     {:>10}", self.collections)?;
        writeln!(f, "Allocated:       {:>10}", self.total_allocated)?;
        writeln!(f, "Freed:           {:>10}", self.total_freed)?;
        writeln!(f, "Peak live:       {:>10}", self.peak_live)?;
        write!(
            f,
            "Last cycle:      {:>10} marked, {} freed",
            self.last_marked, self.last_freed
        )
    }
}

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionReport {
    /// Objects proven reachable.
    pub marked: usize,
    /// Objects finalized and reclaimed.
    pub freed: usize,
    /// Objects alive after the cycle.
    pub live: usize,
    /// Weak references cleared because their target was reclaimed.
    pub weak_cleared: usize,
}

/// Root sources still holding objects, as seen by the shutdown check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RootReport {
    pub stack_size: usize,
    pub pinned_objects: usize,
    pub outstanding_locks: u64,
}

impl RootReport {
    /// No stack slots in use and no outstanding locks.
    pub fn is_clean(&self) -> bool {
        self.stack_size == 0 && self.pinned_objects == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub roots: RootReport,
    /// Objects finalized by the final cycle.
    pub finalized: usize,
}

pub(crate) struct GcState {
    pub(crate) phase: GcPhase,
    pub(crate) stats: GcStats,
    pub(crate) threshold: usize,
}

impl GcState {
    pub(crate) fn new(threshold: usize) -> Self {
        Self {
            phase: GcPhase::Idle,
            stats: GcStats::default(),
            threshold,
        }
    }

    pub(crate) fn record_allocation(&mut self, live: usize) {
        self.stats.total_allocated += 1;
        self.stats.peak_live = self.stats.peak_live.max(live);
    }
}

impl Runtime {
    #[inline]
    pub fn gc_phase(&self) -> GcPhase {
        self.gc.phase
    }

    #[inline]
    pub fn gc_stats(&self) -> GcStats {
        self.gc.stats
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Allocations since the last cycle that start the next automatic one.
    pub fn gc_threshold(&self) -> usize {
        self.gc.threshold
    }

    pub(crate) fn should_collect(&self) -> bool {
        self.config.auto_collect && self.heap.alloc_count >= self.gc.threshold
    }

    /// Collect if the allocation budget since the last cycle is spent.
    pub fn maybe_collect(&mut self) -> Option<CollectionReport> {
        self.should_collect().then(|| self.collect())
    }

    /// Run one full cycle with the stack and pin table as roots.
    pub fn collect(&mut self) -> CollectionReport {
        self.collect_with_roots(&[])
    }

    /// Run one full cycle, treating `extra_roots` as additional roots.
    ///
    /// Panics if a cycle is already in progress.
    pub(crate) fn collect_with_roots(&mut self, extra_roots: &[Value]) -> CollectionReport {
        assert_eq!(
            self.gc.phase,
            GcPhase::Idle,
            "garbage collection re-entered during {:?}",
            self.gc.phase
        );
        log::debug!(
            "gc #{}: start, {} live objects, {} allocated since last cycle",
            self.gc.stats.collections + 1,
            self.heap.len(),
            self.heap.alloc_count
        );

        self.gc.phase = GcPhase::Premark;
        let pinned = self.pins.roots();
        let mut marked = self.heap.premark(
            &self.types,
            [self.stack.live(), pinned.as_slice(), extra_roots],
        );

        self.gc.phase = GcPhase::Mark;
        marked += self.heap.drain_gray(&self.types);
        debug_assert_eq!(self.heap.gray_len(), 0);

        self.gc.phase = GcPhase::Sweep;
        let types = &self.types;
        let freed = self.heap.sweep(|obj| {
            if let Some(finalize) = types.get(obj.type_id()).finalize_fn() {
                finalize(obj);
            }
        });
        let weak_cleared = self.heap.clear_dead_weak_refs();
        self.gc.phase = GcPhase::Idle;

        let live = self.heap.len();
        self.gc.threshold = self.config.next_threshold(live);
        let stats = &mut self.gc.stats;
        stats.collections += 1;
        stats.total_freed += freed as u64;
        stats.last_marked = marked;
        stats.last_freed = freed;

        log::debug!(
            "gc #{}: done, marked {marked}, freed {freed}, {live} live, next cycle after {} allocations",
            stats.collections,
            self.gc.threshold
        );
        CollectionReport {
            marked,
            freed,
            live,
            weak_cleared,
        }
    }

    /// Report root sources that still hold objects. Leftovers are logged as
    /// warnings, never treated as errors.
    pub fn check_roots(&self) -> RootReport {
        let report = RootReport {
            stack_size: self.stack.size(),
            pinned_objects: self.pins.len(),
            outstanding_locks: self.pins.total_locks(),
        };
        if report.stack_size > 0 {
            log::warn!(
                "stack is not empty at shutdown: {} values still pushed",
                report.stack_size
            );
        }
        if report.pinned_objects > 0 {
            log::warn!(
                "{} objects still locked at shutdown ({} outstanding locks)",
                report.pinned_objects,
                report.outstanding_locks
            );
            for entry in self.pins.iter() {
                log::warn!("  {:?} locked {} times", entry.id(), entry.count());
            }
        }
        report
    }

    /// Run the consistency check, drop all roots, and finalize every
    /// remaining object.
    pub fn shutdown(&mut self) -> ShutdownReport {
        let roots = self.check_roots();
        self.stack.truncate(0);
        self.pins.clear();
        let report = self.collect();
        debug_assert!(self.heap.is_empty());
        self.shut_down = true;
        ShutdownReport {
            roots,
            finalized: report.freed,
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if !self.shut_down && !std::thread::panicking() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "garbage collection re-entered during Mark")]
    fn collecting_during_a_cycle_panics() {
        let mut rt = Runtime::new();
        rt.gc.phase = GcPhase::Mark;
        rt.collect();
    }

    #[test]
    fn phase_returns_to_idle_after_a_cycle() {
        let mut rt = Runtime::new();
        rt.new_list().unwrap();
        assert_eq!(rt.collect().freed, 1);
        assert_eq!(rt.gc_phase(), GcPhase::Idle);
    }
}
