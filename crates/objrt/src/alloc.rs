//! Accounting for the underlying block allocator.
//!
//! The heap's arena holds the actual storage; this module decides whether a
//! fresh block may be taken (by charging the [`ResourceTracker`]) and keeps the
//! counters the pool-reuse and leak checks rely on. Blocks parked in a
//! size-class pool have not been returned here and still count as live.

use crate::resource::{NoLimitTracker, ResourceError, ResourceTracker};

/// Counters kept by the underlying allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Blocks currently held (live objects plus pooled blocks).
    pub live_blocks: usize,
    /// High-water mark of `live_blocks`.
    pub peak_blocks: usize,
    /// Bytes currently held.
    pub live_bytes: usize,
    /// High-water mark of `live_bytes`.
    pub peak_bytes: usize,
    /// Fresh blocks handed out over the heap's lifetime.
    pub total_allocations: usize,
    /// Blocks given back over the heap's lifetime.
    pub total_frees: usize,
}

#[derive(Debug)]
pub(crate) struct BlockAllocator {
    tracker: Box<dyn ResourceTracker>,
    stats: AllocatorStats,
}

impl BlockAllocator {
    pub fn new(tracker: Box<dyn ResourceTracker>) -> Self {
        Self {
            tracker,
            stats: AllocatorStats::default(),
        }
    }

    /// Takes a fresh block of `size` bytes, or fails when the tracker's budget is spent.
    pub fn allocate(&mut self, size: usize) -> Result<(), ResourceError> {
        self.tracker.on_allocate(size)?;
        let stats = &mut self.stats;
        stats.live_blocks += 1;
        stats.live_bytes += size;
        stats.total_allocations += 1;
        stats.peak_blocks = stats.peak_blocks.max(stats.live_blocks);
        stats.peak_bytes = stats.peak_bytes.max(stats.live_bytes);
        Ok(())
    }

    /// Returns a block of `size` bytes.
    pub fn deallocate(&mut self, size: usize) {
        self.tracker.on_free(size);
        let stats = &mut self.stats;
        stats.live_blocks = stats.live_blocks.saturating_sub(1);
        stats.live_bytes = stats.live_bytes.saturating_sub(size);
        stats.total_frees += 1;
    }

    pub fn stats(&self) -> AllocatorStats {
        self.stats
    }

    pub fn tracker(&self) -> &dyn ResourceTracker {
        self.tracker.as_ref()
    }

    /// Replaces the tracker. Only sound while no fresh block is outstanding,
    /// since the new tracker has not been charged for earlier blocks.
    pub fn set_tracker(&mut self, tracker: Box<dyn ResourceTracker>) {
        debug_assert_eq!(self.stats.live_blocks, 0, "tracker replaced with blocks outstanding");
        self.tracker = tracker;
    }
}

impl Default for BlockAllocator {
    fn default() -> Self {
        Self::new(Box::new(NoLimitTracker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{LimitedTracker, ResourceLimits};

    #[test]
    fn peak_tracks_high_water_mark() {
        let mut alloc = BlockAllocator::default();
        alloc.allocate(16).unwrap();
        alloc.allocate(24).unwrap();
        alloc.deallocate(16);
        alloc.allocate(16).unwrap();
        let stats = alloc.stats();
        assert_eq!(stats.live_blocks, 2);
        assert_eq!(stats.peak_blocks, 2);
        assert_eq!(stats.live_bytes, 40);
        assert_eq!(stats.peak_bytes, 40);
        assert_eq!(stats.total_allocations, 3);
        assert_eq!(stats.total_frees, 1);
    }

    #[test]
    fn refused_block_leaves_counters_untouched() {
        let limits = ResourceLimits::new().max_allocations(1);
        let mut alloc = BlockAllocator::new(Box::new(LimitedTracker::new(limits)));
        alloc.allocate(16).unwrap();
        assert!(alloc.allocate(16).is_err());
        assert_eq!(alloc.stats().live_blocks, 1);
        assert_eq!(alloc.stats().total_allocations, 1);
        assert_eq!(alloc.tracker().allocation_count(), Some(1));
    }
}
