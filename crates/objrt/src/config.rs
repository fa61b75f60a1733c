use std::ops::Range;

use crate::{
    pool::PoolConfig,
    resource::{LimitedTracker, NoLimitTracker, ResourceLimits, ResourceTracker},
};

/// Default interned small-integer range.
pub const DEFAULT_SMALL_INT_RANGE: Range<i32> = 0..256;

/// Largest number of integers the small-object cache will intern.
///
/// A longer [`HeapConfig::small_int_range`] is cut to its first
/// `MAX_SMALL_INT_CACHE` values when the heap is built.
pub const MAX_SMALL_INT_CACHE: usize = 1 << 16;

/// Construction parameters for a [`Heap`](crate::Heap).
///
/// Every field has a default, so a partial JSON or TOML document deserializes:
///
/// ```
/// use objrt::HeapConfig;
///
/// let config: HeapConfig = serde_json::from_str(r#"{"small_int_range": {"start": -5, "end": 257}}"#).unwrap();
/// assert_eq!(config.small_int_range, -5..257);
/// assert_eq!(config.pool.size_classes.as_slice(), &[16, 24]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HeapConfig {
    /// Budget of the underlying allocator and recursion limit.
    pub limits: ResourceLimits,
    /// Size-class pool setup.
    pub pool: PoolConfig,
    /// Integers in this range are interned at heap construction, up to
    /// [`MAX_SMALL_INT_CACHE`] of them.
    pub small_int_range: Range<i32>,
    /// Number of arena slots reserved up front.
    pub initial_capacity: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::new(),
            pool: PoolConfig::default(),
            small_int_range: DEFAULT_SMALL_INT_RANGE,
            initial_capacity: 512,
        }
    }
}

impl HeapConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Sets the interned integer range. An empty range disables small-int
    /// interning; ranges longer than [`MAX_SMALL_INT_CACHE`] are truncated.
    #[must_use]
    pub fn small_int_range(mut self, range: Range<i32>) -> Self {
        self.small_int_range = range;
        self
    }

    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// The range the cache actually interns: `small_int_range` with its end
    /// pulled in so it holds at most [`MAX_SMALL_INT_CACHE`] values.
    pub(crate) fn cached_int_range(&self) -> Range<i32> {
        let Range { start, end } = self.small_int_range.clone();
        let limit = i32::try_from(MAX_SMALL_INT_CACHE).unwrap_or(i32::MAX);
        let capped = start.saturating_add(limit);
        if end > capped {
            log::warn!(
                "small_int_range {start}..{end} exceeds {MAX_SMALL_INT_CACHE} values, interning {start}..{capped}"
            );
            start..capped
        } else {
            start..end
        }
    }

    /// Picks the tracker matching `limits`. [`NoLimitTracker`] already enforces
    /// the default recursion depth, so it covers `ResourceLimits::new()`.
    pub(crate) fn build_tracker(&self) -> Box<dyn ResourceTracker> {
        if self.limits == ResourceLimits::new() {
            Box::new(NoLimitTracker)
        } else {
            Box::new(LimitedTracker::new(self.limits.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_use_the_no_limit_tracker() {
        let tracker = HeapConfig::default().build_tracker();
        assert_eq!(tracker.allocation_count(), None);
    }

    #[test]
    fn any_custom_limit_uses_the_limited_tracker() {
        let config = HeapConfig::new().limits(ResourceLimits::new().max_memory(1024));
        assert_eq!(config.build_tracker().allocation_count(), Some(0));

        let config = HeapConfig::new().limits(ResourceLimits::new().max_recursion_depth(Some(10)));
        assert_eq!(config.build_tracker().allocation_count(), Some(0));
    }

    #[test]
    fn oversized_small_int_range_is_capped() {
        let config = HeapConfig::new().small_int_range(-10..i32::MAX);
        assert_eq!(config.cached_int_range(), -10..65_526);

        let config = HeapConfig::new().small_int_range(i32::MAX - 3..i32::MAX);
        assert_eq!(config.cached_int_range(), i32::MAX - 3..i32::MAX);

        assert_eq!(HeapConfig::new().cached_int_range(), DEFAULT_SMALL_INT_RANGE);
    }
}
