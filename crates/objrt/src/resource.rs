use std::fmt;

/// Recommended maximum recursion depth if not otherwise specified.
///
/// Recursive runtime helpers such as `fib` recurse on the native stack, and a
/// level costs several dispatch frames, so this stays well inside a 2 MiB
/// thread stack in debug builds.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 200;

/// Error returned when a resource limit is exceeded.
///
/// This is the "out of memory" leg of the error taxonomy: the underlying
/// allocator refuses a block once the configured budget is spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Maximum number of live blocks exceeded.
    Allocation { limit: usize, count: usize },
    /// Maximum memory usage exceeded.
    Memory { limit: usize, used: usize },
    /// Maximum recursion depth exceeded.
    Recursion { limit: usize, depth: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => {
                write!(f, "allocation limit exceeded: {count} > {limit}")
            }
            Self::Memory { limit, used } => {
                write!(f, "memory limit exceeded: {used} bytes > {limit} bytes")
            }
            Self::Recursion { .. } => {
                write!(f, "maximum recursion depth exceeded")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

/// Trait for tracking resource usage of the underlying allocator.
///
/// The heap consults the tracker only when it needs a fresh block. Blocks
/// handed out from a size-class pool were already charged when they were first
/// allocated and are not charged again.
///
/// The trait is object safe: the heap stores its tracker as `Box<dyn ResourceTracker>`
/// so capability-table function pointers can take a single concrete `Heap`.
pub trait ResourceTracker: fmt::Debug {
    /// Called before each fresh block allocation.
    ///
    /// Returns `Ok(())` if the allocation should proceed, or `Err(ResourceError)`
    /// if a limit would be exceeded.
    ///
    /// # Arguments
    /// * `size` - Size in bytes of the requested block
    fn on_allocate(&mut self, size: usize) -> Result<(), ResourceError>;

    /// Called when a block is returned to the underlying allocator.
    ///
    /// # Arguments
    /// * `size` - Size in bytes of the freed block
    fn on_free(&mut self, size: usize);

    /// Called before entering one more level of runtime recursion.
    ///
    /// # Arguments
    /// * `current_depth` - Depth before the new level is entered
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError>;

    /// Returns the number of live blocks tracked, if this tracker records them.
    ///
    /// `LimitedTracker` returns `Some(count)`; `NoLimitTracker` returns `None`.
    fn allocation_count(&self) -> Option<usize> {
        None
    }

    /// Returns the current memory usage in bytes, if tracked.
    ///
    /// `LimitedTracker` returns `Some(bytes)`; `NoLimitTracker` returns `None`.
    fn current_memory_bytes(&self) -> Option<usize> {
        None
    }
}

/// A resource tracker that never refuses an allocation.
///
/// Only the default recursion limit is enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_allocate(&mut self, _size: usize) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn on_free(&mut self, _size: usize) {}

    #[inline]
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if current_depth >= DEFAULT_MAX_RECURSION_DEPTH {
            Err(ResourceError::Recursion {
                limit: DEFAULT_MAX_RECURSION_DEPTH,
                depth: current_depth + 1,
            })
        } else {
            Ok(())
        }
    }
}

/// Configuration for resource limits.
///
/// All limits are optional - set to `None` to disable a specific limit.
/// Use `ResourceLimits::default()` for no limits, or build custom limits
/// with the builder pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceLimits {
    /// Maximum number of live blocks held from the underlying allocator.
    pub max_allocations: Option<usize>,
    /// Maximum live memory in bytes.
    pub max_memory: Option<usize>,
    /// Maximum recursion depth for recursive runtime helpers.
    pub max_recursion_depth: Option<usize>,
}

impl ResourceLimits {
    /// Creates a new ResourceLimits with all limits disabled, except max recursion which is set to
    /// [`DEFAULT_MAX_RECURSION_DEPTH`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_recursion_depth: Some(DEFAULT_MAX_RECURSION_DEPTH),
            ..Default::default()
        }
    }

    /// Sets the maximum number of live blocks.
    #[must_use]
    pub fn max_allocations(mut self, limit: usize) -> Self {
        self.max_allocations = Some(limit);
        self
    }

    /// Sets the maximum memory usage in bytes.
    #[must_use]
    pub fn max_memory(mut self, limit: usize) -> Self {
        self.max_memory = Some(limit);
        self
    }

    /// Sets the maximum recursion depth.
    #[must_use]
    pub fn max_recursion_depth(mut self, limit: Option<usize>) -> Self {
        self.max_recursion_depth = limit;
        self
    }
}

/// A resource tracker that enforces configurable limits.
///
/// Counts live blocks and bytes, returning errors when a limit would be exceeded.
#[derive(Debug, Clone)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    /// Number of blocks currently held from the underlying allocator.
    allocation_count: usize,
    /// Current memory usage in bytes.
    current_memory: usize,
}

impl LimitedTracker {
    /// Creates a new LimitedTracker with the given limits.
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            allocation_count: 0,
            current_memory: 0,
        }
    }

    /// Returns the configured limits.
    #[must_use]
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self, size: usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_allocations
            && self.allocation_count >= max
        {
            return Err(ResourceError::Allocation {
                limit: max,
                count: self.allocation_count + 1,
            });
        }

        if let Some(max) = self.limits.max_memory {
            let new_memory = self.current_memory + size;
            if new_memory > max {
                return Err(ResourceError::Memory {
                    limit: max,
                    used: new_memory,
                });
            }
        }

        self.allocation_count += 1;
        self.current_memory += size;
        Ok(())
    }

    fn on_free(&mut self, size: usize) {
        self.allocation_count = self.allocation_count.saturating_sub(1);
        self.current_memory = self.current_memory.saturating_sub(size);
    }

    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_recursion_depth
            && current_depth >= max
        {
            return Err(ResourceError::Recursion {
                limit: max,
                depth: current_depth + 1,
            });
        }
        Ok(())
    }

    fn allocation_count(&self) -> Option<usize> {
        Some(self.allocation_count)
    }

    fn current_memory_bytes(&self) -> Option<usize> {
        Some(self.current_memory)
    }
}
