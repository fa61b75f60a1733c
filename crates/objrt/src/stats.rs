use std::{collections::BTreeMap, fmt};

/// Snapshot of heap state at a point in time.
///
/// Used for leak checks: take one snapshot before a computation and one after,
/// then compare them with [`HeapStats::diff`].
///
/// The `objects_by_type` map uses `BTreeMap` for deterministic iteration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Live objects on the heap, interned singletons included.
    pub live_objects: usize,
    /// Live objects owned by the small-object cache.
    pub immortal_objects: usize,
    /// Freed blocks parked in size-class pools.
    pub pooled_blocks: usize,
    /// Slots returned to the underlying allocator and available for reuse.
    pub vacant_slots: usize,
    /// Total arena slots (live + pooled + vacant).
    pub total_slots: usize,
    /// Live objects keyed by type name.
    pub objects_by_type: BTreeMap<&'static str, usize>,
    /// Unchecked releases that hit a bookkeeping inconsistency and were ignored.
    pub invariant_violations: usize,
    /// Resource tracker allocation count, if using `LimitedTracker`.
    pub tracker_allocations: Option<usize>,
    /// Resource tracker memory usage in bytes, if using `LimitedTracker`.
    pub tracker_memory_bytes: Option<usize>,
}

/// Difference between two heap snapshots.
///
/// Positive deltas mean growth from "before" to "after". Types exclusive to
/// the "after" snapshot are listed in `new_types`; types exclusive to "before"
/// are in `removed_types`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapDiff {
    pub live_objects_delta: isize,
    pub pooled_blocks_delta: isize,
    pub vacant_slots_delta: isize,
    pub total_slots_delta: isize,
    /// Per-type deltas. Only includes types present in either snapshot.
    pub objects_by_type_delta: BTreeMap<&'static str, isize>,
    pub new_types: Vec<&'static str>,
    pub removed_types: Vec<&'static str>,
    pub invariant_violations_delta: isize,
    /// Change in tracker allocations (only if both snapshots have the value).
    pub tracker_allocations_delta: Option<isize>,
    /// Change in tracker memory bytes (only if both snapshots have the value).
    pub tracker_memory_bytes_delta: Option<isize>,
}

impl HeapStats {
    /// Computes the difference between `self` ("before") and `other` ("after").
    ///
    /// # Example
    ///
    /// ```
    /// use objrt::{Heap, HeapConfig, types::Short};
    ///
    /// let mut heap = Heap::new(HeapConfig::default());
    /// let before = heap.heap_stats();
    /// let big = Short::new(&mut heap, 1_000).unwrap();
    /// let after = heap.heap_stats();
    /// heap.release_ref(big);
    ///
    /// let diff = before.diff(&after);
    /// assert_eq!(diff.live_objects_delta, 1);
    /// assert_eq!(diff.objects_by_type_delta["short"], 1);
    /// ```
    #[must_use]
    pub fn diff(&self, other: &Self) -> HeapDiff {
        let (objects_by_type_delta, new_types, removed_types) =
            compute_type_deltas(&self.objects_by_type, &other.objects_by_type);

        HeapDiff {
            live_objects_delta: isize_delta(self.live_objects, other.live_objects),
            pooled_blocks_delta: isize_delta(self.pooled_blocks, other.pooled_blocks),
            vacant_slots_delta: isize_delta(self.vacant_slots, other.vacant_slots),
            total_slots_delta: isize_delta(self.total_slots, other.total_slots),
            objects_by_type_delta,
            new_types,
            removed_types,
            invariant_violations_delta: isize_delta(self.invariant_violations, other.invariant_violations),
            tracker_allocations_delta: optional_isize_delta(self.tracker_allocations, other.tracker_allocations),
            tracker_memory_bytes_delta: optional_isize_delta(self.tracker_memory_bytes, other.tracker_memory_bytes),
        }
    }
}

impl HeapDiff {
    /// Returns `true` when all deltas are zero and no types were added or removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_objects_delta == 0
            && self.pooled_blocks_delta == 0
            && self.vacant_slots_delta == 0
            && self.total_slots_delta == 0
            && self.invariant_violations_delta == 0
            && self.new_types.is_empty()
            && self.removed_types.is_empty()
            && self.objects_by_type_delta.values().all(|&v| v == 0)
            && self.tracker_allocations_delta.is_none_or(|d| d == 0)
            && self.tracker_memory_bytes_delta.is_none_or(|d| d == 0)
    }

    /// Returns `true` when the set of live objects is unchanged.
    ///
    /// Pool and slot growth is ignored: a computation that allocated
    /// temporaries and released them all leaves no live-object delta even
    /// though its blocks may now sit in a pool.
    #[must_use]
    pub fn is_leak_free(&self) -> bool {
        self.live_objects_delta == 0
            && self.new_types.is_empty()
            && self.objects_by_type_delta.values().all(|&v| v == 0)
    }
}

impl fmt::Display for HeapDiff {
    /// Example output:
    ///
    /// ```text
    /// HeapDiff: +3 live objects, +1 pooled, +4 slots
    ///   short: +2
    ///   New types: tuple
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "HeapDiff: no changes");
        }

        write!(
            f,
            "HeapDiff: {:+} live objects, {:+} pooled, {:+} slots",
            self.live_objects_delta, self.pooled_blocks_delta, self.total_slots_delta
        )?;

        for (&type_name, &delta) in &self.objects_by_type_delta {
            if delta != 0 {
                write!(f, "\n  {type_name}: {delta:+}")?;
            }
        }

        if !self.new_types.is_empty() {
            write!(f, "\n  New types: {}", self.new_types.join(", "))?;
        }
        if !self.removed_types.is_empty() {
            write!(f, "\n  Removed types: {}", self.removed_types.join(", "))?;
        }
        if self.invariant_violations_delta != 0 {
            write!(f, "\n  Invariant violations: {:+}", self.invariant_violations_delta)?;
        }
        Ok(())
    }
}

/// Computes `after - before` as `isize`, saturating at the `isize` bounds.
fn isize_delta(before: usize, after: usize) -> isize {
    if after >= before {
        isize::try_from(after - before).unwrap_or(isize::MAX)
    } else {
        isize::try_from(before - after).map_or(isize::MIN, |d| -d)
    }
}

fn optional_isize_delta(before: Option<usize>, after: Option<usize>) -> Option<isize> {
    match (before, after) {
        (Some(b), Some(a)) => Some(isize_delta(b, a)),
        _ => None,
    }
}

type TypeDeltas = (BTreeMap<&'static str, isize>, Vec<&'static str>, Vec<&'static str>);

fn compute_type_deltas(
    before: &BTreeMap<&'static str, usize>,
    after: &BTreeMap<&'static str, usize>,
) -> TypeDeltas {
    let mut deltas = BTreeMap::new();
    let mut new_types = Vec::new();
    let mut removed_types = Vec::new();

    for (&name, &count) in before {
        let after_count = after.get(name).copied().unwrap_or(0);
        deltas.insert(name, isize_delta(count, after_count));
        if !after.contains_key(name) {
            removed_types.push(name);
        }
    }
    for (&name, &count) in after {
        if !before.contains_key(name) {
            deltas.insert(name, isize_delta(0, count));
            new_types.push(name);
        }
    }
    (deltas, new_types, removed_types)
}
