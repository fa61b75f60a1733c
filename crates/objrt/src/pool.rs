//! Size-class free lists.
//!
//! Each recognized block size has one singly linked pool threaded through the
//! arena: the head lives here, and each pooled slot is a
//! [`Slot::Pooled`](crate::object::Slot) node carrying the link to the next.
//! Push and pop are O(1) and never touch the underlying allocator.

use smallvec::{SmallVec, smallvec};

use crate::object::{FreeNode, ObjId, Slot};

/// Pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Block sizes in bytes that get a pool. Any other size goes straight back
    /// to the underlying allocator.
    pub size_classes: SmallVec<[usize; 4]>,
    /// Maximum number of parked blocks per class, `None` for unbounded.
    pub max_pooled_per_class: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size_classes: smallvec![16, 24],
            max_pooled_per_class: None,
        }
    }
}

impl PoolConfig {
    /// A configuration with no size classes, so every freed block is returned.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            size_classes: SmallVec::new(),
            max_pooled_per_class: None,
        }
    }

    /// Sets the pooled block sizes.
    #[must_use]
    pub fn size_classes(mut self, sizes: impl IntoIterator<Item = usize>) -> Self {
        self.size_classes = sizes.into_iter().collect();
        self
    }

    /// Caps the number of parked blocks per class.
    #[must_use]
    pub fn max_pooled_per_class(mut self, limit: usize) -> Self {
        self.max_pooled_per_class = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct SizeClass {
    size: usize,
    head: Option<ObjId>,
    len: usize,
}

#[derive(Debug)]
pub(crate) struct SizeClassPools {
    classes: SmallVec<[SizeClass; 4]>,
    max_per_class: Option<usize>,
}

impl SizeClassPools {
    pub fn new(config: &PoolConfig) -> Self {
        let mut classes: SmallVec<[SizeClass; 4]> = SmallVec::new();
        for &size in &config.size_classes {
            if classes.iter().all(|class| class.size != size) {
                classes.push(SizeClass { size, head: None, len: 0 });
            }
        }
        Self {
            classes,
            max_per_class: config.max_pooled_per_class,
        }
    }

    fn class_mut(&mut self, size: usize) -> Option<&mut SizeClass> {
        self.classes.iter_mut().find(|class| class.size == size)
    }

    /// Pops a parked block of exactly `size` bytes.
    ///
    /// The slot is left as a stale `Pooled` node; the caller overwrites it with
    /// the re-initialised object.
    pub fn pop(&mut self, size: usize, slots: &[Slot]) -> Option<ObjId> {
        let class = self.class_mut(size)?;
        let id = class.head?;
        let Some(Slot::Pooled(node)) = slots.get(id.index()) else {
            panic!("SizeClassPools::pop: pool head {id} is not a pooled node");
        };
        debug_assert_eq!(node.size, size, "pooled block in the wrong size class");
        class.head = node.next;
        class.len -= 1;
        Some(id)
    }

    /// Parks a freed block if `size` is a size class with room left.
    ///
    /// Returns `false` when the block was not accepted and must be returned to
    /// the underlying allocator instead.
    pub fn push(&mut self, id: ObjId, size: usize, slots: &mut [Slot]) -> bool {
        let max = self.max_per_class;
        let Some(class) = self.class_mut(size) else {
            return false;
        };
        if max.is_some_and(|max| class.len >= max) {
            return false;
        }
        slots[id.index()] = Slot::Pooled(FreeNode { next: class.head, size });
        class.head = Some(id);
        class.len += 1;
        true
    }

    /// Number of blocks parked in the class for `size`, 0 if it is not a class.
    pub fn pooled_in_class(&self, size: usize) -> usize {
        self.classes
            .iter()
            .find(|class| class.size == size)
            .map_or(0, |class| class.len)
    }

    /// Number of blocks parked across all classes.
    pub fn pooled_blocks(&self) -> usize {
        self.classes.iter().map(|class| class.len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vacant_slots(n: usize) -> Vec<Slot> {
        (0..n).map(|_| Slot::Vacant).collect()
    }

    #[test]
    fn pool_is_lifo_per_class() {
        let mut pools = SizeClassPools::new(&PoolConfig::default());
        let mut slots = vacant_slots(3);
        assert!(pools.push(ObjId::new(0), 16, &mut slots));
        assert!(pools.push(ObjId::new(1), 16, &mut slots));
        assert!(pools.push(ObjId::new(2), 24, &mut slots));
        assert_eq!(pools.pooled_in_class(16), 2);
        assert_eq!(pools.pooled_blocks(), 3);

        assert_eq!(pools.pop(16, &slots), Some(ObjId::new(1)));
        assert_eq!(pools.pop(16, &slots), Some(ObjId::new(0)));
        assert_eq!(pools.pop(16, &slots), None);
        assert_eq!(pools.pop(24, &slots), Some(ObjId::new(2)));
    }

    #[test]
    fn unrecognized_size_is_not_pooled() {
        let mut pools = SizeClassPools::new(&PoolConfig::default());
        let mut slots = vacant_slots(1);
        assert!(!pools.push(ObjId::new(0), 32, &mut slots));
        assert!(matches!(slots[0], Slot::Vacant));
        assert_eq!(pools.pop(32, &slots), None);
    }

    #[test]
    fn full_class_rejects_blocks() {
        let config = PoolConfig::default().size_classes([16]).max_pooled_per_class(1);
        let mut pools = SizeClassPools::new(&config);
        let mut slots = vacant_slots(2);
        assert!(pools.push(ObjId::new(0), 16, &mut slots));
        assert!(!pools.push(ObjId::new(1), 16, &mut slots));
        assert_eq!(pools.pooled_blocks(), 1);
    }

    #[test]
    fn pooled_node_links_to_previous_head() {
        let mut pools = SizeClassPools::new(&PoolConfig::default());
        let mut slots = vacant_slots(2);
        pools.push(ObjId::new(0), 16, &mut slots);
        pools.push(ObjId::new(1), 16, &mut slots);
        let Slot::Pooled(node) = &slots[1] else {
            panic!("expected pooled node");
        };
        assert_eq!(node.next, Some(ObjId::new(0)));
        assert_eq!(node.size, 16);
    }
}
