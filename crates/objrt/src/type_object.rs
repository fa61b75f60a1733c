//! Type descriptors and their capability tables.
//!
//! A type is a bundle of optional capability tables: number, sequence and
//! mapping, plus a two-slot comparison protocol. A type supports an operation
//! exactly when the relevant table *and* the slot inside it are present. There is
//! no inheritance; polymorphism comes entirely from which slots a type fills.
//!
//! Handlers that produce an object take their operands by value ([`ObjRef`]) and
//! must release every operand on every path. Slots that only inspect a value
//! (`bool`, `length`, comparisons) borrow.

use ahash::AHashMap;

use crate::{error::RunResult, heap::Heap, object::ObjRef};

/// `op(a)`: consumes `a`, returns a new reference.
pub type UnaryFunc = fn(&mut Heap, ObjRef) -> RunResult<ObjRef>;
/// `op(a, b)`: consumes both, returns a new reference.
pub type BinaryFunc = fn(&mut Heap, ObjRef, ObjRef) -> RunResult<ObjRef>;
/// `op(a, b, c)`: consumes all three, returns a new reference.
pub type TernaryFunc = fn(&mut Heap, ObjRef, ObjRef, ObjRef) -> RunResult<ObjRef>;
/// Truth test on a borrowed value.
pub type InquiryFunc = fn(&Heap, &ObjRef) -> bool;
/// Length of a borrowed value.
pub type LenFunc = fn(&Heap, &ObjRef) -> usize;
/// Comparison of two borrowed values, returning a native bool.
pub type CompareFunc = fn(&Heap, &ObjRef, &ObjRef) -> RunResult<bool>;

/// Number protocol slots.
#[derive(Debug, Clone, Copy)]
pub struct NumberMethods {
    pub add: Option<BinaryFunc>,
    pub subtract: Option<BinaryFunc>,
    pub multiply: Option<BinaryFunc>,
    pub remainder: Option<BinaryFunc>,
    pub floor_divide: Option<BinaryFunc>,
    pub true_divide: Option<BinaryFunc>,
    pub lshift: Option<BinaryFunc>,
    pub rshift: Option<BinaryFunc>,
    pub and: Option<BinaryFunc>,
    pub xor: Option<BinaryFunc>,
    pub or: Option<BinaryFunc>,
    pub power: Option<TernaryFunc>,
    pub negative: Option<UnaryFunc>,
    pub positive: Option<UnaryFunc>,
    pub absolute: Option<UnaryFunc>,
    pub invert: Option<UnaryFunc>,
    pub bool: Option<InquiryFunc>,
}

impl NumberMethods {
    /// A table with every slot empty, for use with struct update syntax.
    pub const EMPTY: Self = Self {
        add: None,
        subtract: None,
        multiply: None,
        remainder: None,
        floor_divide: None,
        true_divide: None,
        lshift: None,
        rshift: None,
        and: None,
        xor: None,
        or: None,
        power: None,
        negative: None,
        positive: None,
        absolute: None,
        invert: None,
        bool: None,
    };
}

/// Sequence protocol slots.
#[derive(Debug, Clone, Copy)]
pub struct SequenceMethods {
    pub length: Option<LenFunc>,
    pub concat: Option<BinaryFunc>,
}

impl SequenceMethods {
    pub const EMPTY: Self = Self {
        length: None,
        concat: None,
    };
}

/// Mapping protocol slots.
#[derive(Debug, Clone, Copy)]
pub struct MappingMethods {
    pub length: Option<LenFunc>,
    pub subscript: Option<BinaryFunc>,
}

impl MappingMethods {
    pub const EMPTY: Self = Self {
        length: None,
        subscript: None,
    };
}

/// Per-type descriptor: name, allocation layout, capability tables and comparisons.
#[derive(Debug, Clone, Copy)]
pub struct TypeDescriptor {
    pub name: &'static str,
    /// Size in bytes of the fixed part of an instance.
    pub basic_size: usize,
    /// Size in bytes of each element of a variable-length instance.
    pub item_size: usize,
    pub number: Option<&'static NumberMethods>,
    pub sequence: Option<&'static SequenceMethods>,
    pub mapping: Option<&'static MappingMethods>,
    pub equal: Option<CompareFunc>,
    pub less_or_equal: Option<CompareFunc>,
    /// Whether freed instances may be parked in a size-class pool.
    pub pooled: bool,
}

impl TypeDescriptor {
    /// A fixed-size type with no capabilities.
    #[must_use]
    pub const fn new(name: &'static str, basic_size: usize) -> Self {
        Self {
            name,
            basic_size,
            item_size: 0,
            number: None,
            sequence: None,
            mapping: None,
            equal: None,
            less_or_equal: None,
            pooled: false,
        }
    }

    /// Block size needed by an instance holding `len` elements.
    #[must_use]
    pub const fn alloc_size(&self, len: usize) -> usize {
        self.basic_size + self.item_size * len
    }
}

/// Index of a descriptor in the heap's type registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u16);

impl TypeId {
    pub const NONE: Self = Self(0);
    pub const BOOL: Self = Self(1);
    pub const SHORT: Self = Self(2);
    pub const TUPLE: Self = Self(3);

    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// True for the types every heap registers itself.
    #[must_use]
    pub fn is_builtin(self) -> bool {
        self <= Self::TUPLE
    }
}

/// Descriptors known to one heap.
///
/// Built-in types occupy the fixed ids on [`TypeId`]; host types get the next
/// free id. Names need not be unique: name lookup returns the most recently
/// registered descriptor with that name.
#[derive(Debug)]
pub(crate) struct TypeRegistry {
    types: Vec<TypeDescriptor>,
    by_name: AHashMap<&'static str, TypeId>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            by_name: AHashMap::new(),
        }
    }

    pub fn register(&mut self, descriptor: TypeDescriptor) -> TypeId {
        let index = u16::try_from(self.types.len()).expect("type registry overflow");
        let id = TypeId(index);
        self.by_name.insert(descriptor.name, id);
        self.types.push(descriptor);
        id
    }

    pub fn get(&self, id: TypeId) -> &TypeDescriptor {
        self.types.get(id.index()).expect("TypeRegistry::get: unknown type id")
    }

    pub fn contains(&self, id: TypeId) -> bool {
        id.index() < self.types.len()
    }

    pub fn by_name(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }
}
