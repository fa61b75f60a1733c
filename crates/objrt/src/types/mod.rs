//! Built-in types.
//!
//! Each module exposes its [`TypeDescriptor`] as a constant. They are
//! registered, in the order of the fixed ids on [`TypeId`], by every new heap.

pub mod boolean;
pub mod none;
pub mod short;
pub mod tuple;

pub use short::{Short, fib};
pub use tuple::Tuple;

use crate::type_object::{TypeDescriptor, TypeId, TypeRegistry};

/// Registers the built-in descriptors so their ids match the `TypeId` constants.
pub(crate) fn register_builtins(registry: &mut TypeRegistry) {
    let builtins: [(TypeId, TypeDescriptor); 4] = [
        (TypeId::NONE, none::NONE_TYPE),
        (TypeId::BOOL, boolean::BOOL_TYPE),
        (TypeId::SHORT, short::SHORT_TYPE),
        (TypeId::TUPLE, tuple::TUPLE_TYPE),
    ];
    debug_assert_eq!(registry.len(), 0, "built-ins must be registered first");
    for (expected, descriptor) in builtins {
        let id = registry.register(descriptor);
        debug_assert_eq!(id, expected, "built-in {} registered out of order", descriptor.name);
    }
}
