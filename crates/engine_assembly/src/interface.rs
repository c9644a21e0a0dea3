//! Custom extension interfaces.
//!
//! The host defines an interface as a `dyn Trait` with a stable name. A
//! module registers implementations of it as factories, and the host asks the
//! registry for every implementation across all loaded modules.
//!
//! ```rust
//! use engine_assembly::{CustomInterface, InterfaceTable};
//! use engine_component::TypeName;
//!
//! trait Greeter: Send {
//!     fn greet(&self) -> String;
//! }
//! impl TypeName for dyn Greeter {
//!     fn type_name() -> &'static str { "host::Greeter" }
//! }
//! impl CustomInterface for dyn Greeter {}
//!
//! struct English;
//! impl TypeName for English {
//!     fn type_name() -> &'static str { "mod::English" }
//! }
//! impl Greeter for English {
//!     fn greet(&self) -> String { "hello".into() }
//! }
//!
//! let mut table = InterfaceTable::new();
//! table.register::<dyn Greeter, English>(|| Box::new(English));
//!
//! let greeter = table.implementations::<dyn Greeter>()[0]
//!     .instantiate::<dyn Greeter>()
//!     .unwrap();
//! assert_eq!(greeter.greet(), "hello");
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use engine_component::{TypeIdentity, TypeName};

/// Marker for host-defined interfaces that modules may implement.
pub trait CustomInterface: TypeName + 'static {}

type Factory = Arc<dyn Fn() -> Box<dyn Any> + Send + Sync>;

/// One registered implementation of a custom interface.
#[derive(Clone)]
pub struct InterfaceImpl {
    type_identity: TypeIdentity,
    type_name: &'static str,
    factory: Factory,
}

impl InterfaceImpl {
    /// Identity of the implementing type.
    #[must_use]
    pub fn type_identity(&self) -> TypeIdentity {
        self.type_identity
    }

    /// Declared name of the implementing type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Create a fresh instance behind interface `I`.
    ///
    /// Returns `None` if this implementation was registered for a different
    /// interface.
    #[must_use]
    pub fn instantiate<I: CustomInterface + ?Sized>(&self) -> Option<Box<I>> {
        (self.factory)()
            .downcast::<Box<I>>()
            .ok()
            .map(|boxed| *boxed)
    }
}

impl std::fmt::Debug for InterfaceImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceImpl")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Implementations grouped by interface.
#[derive(Debug, Clone, Default)]
pub struct InterfaceTable {
    entries: HashMap<TypeIdentity, Vec<InterfaceImpl>>,
}

impl InterfaceTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` as an implementation of interface `I`.
    pub fn register<I, T>(&mut self, factory: impl Fn() -> Box<I> + Send + Sync + 'static)
    where
        I: CustomInterface + ?Sized,
        T: TypeName,
    {
        let factory: Factory = Arc::new(move || Box::new(factory()) as Box<dyn Any>);
        let list = self.entries.entry(I::type_identity()).or_default();
        list.retain(|existing| existing.type_identity != T::type_identity());
        list.push(InterfaceImpl {
            type_identity: T::type_identity(),
            type_name: T::type_name(),
            factory,
        });
    }

    /// Remove `T` from interface `I`. Returns `true` if it was registered.
    pub fn unregister<I, T>(&mut self) -> bool
    where
        I: CustomInterface + ?Sized,
        T: TypeName,
    {
        let Some(list) = self.entries.get_mut(&I::type_identity()) else {
            return false;
        };
        let before = list.len();
        list.retain(|existing| existing.type_identity != T::type_identity());
        let removed = list.len() != before;
        if list.is_empty() {
            self.entries.remove(&I::type_identity());
        }
        removed
    }

    /// Implementations of interface `I`, in registration order.
    #[must_use]
    pub fn implementations<I: CustomInterface + ?Sized>(&self) -> &[InterfaceImpl] {
        self.get(I::type_identity())
    }

    /// Implementations of the interface with the given identity.
    #[must_use]
    pub fn get(&self, interface: TypeIdentity) -> &[InterfaceImpl] {
        self.entries
            .get(&interface)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the number of implementations across all interfaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Returns `true` if the table holds no implementations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every implementation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Scorer: Send {
        fn score(&self) -> u32;
    }

    impl TypeName for dyn Scorer {
        fn type_name() -> &'static str {
            "host::Scorer"
        }
    }

    impl CustomInterface for dyn Scorer {}

    trait Namer: Send {}

    impl TypeName for dyn Namer {
        fn type_name() -> &'static str {
            "host::Namer"
        }
    }

    impl CustomInterface for dyn Namer {}

    struct Fixed(u32);

    impl TypeName for Fixed {
        fn type_name() -> &'static str {
            "test::Fixed"
        }
    }

    impl Scorer for Fixed {
        fn score(&self) -> u32 {
            self.0
        }
    }

    #[test]
    fn test_register_and_instantiate() {
        let mut table = InterfaceTable::new();
        table.register::<dyn Scorer, Fixed>(|| Box::new(Fixed(9)));
        assert_eq!(table.len(), 1);

        let implementations = table.implementations::<dyn Scorer>();
        assert_eq!(implementations[0].type_name(), "test::Fixed");
        let scorer = implementations[0].instantiate::<dyn Scorer>().unwrap();
        assert_eq!(scorer.score(), 9);
    }

    #[test]
    fn test_instantiate_wrong_interface_is_none() {
        let mut table = InterfaceTable::new();
        table.register::<dyn Scorer, Fixed>(|| Box::new(Fixed(1)));
        let implementation = &table.implementations::<dyn Scorer>()[0];
        assert!(implementation.instantiate::<dyn Namer>().is_none());
    }

    #[test]
    fn test_reregistering_replaces() {
        let mut table = InterfaceTable::new();
        table.register::<dyn Scorer, Fixed>(|| Box::new(Fixed(1)));
        table.register::<dyn Scorer, Fixed>(|| Box::new(Fixed(2)));
        let implementations = table.implementations::<dyn Scorer>();
        assert_eq!(implementations.len(), 1);
        assert_eq!(
            implementations[0]
                .instantiate::<dyn Scorer>()
                .unwrap()
                .score(),
            2
        );
    }

    #[test]
    fn test_unregister() {
        let mut table = InterfaceTable::new();
        table.register::<dyn Scorer, Fixed>(|| Box::new(Fixed(1)));
        assert!(table.unregister::<dyn Scorer, Fixed>());
        assert!(!table.unregister::<dyn Scorer, Fixed>());
        assert!(table.is_empty());
        assert!(table.implementations::<dyn Namer>().is_empty());
    }
}
