//! Registrar capabilities a module can expose.
//!
//! Every registrar is optional. A manifest carries whichever ones the module
//! provides, and each consumer only looks at the capability it cares about.

use engine_component::TypeIdentity;
use engine_net::OpCode;

use crate::interface::InterfaceTable;
use crate::systems::{EntitySystemSet, EventSystemSet};

/// Declares the module's entity handlers.
pub trait EntitySystemRegistrar: Send + Sync {
    /// Add this module's handlers to `systems`.
    fn register_systems(&self, systems: &mut EntitySystemSet);
}

impl<F> EntitySystemRegistrar for F
where
    F: Fn(&mut EntitySystemSet) + Send + Sync,
{
    fn register_systems(&self, systems: &mut EntitySystemSet) {
        self(systems);
    }
}

/// Declares the module's event subscribers.
pub trait EventSystemRegistrar: Send + Sync {
    /// Add this module's subscribers to `events`.
    fn register_events(&self, events: &mut EventSystemSet);
}

impl<F> EventSystemRegistrar for F
where
    F: Fn(&mut EventSystemSet) + Send + Sync,
{
    fn register_events(&self, events: &mut EventSystemSet) {
        self(events);
    }
}

/// Declares implementations of host-defined extension interfaces.
///
/// Populated when the manifest is registered, emptied when it is
/// unregistered.
pub trait CustomInterfaceRegistrar: Send + Sync {
    /// Record the module's implementations.
    fn register(&self, interfaces: &mut InterfaceTable);

    /// Drop the module's implementations.
    fn unregister(&self, interfaces: &mut InterfaceTable) {
        interfaces.clear();
    }
}

/// Lists the protocol message types a module defines.
pub trait NetworkProtocolRegistrar: Send + Sync {
    /// Identities of the module's protocol types.
    fn protocol_types(&self) -> Vec<TypeIdentity>;
}

/// Tells whether a module handles a given opcode.
pub trait MessageHandlerResolver: Send + Sync {
    /// Returns `true` if this module has a handler for `opcode`.
    fn handles(&self, opcode: OpCode) -> bool;
}

/// Lists the entity types a module defines.
pub trait EntityTypeCollectionRegistrar: Send + Sync {
    /// Identities of the module's entity types.
    fn entity_types(&self) -> Vec<TypeIdentity>;
}

/// Maps protocol types to opcodes and back.
pub trait OpCodeResolver: Send + Sync {
    /// The opcode of a message type.
    fn opcode(&self, message_type: TypeIdentity) -> Option<OpCode>;

    /// The message type of an opcode.
    fn message_type(&self, opcode: OpCode) -> Option<TypeIdentity>;
}

/// Maps request opcodes to their response types.
pub trait ResponseTypeResolver: Send + Sync {
    /// The response type for a request opcode.
    fn response_type(&self, request: OpCode) -> Option<TypeIdentity>;
}

/// Declares entity types persisted in a table separate from their owner.
#[cfg(feature = "server")]
pub trait SeparateTableRegistrar: Send + Sync {
    /// `(owner, separate)` pairs.
    fn separate_tables(&self) -> Vec<(TypeIdentity, TypeIdentity)>;
}

/// Lists the event types a module allows across processes.
#[cfg(feature = "server")]
pub trait SphereEventRegistrar: Send + Sync {
    /// Identities of the module's sphere event types.
    fn sphere_events(&self) -> Vec<TypeIdentity>;
}
