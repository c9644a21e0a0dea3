//! # engine_component
//!
//! Shared primitives for the hot-reloadable component runtime.
//!
//! This crate provides:
//!
//! - [`TypeIdentity`] — stable FNV-1a identifiers derived from type names.
//! - [`TypeName`] — the naming contract entities, events and interfaces share.
//! - [`Entity`] / [`RuntimeId`] / [`EntityAllocator`] — the entity model.
//! - [`World`] — a scene's entity store, looked up by runtime id.
//! - [`Event`] / [`DisposableEvent`] — pub/sub payload contracts.
//! - [`SystemContext`] / [`CommandBuffer`] — what a handler sees while it runs.

pub mod context;
pub mod entity;
pub mod event;
pub mod identity;
pub mod world;

pub use context::{Command, CommandBuffer, SystemContext};
pub use entity::{Entity, EntityAllocator, EntityValue, RuntimeId};
pub use event::{DisposableEvent, Disposal, Event};
pub use identity::{TypeIdentity, TypeName};
pub use world::{EntitySlot, World};
