//! NATS subject hierarchy for sphere-event delivery.
//!
//! All engine subjects are prefixed with `engine.` to namespace within a
//! shared NATS cluster.

/// Root prefix for all engine NATS subjects.
pub const PREFIX: &str = "engine";

/// Wildcard covering every sphere-event delivery subject.
pub const SPHERE_EVENT_ALL: &str = "engine.sphere.event.*";

/// Build the subject a remote route receives its sphere events on.
///
/// `engine.sphere.event.<route_id>`
#[must_use]
pub fn sphere_event(route_id: u64) -> String {
    format!("{PREFIX}.sphere.event.{route_id}")
}
