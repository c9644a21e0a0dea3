//! Scene-local routing table for cross-process ("sphere") events.
//!
//! Remote scenes subscribe by route id through the boundary handlers in
//! [`handler`](crate::handler). The table only records who wants what; the
//! scene does the encoding and hands envelopes to its remote sink.

use std::collections::HashMap;

use engine_component::TypeIdentity;
use engine_net::RouteId;

/// Remote subscriber routes per event type, in subscription order.
#[derive(Debug, Default)]
pub struct SphereEventTable {
    routes: HashMap<TypeIdentity, Vec<RouteId>>,
}

impl SphereEventTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route to an event type. Returns `false` if it was already there.
    pub fn subscribe(&mut self, route_id: RouteId, type_identity: TypeIdentity) -> bool {
        let routes = self.routes.entry(type_identity).or_default();
        if routes.contains(&route_id) {
            return false;
        }
        routes.push(route_id);
        true
    }

    /// Remove a route from an event type. Unknown pairs are a no-op.
    pub fn unsubscribe(&mut self, route_id: RouteId, type_identity: TypeIdentity) -> bool {
        let Some(routes) = self.routes.get_mut(&type_identity) else {
            return false;
        };
        let before = routes.len();
        routes.retain(|r| *r != route_id);
        let removed = routes.len() != before;
        if routes.is_empty() {
            self.routes.remove(&type_identity);
        }
        removed
    }

    /// Remove a route from every event type. Returns how many pairs went.
    pub fn remove_route(&mut self, route_id: RouteId) -> usize {
        let mut removed = 0;
        self.routes.retain(|_, routes| {
            let before = routes.len();
            routes.retain(|r| *r != route_id);
            removed += before - routes.len();
            !routes.is_empty()
        });
        removed
    }

    /// Routes subscribed to an event type.
    #[must_use]
    pub fn subscribers(&self, type_identity: TypeIdentity) -> &[RouteId] {
        self.routes
            .get(&type_identity)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Total number of (route, type) pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    /// Returns `true` if nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Drop every subscription.
    pub fn clear(&mut self) {
        self.routes.clear();
    }
}
