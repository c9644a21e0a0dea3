//! Cross-process sphere-event messages.
//!
//! A sphere event is an event published inside one scene that remote scenes
//! (identified by a route id) have asked to receive. Subscription requests
//! arrive through the external RPC layer; this module only defines their
//! shape.

use engine_component::TypeIdentity;
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Address of a remote subscriber, as assigned by the routing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteId(pub u64);

impl RouteId {
    /// The absent route id.
    pub const NONE: RouteId = RouteId(0);

    /// Returns `true` unless this is [`RouteId::NONE`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for RouteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RouteId({})", self.0)
    }
}

// ── Subscription management ─────────────────────────────────────────────────

/// A remote scene asks to receive a sphere event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeSphereEventRequest {
    /// The subscriber's route id. Must be non-zero.
    pub route_id: RouteId,
    /// Identity of the event type. Must be non-zero.
    pub type_hash: TypeIdentity,
}

/// Reply to [`SubscribeSphereEventRequest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscribeSphereEventResponse {
    /// [`ErrorCode::SUCCESS`] or the rejection code.
    pub error_code: u32,
}

/// A remote scene stops receiving a sphere event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeSphereEventRequest {
    /// The subscriber's route id. Must be non-zero.
    pub route_id: RouteId,
    /// Identity of the event type. Must be non-zero.
    pub type_hash: TypeIdentity,
}

/// Reply to [`UnsubscribeSphereEventRequest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnsubscribeSphereEventResponse {
    /// [`ErrorCode::SUCCESS`] or the rejection code.
    pub error_code: u32,
}

macro_rules! impl_response {
    ($($ty:ty),* $(,)?) => {$(
        impl $ty {
            /// A successful response.
            #[must_use]
            pub fn success() -> Self {
                Self { error_code: ErrorCode::SUCCESS }
            }

            /// A rejected response.
            #[must_use]
            pub fn rejected(code: ErrorCode) -> Self {
                Self { error_code: code.code() }
            }

            /// Returns the rejection reason, if any.
            #[must_use]
            pub fn error(&self) -> Option<ErrorCode> {
                ErrorCode::from_code(self.error_code)
            }

            /// Returns `true` if the request was accepted.
            #[must_use]
            pub fn is_success(&self) -> bool {
                self.error_code == ErrorCode::SUCCESS
            }
        }
    )*};
}

impl_response!(SubscribeSphereEventResponse, UnsubscribeSphereEventResponse);

// ── Delivery ────────────────────────────────────────────────────────────────

/// An encoded sphere event on its way to one remote subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SphereEventEnvelope {
    /// The receiving route.
    pub route_id: RouteId,
    /// Identity of the event type.
    pub type_hash: TypeIdentity,
    /// MessagePack-encoded event body.
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_helpers() {
        let ok = UnsubscribeSphereEventResponse::success();
        assert!(ok.is_success());
        assert_eq!(ok.error(), None);

        let rejected = UnsubscribeSphereEventResponse::rejected(
            ErrorCode::UnsubscribeSphereEventInvalidRouteId,
        );
        assert!(!rejected.is_success());
        assert_eq!(
            rejected.error(),
            Some(ErrorCode::UnsubscribeSphereEventInvalidRouteId)
        );
    }

    #[test]
    fn test_route_id_validity() {
        assert!(!RouteId::NONE.is_valid());
        assert!(RouteId(12).is_valid());
    }

    #[test]
    fn test_envelope_survives_encoding() {
        let envelope = SphereEventEnvelope {
            route_id: RouteId(5),
            type_hash: TypeIdentity::from_name("game::Explosion"),
            payload: vec![1, 2, 3],
        };
        let bytes = crate::encode(&envelope).unwrap();
        let restored: SphereEventEnvelope = crate::decode(&bytes).unwrap();
        assert_eq!(restored.route_id, RouteId(5));
        assert_eq!(restored.type_hash, envelope.type_hash);
        assert_eq!(restored.payload, vec![1, 2, 3]);
    }
}
