//! Boundary error codes and network-layer error types.

use engine_component::TypeIdentity;

use crate::messages::RouteId;
use serde::{Deserialize, Serialize};

/// Numeric error codes reported in protocol responses.
///
/// `0` always means success; every rejection reason has its own code so a
/// remote caller can tell a bad route id from a bad type hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[repr(u32)]
pub enum ErrorCode {
    /// A subscribe request carried route id 0.
    #[error("subscribe sphere event: invalid route id")]
    SubscribeSphereEventInvalidRouteId = 100_501,

    /// A subscribe request carried type hash 0.
    #[error("subscribe sphere event: invalid type hash")]
    SubscribeSphereEventInvalidTypeHash = 100_502,

    /// An unsubscribe request carried route id 0.
    #[error("unsubscribe sphere event: invalid route id")]
    UnsubscribeSphereEventInvalidRouteId = 100_503,

    /// An unsubscribe request carried type hash 0.
    #[error("unsubscribe sphere event: invalid type hash")]
    UnsubscribeSphereEventInvalidTypeHash = 100_504,

    /// The target scene is no longer accepting work.
    #[error("scene unavailable")]
    SceneUnavailable = 100_510,

    /// The scene is running but failed while applying the request.
    #[error("scene request failed")]
    SceneRequestFailed = 100_511,
}

impl ErrorCode {
    /// The success code carried by responses.
    pub const SUCCESS: u32 = 0;

    /// Returns the numeric code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Decode a numeric code. Returns `None` for success or unknown codes.
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            100_501 => Some(Self::SubscribeSphereEventInvalidRouteId),
            100_502 => Some(Self::SubscribeSphereEventInvalidTypeHash),
            100_503 => Some(Self::UnsubscribeSphereEventInvalidRouteId),
            100_504 => Some(Self::UnsubscribeSphereEventInvalidTypeHash),
            100_510 => Some(Self::SceneUnavailable),
            100_511 => Some(Self::SceneRequestFailed),
            _ => None,
        }
    }
}

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to encode a message to MessagePack.
    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a message from MessagePack.
    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// A sphere event envelope carried a different type than expected.
    #[error("expected sphere event {expected}, got type {found}")]
    TypeMismatch {
        /// Name of the type the receiver asked for.
        expected: &'static str,
        /// Type identity found in the envelope.
        found: TypeIdentity,
    },

    /// The remote route is gone for good and should not be tried again.
    #[error("route {0} is closed")]
    RouteClosed(RouteId),

    /// NATS publish error.
    #[error("NATS publish error: {0}")]
    Publish(#[from] async_nats::PublishError),

    /// NATS connection error.
    #[error("NATS connection error: {0}")]
    Connect(#[from] async_nats::ConnectError),
}
