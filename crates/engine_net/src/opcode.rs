//! Packed protocol opcodes.
//!
//! An opcode is a `u32` whose top 5 bits carry the [`OpCodeKind`] and whose
//! low 27 bits carry a per-kind sequence index. Generated protocol tables
//! (out of scope here) assign the indices; this module only packs and
//! unpacks them so dispatch code can reason about request/response pairing.

use serde::{Deserialize, Serialize};

/// Number of bits reserved for the sequence index.
const INDEX_BITS: u32 = 27;

/// Mask selecting the sequence index.
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// The transport category an opcode belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OpCodeKind {
    /// Client ↔ server one-way message.
    OuterMessage = 1,
    /// Client → server request.
    OuterRequest = 2,
    /// Server → client response.
    OuterResponse = 3,
    /// Server ↔ server one-way message.
    InnerMessage = 4,
    /// Server → server request.
    InnerRequest = 5,
    /// Server → server response.
    InnerResponse = 6,
    /// Server ↔ server message routed to an entity.
    InnerRouteMessage = 7,
    /// Server → server request routed to an entity.
    InnerRouteRequest = 8,
    /// Response to an inner routed request.
    InnerRouteResponse = 9,
    /// Client message forwarded to an addressable entity.
    OuterAddressableMessage = 10,
    /// Client request forwarded to an addressable entity.
    OuterAddressableRequest = 11,
    /// Response to an outer addressable request.
    OuterAddressableResponse = 12,
    /// Server message to an addressable entity.
    InnerAddressableMessage = 13,
    /// Server request to an addressable entity.
    InnerAddressableRequest = 14,
    /// Response to an inner addressable request.
    InnerAddressableResponse = 15,
    /// Client message on a custom route.
    OuterCustomRouteMessage = 16,
    /// Client request on a custom route.
    OuterCustomRouteRequest = 17,
    /// Response on a custom route.
    OuterCustomRouteResponse = 18,
    /// Client message to a roaming entity.
    OuterRoamingMessage = 19,
    /// Client request to a roaming entity.
    OuterRoamingRequest = 20,
    /// Response from a roaming entity.
    OuterRoamingResponse = 21,
}

impl OpCodeKind {
    /// Decode a kind from its 5-bit tag.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        use OpCodeKind::*;
        let kind = match tag {
            1 => OuterMessage,
            2 => OuterRequest,
            3 => OuterResponse,
            4 => InnerMessage,
            5 => InnerRequest,
            6 => InnerResponse,
            7 => InnerRouteMessage,
            8 => InnerRouteRequest,
            9 => InnerRouteResponse,
            10 => OuterAddressableMessage,
            11 => OuterAddressableRequest,
            12 => OuterAddressableResponse,
            13 => InnerAddressableMessage,
            14 => InnerAddressableRequest,
            15 => InnerAddressableResponse,
            16 => OuterCustomRouteMessage,
            17 => OuterCustomRouteRequest,
            18 => OuterCustomRouteResponse,
            19 => OuterRoamingMessage,
            20 => OuterRoamingRequest,
            21 => OuterRoamingResponse,
            _ => return None,
        };
        Some(kind)
    }

    /// Returns `true` for kinds that expect a response.
    #[must_use]
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Self::OuterRequest
                | Self::InnerRequest
                | Self::InnerRouteRequest
                | Self::OuterAddressableRequest
                | Self::InnerAddressableRequest
                | Self::OuterCustomRouteRequest
                | Self::OuterRoamingRequest
        )
    }

    /// Returns `true` for response kinds.
    #[must_use]
    pub fn is_response(self) -> bool {
        matches!(
            self,
            Self::OuterResponse
                | Self::InnerResponse
                | Self::InnerRouteResponse
                | Self::OuterAddressableResponse
                | Self::InnerAddressableResponse
                | Self::OuterCustomRouteResponse
                | Self::OuterRoamingResponse
        )
    }

    /// The response kind paired with a request kind.
    #[must_use]
    pub fn response_kind(self) -> Option<Self> {
        if self.is_request() {
            Self::from_tag(self as u8 + 1)
        } else {
            None
        }
    }
}

/// A packed protocol opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpCode(pub u32);

impl OpCode {
    /// Pack a kind and a sequence index.
    ///
    /// Indices wider than 27 bits are truncated.
    #[must_use]
    pub const fn new(kind: OpCodeKind, index: u32) -> Self {
        Self(((kind as u32) << INDEX_BITS) | (index & INDEX_MASK))
    }

    /// The kind tag, if it names a known kind.
    #[must_use]
    pub fn kind(self) -> Option<OpCodeKind> {
        OpCodeKind::from_tag((self.0 >> INDEX_BITS) as u8)
    }

    /// The per-kind sequence index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 & INDEX_MASK
    }

    /// Returns the raw packed value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "{kind:?}#{}", self.index()),
            None => write!(f, "OpCode({})", self.0),
        }
    }
}

/// Opcodes of the client-facing sphere-event protocol.
pub mod sphere {
    use super::{OpCode, OpCodeKind};

    /// Client asks the gate to subscribe it to a sphere event.
    pub const SUBSCRIBE_REQUEST: OpCode = OpCode::new(OpCodeKind::OuterRequest, 10007);
    /// Reply to [`SUBSCRIBE_REQUEST`].
    pub const SUBSCRIBE_RESPONSE: OpCode = OpCode::new(OpCodeKind::OuterResponse, 10007);
    /// Client asks the gate to publish a sphere event.
    pub const PUBLISH_REQUEST: OpCode = OpCode::new(OpCodeKind::OuterRequest, 10008);
    /// Reply to [`PUBLISH_REQUEST`].
    pub const PUBLISH_RESPONSE: OpCode = OpCode::new(OpCodeKind::OuterResponse, 10008);
    /// Client asks the gate to drop a sphere-event subscription.
    pub const UNSUBSCRIBE_REQUEST: OpCode = OpCode::new(OpCodeKind::OuterRequest, 10009);
    /// Reply to [`UNSUBSCRIBE_REQUEST`].
    pub const UNSUBSCRIBE_RESPONSE: OpCode = OpCode::new(OpCodeKind::OuterResponse, 10009);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_generated_values() {
        // Values taken from a generated outer protocol table.
        assert_eq!(sphere::SUBSCRIBE_REQUEST.get(), 268_445_463);
        assert_eq!(sphere::SUBSCRIBE_RESPONSE.get(), 402_663_191);
        assert_eq!(sphere::UNSUBSCRIBE_REQUEST.get(), 268_445_465);
        assert_eq!(
            OpCode::new(OpCodeKind::OuterRoamingResponse, 10002).get(),
            2_818_582_290
        );
    }

    #[test]
    fn test_unpack() {
        let op = OpCode(1_476_405_009);
        assert_eq!(op.kind(), Some(OpCodeKind::OuterAddressableRequest));
        assert_eq!(op.index(), 10001);
    }

    #[test]
    fn test_response_kind_pairs_requests() {
        assert_eq!(
            OpCodeKind::OuterRequest.response_kind(),
            Some(OpCodeKind::OuterResponse)
        );
        assert_eq!(
            OpCodeKind::OuterRoamingRequest.response_kind(),
            Some(OpCodeKind::OuterRoamingResponse)
        );
        assert_eq!(OpCodeKind::OuterMessage.response_kind(), None);
        assert!(OpCodeKind::InnerRouteResponse.is_response());
    }

    #[test]
    fn test_unknown_kind() {
        assert_eq!(OpCode(0).kind(), None);
        assert_eq!(OpCode(31 << 27).kind(), None);
    }
}
