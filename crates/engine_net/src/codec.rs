//! MessagePack encoding shared by the wire, sphere events and stored entities.

use engine_component::{Event, TypeName};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::NetError;
use crate::messages::SphereEventEnvelope;

/// Encode a value to MessagePack bytes.
///
/// # Errors
///
/// Returns [`NetError::Encode`] if serialisation fails.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, NetError> {
    rmp_serde::to_vec(value).map_err(NetError::Encode)
}

/// Decode a value from MessagePack bytes.
///
/// # Errors
///
/// Returns [`NetError::Decode`] if deserialisation fails.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, NetError> {
    rmp_serde::from_slice(bytes).map_err(NetError::Decode)
}

/// Decode the body of a received sphere event as `E`.
///
/// # Errors
///
/// Returns [`NetError::TypeMismatch`] if the envelope carries a different
/// event type, or [`NetError::Decode`] if the body is malformed.
pub fn decode_event<E>(envelope: &SphereEventEnvelope) -> Result<E, NetError>
where
    E: Event + DeserializeOwned,
{
    if envelope.type_hash != E::type_identity() {
        return Err(NetError::TypeMismatch {
            expected: E::type_name(),
            found: envelope.type_hash,
        });
    }
    decode(&envelope.payload)
}
