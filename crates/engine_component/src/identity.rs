//! Stable numeric type identity.
//!
//! Live type handles never cross a module boundary: a module that is
//! unloaded and loaded again produces brand new Rust types as far as
//! `std::any::TypeId` is concerned. Every dispatch table is therefore keyed
//! by a [`TypeIdentity`] derived from the type's **declared name** with the
//! FNV-1a 64-bit hash, which is identical across processes, reloads and
//! languages.

use serde::{Deserialize, Serialize};

/// A stable identifier for a logical type, derived from its fully-qualified
/// name using the FNV-1a 64-bit hash algorithm.
///
/// Collisions are treated as impossible. `TypeIdentity(0)` is never produced
/// by a real name in practice and is used at the protocol boundary to mean
/// "absent".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeIdentity(pub u64);

impl TypeIdentity {
    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// The absent identity used by protocol messages.
    pub const NONE: TypeIdentity = TypeIdentity(0);

    /// Compute the [`TypeIdentity`] of a type name.
    ///
    /// # Algorithm (FNV-1a 64-bit)
    ///
    /// ```text
    /// hash = 0xcbf29ce484222325          (offset basis)
    /// for each byte in name.as_bytes():
    ///     hash = hash XOR byte
    ///     hash = hash * 0x00000100000001b3  (prime)
    /// return hash
    /// ```
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Compute the [`TypeIdentity`] of a named Rust type.
    #[must_use]
    pub fn of<T: TypeName + ?Sized>() -> Self {
        T::type_identity()
    }

    /// Returns the raw hash value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns `true` unless this is [`TypeIdentity::NONE`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// A type with a stable, fully-qualified name.
///
/// Entities, events and custom interfaces all implement this. The name must
/// not change between module versions, otherwise a hot reload would treat the
/// new version as an unrelated type.
///
/// ```rust
/// use engine_component::{TypeIdentity, TypeName};
///
/// struct Health;
///
/// impl TypeName for Health {
///     fn type_name() -> &'static str { "game::Health" }
/// }
///
/// assert_eq!(Health::type_identity(), TypeIdentity::from_name("game::Health"));
/// ```
pub trait TypeName {
    /// The fully-qualified name of this type.
    fn type_name() -> &'static str;

    /// Returns the [`TypeIdentity`] for this type.
    fn type_identity() -> TypeIdentity {
        TypeIdentity::from_name(Self::type_name())
    }
}
