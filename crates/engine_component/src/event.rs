//! Event payload contracts.
//!
//! Events are identified by their declared type name, exactly like entities.
//! Plain value events are simply dropped after dispatch. Events that own a
//! resource implement [`DisposableEvent`] and are disposed by the dispatcher
//! once every subscriber has been attempted.

use std::any::Any;

use crate::identity::TypeName;

/// A pub/sub payload.
pub trait Event: TypeName + Any + Send + Sync {}

/// A payload that owns a resource which must be released after dispatch.
pub trait DisposableEvent: Event {
    /// Release the payload's resource. Called at most once per publish.
    fn dispose(&self);
}

/// Whether a publish disposes its payload after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposal {
    /// Dispose once every subscriber has run.
    #[default]
    Auto,
    /// Leave the payload alive; the caller stays responsible for it.
    Keep,
}

impl Disposal {
    /// Returns `true` for [`Disposal::Auto`].
    #[must_use]
    pub fn is_auto(self) -> bool {
        matches!(self, Disposal::Auto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_disposal_is_auto() {
        assert!(Disposal::default().is_auto());
        assert!(!Disposal::Keep.is_auto());
    }
}
