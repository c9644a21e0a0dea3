//! Assembly-layer error types.

use crate::lifecycle::SubscriberId;
use crate::manifest::ManifestId;

/// Errors raised while distributing manifests to subscribers.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    /// The subscriber's owning execution context no longer accepts work.
    #[error("subscriber {subscriber} is unavailable: {reason}")]
    SubscriberUnavailable {
        /// The subscriber that could not be reached.
        subscriber: SubscriberId,
        /// Why it could not be reached.
        reason: String,
    },

    /// A manifest was cleared before a subscriber could apply it.
    #[error("manifest {0} has been cleared")]
    ManifestCleared(ManifestId),
}
