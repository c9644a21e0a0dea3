//! Remote delivery of sphere events.
//!
//! A scene publishes sphere events synchronously from inside its own
//! execution context, so delivery must never block: a [`RemoteEventSink`]
//! accepts an encoded envelope and takes care of getting it out.

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::connection::NatsConnection;
use crate::error::NetError;
use crate::messages::SphereEventEnvelope;
use crate::subjects;

/// Destination for sphere events bound to remote subscribers.
pub trait RemoteEventSink: Send + Sync {
    /// Hand one envelope over for delivery. Must not block.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope could not be accepted, or
    /// [`NetError::RouteClosed`] if the route will never accept another one.
    fn deliver(&self, envelope: SphereEventEnvelope) -> Result<(), NetError>;
}

/// Publishes sphere events to `engine.sphere.event.<route_id>` over NATS.
#[derive(Debug, Clone)]
pub struct NatsSphereSink {
    conn: NatsConnection,
    runtime: Handle,
}

impl NatsSphereSink {
    /// Create a sink that publishes on the given runtime.
    #[must_use]
    pub fn new(conn: NatsConnection, runtime: Handle) -> Self {
        Self { conn, runtime }
    }
}

impl RemoteEventSink for NatsSphereSink {
    fn deliver(&self, envelope: SphereEventEnvelope) -> Result<(), NetError> {
        let conn = self.conn.clone();
        let subject = subjects::sphere_event(envelope.route_id.0);
        self.runtime.spawn(async move {
            match conn.publish(&subject, &envelope).await {
                Ok(()) => debug!(
                    subject = %subject,
                    type_hash = %envelope.type_hash,
                    "sphere event sent"
                ),
                Err(e) => warn!(subject = %subject, error = %e, "sphere event delivery failed"),
            }
        });
        Ok(())
    }
}
