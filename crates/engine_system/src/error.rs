//! Scene errors and handler isolation.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use engine_component::RuntimeId;
use engine_net::{NetError, RouteId};

/// Errors surfaced by a scene to its callers.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// The scene's execution context has shut down.
    #[error("scene {0} is closed")]
    Closed(String),

    /// A posted job panicked. The scene itself is still running.
    #[error("job on scene {scene} panicked: {message}")]
    JobPanicked {
        /// The scene that ran the job.
        scene: String,
        /// The panic payload text.
        message: String,
    },

    /// An entity or event could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] NetError),

    /// A sphere event could not be handed to the remote sink.
    #[error("sphere event delivery to {route_id} failed: {source}")]
    Remote {
        /// The route that could not be served.
        route_id: RouteId,
        /// The underlying transport error.
        source: NetError,
    },

    /// No entity with this id exists in the scene.
    #[error("unknown entity {0}")]
    UnknownEntity(RuntimeId),
}

/// A captured handler failure.
#[derive(Debug, thiserror::Error)]
pub enum HandlerFault {
    /// The handler returned an error.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// Run a handler, turning both errors and panics into a [`HandlerFault`].
pub(crate) fn isolate<R>(f: impl FnOnce() -> anyhow::Result<R>) -> Result<R, HandlerFault> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(HandlerFault::Failed(e)),
        Err(payload) => Err(HandlerFault::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolate_passes_values_through() {
        assert_eq!(isolate(|| Ok(5)).unwrap(), 5);
    }

    #[test]
    fn test_isolate_captures_errors() {
        let fault = isolate::<()>(|| Err(anyhow::anyhow!("boom"))).unwrap_err();
        assert!(matches!(fault, HandlerFault::Failed(_)));
        assert_eq!(fault.to_string(), "boom");
    }

    #[test]
    fn test_isolate_captures_panics() {
        let fault = isolate::<()>(|| panic!("kaboom")).unwrap_err();
        match fault {
            HandlerFault::Panicked(message) => assert_eq!(message, "kaboom"),
            HandlerFault::Failed(e) => panic!("expected panic, got {e}"),
        }
    }

    #[test]
    fn test_closed_message() {
        let err = SceneError::Closed("lobby".into());
        assert_eq!(err.to_string(), "scene lobby is closed");
    }
}
