//! Boundary handlers for sphere-event subscription requests.
//!
//! Requests arrive from the external RPC layer addressed to a scene. They
//! are validated here, before touching the scene, so a malformed request
//! never changes the subscription table.

use engine_net::ErrorCode;
use engine_net::messages::{
    SubscribeSphereEventRequest, SubscribeSphereEventResponse, UnsubscribeSphereEventRequest,
    UnsubscribeSphereEventResponse,
};
use tracing::warn;

use crate::error::SceneError;
use crate::runner::SceneHandle;

/// The response code for a request the scene could not apply.
#[must_use]
pub fn scene_error_code(error: &SceneError) -> ErrorCode {
    match error {
        SceneError::Closed(_) => ErrorCode::SceneUnavailable,
        _ => ErrorCode::SceneRequestFailed,
    }
}

/// Check a subscribe request.
///
/// # Errors
///
/// Returns the rejection code for a zero route id or a zero type hash.
pub fn validate_subscribe(request: &SubscribeSphereEventRequest) -> Result<(), ErrorCode> {
    if !request.route_id.is_valid() {
        return Err(ErrorCode::SubscribeSphereEventInvalidRouteId);
    }
    if !request.type_hash.is_valid() {
        return Err(ErrorCode::SubscribeSphereEventInvalidTypeHash);
    }
    Ok(())
}

/// Check an unsubscribe request.
///
/// # Errors
///
/// Returns the rejection code for a zero route id or a zero type hash.
pub fn validate_unsubscribe(request: &UnsubscribeSphereEventRequest) -> Result<(), ErrorCode> {
    if !request.route_id.is_valid() {
        return Err(ErrorCode::UnsubscribeSphereEventInvalidRouteId);
    }
    if !request.type_hash.is_valid() {
        return Err(ErrorCode::UnsubscribeSphereEventInvalidTypeHash);
    }
    Ok(())
}

/// Subscribe a remote route to a sphere event type on `scene`.
///
/// Subscribing twice is accepted and leaves a single entry.
pub async fn handle_subscribe(
    scene: &SceneHandle,
    request: SubscribeSphereEventRequest,
) -> SubscribeSphereEventResponse {
    if let Err(code) = validate_subscribe(&request) {
        warn!(
            scene = %scene.name(),
            route_id = %request.route_id,
            type_hash = %request.type_hash,
            error = %code,
            "subscribe rejected"
        );
        return SubscribeSphereEventResponse::rejected(code);
    }
    let SubscribeSphereEventRequest {
        route_id,
        type_hash,
    } = request;
    match scene
        .post(move |s| s.subscribe_sphere_event(route_id, type_hash))
        .await
    {
        Ok(_) => SubscribeSphereEventResponse::success(),
        Err(e) => {
            warn!(scene = %scene.name(), error = %e, "subscribe failed");
            SubscribeSphereEventResponse::rejected(scene_error_code(&e))
        }
    }
}

/// Remove a remote route's subscription on `scene`.
///
/// Unsubscribing an unknown pair is accepted.
pub async fn handle_unsubscribe(
    scene: &SceneHandle,
    request: UnsubscribeSphereEventRequest,
) -> UnsubscribeSphereEventResponse {
    if let Err(code) = validate_unsubscribe(&request) {
        warn!(
            scene = %scene.name(),
            route_id = %request.route_id,
            type_hash = %request.type_hash,
            error = %code,
            "unsubscribe rejected"
        );
        return UnsubscribeSphereEventResponse::rejected(code);
    }
    let UnsubscribeSphereEventRequest {
        route_id,
        type_hash,
    } = request;
    match scene
        .post(move |s| s.unsubscribe_sphere_event(route_id, type_hash))
        .await
    {
        Ok(_) => UnsubscribeSphereEventResponse::success(),
        Err(e) => {
            warn!(scene = %scene.name(), error = %e, "unsubscribe failed");
            UnsubscribeSphereEventResponse::rejected(scene_error_code(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use engine_assembly::ManifestRegistry;
    use engine_component::TypeIdentity;
    use engine_net::RouteId;

    use crate::{Scene, SceneConfig, SceneRunner};

    const BOOM: TypeIdentity = TypeIdentity::from_name("game::Boom");

    async fn scene() -> SceneHandle {
        SceneRunner::new(SceneConfig::new("sphere"))
            .start(&ManifestRegistry::new())
            .await
    }

    async fn routes(scene: &SceneHandle) -> Vec<RouteId> {
        scene
            .post(|s| s.sphere_events().subscribers(BOOM).to_vec())
            .await
            .unwrap()
    }

    fn subscribe(route: u64, ty: TypeIdentity) -> SubscribeSphereEventRequest {
        SubscribeSphereEventRequest {
            route_id: RouteId(route),
            type_hash: ty,
        }
    }

    fn unsubscribe(route: u64, ty: TypeIdentity) -> UnsubscribeSphereEventRequest {
        UnsubscribeSphereEventRequest {
            route_id: RouteId(route),
            type_hash: ty,
        }
    }

    #[test]
    fn test_validation_codes_are_distinct() {
        assert_eq!(
            validate_subscribe(&subscribe(0, BOOM)),
            Err(ErrorCode::SubscribeSphereEventInvalidRouteId)
        );
        assert_eq!(
            validate_subscribe(&subscribe(1, TypeIdentity(0))),
            Err(ErrorCode::SubscribeSphereEventInvalidTypeHash)
        );
        assert_eq!(
            validate_unsubscribe(&unsubscribe(0, BOOM)),
            Err(ErrorCode::UnsubscribeSphereEventInvalidRouteId)
        );
        assert_eq!(
            validate_unsubscribe(&unsubscribe(1, TypeIdentity(0))),
            Err(ErrorCode::UnsubscribeSphereEventInvalidTypeHash)
        );
        assert_eq!(validate_subscribe(&subscribe(1, BOOM)), Ok(()));
    }

    #[tokio::test]
    async fn test_subscribe_then_unsubscribe() {
        let scene = scene().await;
        assert!(handle_subscribe(&scene, subscribe(3, BOOM)).await.is_success());
        assert!(handle_subscribe(&scene, subscribe(3, BOOM)).await.is_success());
        assert_eq!(routes(&scene).await, vec![RouteId(3)]);

        assert!(handle_unsubscribe(&scene, unsubscribe(3, BOOM)).await.is_success());
        assert!(handle_unsubscribe(&scene, unsubscribe(3, BOOM)).await.is_success());
        assert!(routes(&scene).await.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_request_leaves_table_alone() {
        let scene = scene().await;
        handle_subscribe(&scene, subscribe(3, BOOM)).await;

        let response = handle_subscribe(&scene, subscribe(0, BOOM)).await;
        assert_eq!(response.error(), Some(ErrorCode::SubscribeSphereEventInvalidRouteId));
        let response = handle_unsubscribe(&scene, unsubscribe(3, TypeIdentity(0))).await;
        assert_eq!(response.error(), Some(ErrorCode::UnsubscribeSphereEventInvalidTypeHash));
        assert_eq!(routes(&scene).await, vec![RouteId(3)]);
    }

    #[tokio::test]
    async fn test_closed_scene_is_unavailable() {
        let scene = scene().await;
        scene.post(Scene::close).await.unwrap();
        let response = handle_subscribe(&scene, subscribe(3, BOOM)).await;
        assert_eq!(response.error(), Some(ErrorCode::SceneUnavailable));
    }

    #[tokio::test]
    async fn test_failed_job_on_live_scene_is_not_unavailable() {
        let scene = scene().await;
        let err = scene
            .post(|_: &mut Scene| -> bool { panic!("table corrupted") })
            .await
            .unwrap_err();
        assert_eq!(scene_error_code(&err), ErrorCode::SceneRequestFailed);
        assert_eq!(
            scene_error_code(&SceneError::Closed("sphere".into())),
            ErrorCode::SceneUnavailable
        );
        assert!(handle_subscribe(&scene, subscribe(3, BOOM)).await.is_success());
    }
}
