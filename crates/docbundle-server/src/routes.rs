// ABOUTME: Route table for the docbundle HTTP API.
// ABOUTME: Assembles document and bundle routes with tracing and optional bearer auth.

use axum::Router;
use axum::routing::{delete, get, post, put};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::SharedState;
use crate::auth::AuthLayer;

/// Build the complete Axum router. With an auth token, every /api route
/// requires `Authorization: Bearer <token>`.
pub fn create_router(state: SharedState, auth_token: Option<String>) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/api/documents", post(api::documents::create_document))
        .route("/api/documents/unassigned", get(api::documents::list_unassigned))
        .route(
            "/api/documents/{id}",
            get(api::documents::get_document).delete(api::documents::delete_document),
        )
        .route("/api/documents/{id}/data", put(api::documents::update_document_data))
        .route(
            "/api/bundles",
            get(api::bundles::list_bundles).post(api::bundles::bundle_document),
        )
        .route("/api/bundles/lookup", get(api::bundles::lookup_bundle))
        .route(
            "/api/bundles/{id}",
            get(api::bundles::get_bundle).delete(api::bundles::delete_bundle),
        )
        .route("/api/bundles/{id}/add", post(api::bundles::attach_document))
        .route(
            "/api/bundles/{id}/documents/{document_id}",
            delete(api::bundles::detach_document),
        )
        .route("/api/bundles/{id}/refresh", post(api::bundles::refresh_snapshot))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    match auth_token {
        Some(token) => router.layer(AuthLayer::new(token)),
        None => router,
    }
}

/// Health check handler. Returns 200 OK with a simple JSON body.
async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::AppState;
    use axum::body::Body;
    use docbundle_store::BundleStore;
    use http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> SharedState {
        Arc::new(AppState::new(BundleStore::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = create_router(test_state(), None);
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn token_guards_api_but_not_health() {
        let state = test_state();

        let resp = create_router(Arc::clone(&state), Some("s3cret".to_string()))
            .oneshot(Request::get("/api/bundles?org_id=1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);

        let resp = create_router(Arc::clone(&state), Some("s3cret".to_string()))
            .oneshot(
                Request::get("/api/bundles?org_id=1")
                    .header("authorization", "Bearer s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let resp = create_router(state, Some("s3cret".to_string()))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
}
