//! Axum router for the standalone registry process.
//!
//! - `GET    /nodes`     -> list live node ids
//! - `GET    /nodes/:id` -> resolve one node, 404 if unknown or expired
//! - `PUT    /nodes/:id` -> register / heartbeat
//! - `DELETE /nodes/:id` -> deregister, 404 if unknown

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use super::memory::MemoryRegistry;
use super::{NodeEntry, NodeList, RegisterRequest};

/// Build the registry router over `registry`.
pub fn app(registry: Arc<MemoryRegistry>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/nodes", get(list_nodes))
        .route(
            "/nodes/:id",
            get(resolve_node).put(register_node).delete(deregister_node),
        )
        .with_state(registry)
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

async fn list_nodes(State(registry): State<Arc<MemoryRegistry>>) -> Json<NodeList> {
    Json(NodeList {
        nodes: registry.live_ids(),
    })
}

async fn resolve_node(
    State(registry): State<Arc<MemoryRegistry>>,
    Path(node_id): Path<String>,
) -> Response {
    match registry.lookup(&node_id) {
        Some(endpoint) => Json(NodeEntry { node_id, endpoint }).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn register_node(
    State(registry): State<Arc<MemoryRegistry>>,
    Path(node_id): Path<String>,
    Json(body): Json<RegisterRequest>,
) -> StatusCode {
    if registry.lookup(&node_id).as_deref() != Some(body.endpoint.as_str()) {
        info!(node_id = %node_id, endpoint = %body.endpoint, "Node registered");
    } else {
        debug!(node_id = %node_id, "Registration refreshed");
    }
    registry.insert(&node_id, &body.endpoint);
    StatusCode::NO_CONTENT
}

async fn deregister_node(
    State(registry): State<Arc<MemoryRegistry>>,
    Path(node_id): Path<String>,
) -> StatusCode {
    if registry.remove(&node_id) {
        info!(node_id = %node_id, "Node deregistered");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_resolve_unknown_is_404() {
        let app = app(Arc::new(MemoryRegistry::new()));
        let resp = app
            .oneshot(Request::get("/nodes/ghost").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_register_then_list() {
        let registry = Arc::new(MemoryRegistry::new());
        let resp = app(registry.clone())
            .oneshot(
                Request::put("/nodes/server1")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"endpoint":"http://127.0.0.1:9101"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = app(registry)
            .oneshot(Request::get("/nodes").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let list: NodeList = serde_json::from_slice(&body).unwrap();
        assert!(list.nodes.contains("server1"));
    }
}
