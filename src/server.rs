//! Axum router construction for a voting node.
//!
//! The [`app`] function wires the client API, the internal peer API, and
//! the operational endpoints, and returns a ready-to-serve [`axum::Router`].

use axum::{
    extract::State,
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::errors::{generate_request_id, REQUEST_ID_HEADER};
use crate::handlers::{client, peer};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    info(
        title = "votequorum node API",
        version = "0.1.0",
        description = "Replicated voting with quorum commit"
    ),
    paths(
        health_check,
        readiness,
        crate::handlers::client::cast_vote,
        crate::handlers::client::get_results,
        crate::handlers::peer::replicate_vote,
        crate::handlers::peer::fetch_state,
    ),
    components(schemas(
        crate::handlers::client::CastVoteRequest,
        crate::handlers::client::CastVoteResponse,
        crate::votes::VoteRecord,
    )),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Votes", description = "Client vote API"),
        (name = "Internal", description = "Node-to-node replication and recovery"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] for one node.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        .route("/votes", post(client::cast_vote))
        .route("/results", get(client::get_results))
        .route("/internal/replicate", post(peer::replicate_vote))
        .route("/internal/state", get(peer::fetch_state))
        .with_state(state)
        .layer(middleware::from_fn(request_id_middleware))
        // metrics_middleware is outer (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Adds `x-request-id` to every response that does not already carry one.
async fn request_id_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    if !response.headers().contains_key(REQUEST_ID_HEADER) {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
    }
    response
}

/// `GET /health` -- Process is up.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Process is running"))
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

/// `GET /ready` -- Recovery has completed and votes are served.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Node is serving"),
        (status = 503, description = "Node is still recovering")
    )
)]
async fn readiness(State(state): State<Arc<AppState>>) -> Response {
    let body = serde_json::json!({
        "node_id": state.node.node_id(),
        "ready": state.node.is_ready(),
    });
    let status = if state.node.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
