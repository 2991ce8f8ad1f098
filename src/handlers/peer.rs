//! Node-to-node endpoints. Not meant for clients.

use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::errors::VoteError;
use crate::votes::{ReplicateReply, VoteRecord, VoteSnapshot};
use crate::AppState;

/// `POST /internal/replicate` -- Apply a vote coordinated by a peer.
///
/// A duplicate voter is a normal reply (`rejected`), not an HTTP error.
#[utoipa::path(
    post,
    path = "/internal/replicate",
    tag = "Internal",
    operation_id = "ReplicateVote",
    request_body = VoteRecord,
    responses(
        (status = 200, description = "Acked or rejected as duplicate"),
        (status = 503, description = "Node still recovering")
    )
)]
pub async fn replicate_vote(
    State(state): State<Arc<AppState>>,
    Json(record): Json<VoteRecord>,
) -> Result<Json<ReplicateReply>, VoteError> {
    Ok(Json(state.node.replicate_vote(record).await?))
}

/// `GET /internal/state` -- Full snapshot for a recovering peer.
#[utoipa::path(
    get,
    path = "/internal/state",
    tag = "Internal",
    operation_id = "FetchState",
    responses(
        (status = 200, description = "Tally, voted voters, and log"),
        (status = 503, description = "Node still recovering")
    )
)]
pub async fn fetch_state(
    State(state): State<Arc<AppState>>,
) -> Result<Json<VoteSnapshot>, VoteError> {
    Ok(Json(state.node.fetch_state()?))
}
