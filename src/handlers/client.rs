//! Client-facing vote API.

use axum::extract::State;
use axum::Json;
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::VoteError;
use crate::votes::Tally;
use crate::AppState;

/// `POST /votes` request body.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CastVoteRequest {
    /// Identifier of the voter; one committed vote per voter.
    #[garde(length(min = 1, max = 128))]
    pub voter_id: String,
    /// Selected option.
    #[garde(length(min = 1, max = 128))]
    pub candidate: String,
}

/// `POST /votes` success body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CastVoteResponse {
    /// Always `committed`; failures use the error body.
    pub outcome: String,
    pub vote_id: Uuid,
    /// Node that coordinated the vote.
    pub node_id: String,
    /// Nodes holding the vote when it committed.
    pub votes: usize,
    pub required: usize,
}

/// `GET /results` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub node_id: String,
    pub tally: Tally,
    pub total: u64,
}

/// `POST /votes` -- Cast a vote through this node.
#[utoipa::path(
    post,
    path = "/votes",
    tag = "Votes",
    operation_id = "CastVote",
    request_body = CastVoteRequest,
    responses(
        (status = 200, description = "Vote committed on a majority of nodes", body = CastVoteResponse),
        (status = 400, description = "Missing or oversized voter id or candidate"),
        (status = 409, description = "Voter has already voted"),
        (status = 503, description = "Quorum not reached, or node still recovering")
    )
)]
pub async fn cast_vote(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CastVoteRequest>,
) -> Result<Json<CastVoteResponse>, VoteError> {
    req.validate().map_err(|e| VoteError::InvalidArgument {
        message: e.to_string(),
    })?;

    let committed = state.node.cast_vote(req.voter_id, req.candidate).await?;
    Ok(Json(CastVoteResponse {
        outcome: "committed".to_string(),
        vote_id: committed.record.vote_id,
        node_id: state.node.node_id().to_string(),
        votes: committed.votes,
        required: committed.required,
    }))
}

/// `GET /results` -- This node's current tally.
#[utoipa::path(
    get,
    path = "/results",
    tag = "Votes",
    operation_id = "GetResults",
    responses(
        (status = 200, description = "Current tally"),
        (status = 503, description = "Node still recovering")
    )
)]
pub async fn get_results(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ResultsResponse>, VoteError> {
    let tally = state.node.get_results()?;
    let total = tally.values().sum();
    Ok(Json(ResultsResponse {
        node_id: state.node.node_id().to_string(),
        tally,
        total,
    }))
}
