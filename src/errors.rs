//! Client-facing error types.
//!
//! Every variant maps to a stable error code. The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(VoteError::NotReady)`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cluster::coordinator::CastError;

/// Response header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub request_id: String,
}

#[derive(Debug, Error)]
pub enum VoteError {
    /// The voter already has a vote on the coordinating node.
    #[error("voter '{voter_id}' has already voted")]
    DuplicateVote { voter_id: String },

    /// Too few nodes acknowledged the vote; it was rolled back.
    #[error("{message}")]
    QuorumNotReached { message: String },

    /// The node has not finished startup recovery.
    #[error("node is recovering and not yet serving requests")]
    NotReady,

    /// A request argument is invalid.
    #[error("{message}")]
    InvalidArgument { message: String },

    /// Catch-all for unexpected internal errors.
    #[error("internal error, please try again")]
    InternalError(#[from] anyhow::Error),
}

impl VoteError {
    pub fn code(&self) -> &'static str {
        match self {
            VoteError::DuplicateVote { .. } => "DuplicateVote",
            VoteError::QuorumNotReached { .. } => "QuorumNotReached",
            VoteError::NotReady => "NotReady",
            VoteError::InvalidArgument { .. } => "InvalidArgument",
            VoteError::InternalError(_) => "InternalError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            VoteError::DuplicateVote { .. } => StatusCode::CONFLICT,
            VoteError::QuorumNotReached { .. } => StatusCode::SERVICE_UNAVAILABLE,
            VoteError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            VoteError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            VoteError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CastError> for VoteError {
    fn from(e: CastError) -> Self {
        match e {
            CastError::Duplicate(d) => VoteError::DuplicateVote {
                voter_id: d.voter_id,
            },
            e @ (CastError::QuorumNotReached { .. } | CastError::MembershipUnavailable(_)) => {
                VoteError::QuorumNotReached {
                    message: e.to_string(),
                }
            }
        }
    }
}

impl IntoResponse for VoteError {
    fn into_response(self) -> Response {
        let request_id = generate_request_id();
        let status = self.status_code();
        if let VoteError::InternalError(ref e) = self {
            tracing::error!("Internal error [{}]: {:#}", request_id, e);
        }

        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            request_id: request_id.clone(),
        };
        (status, [(REQUEST_ID_HEADER, request_id)], Json(body)).into_response()
    }
}
