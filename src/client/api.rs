//! Calls a client makes against a single node.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

use crate::errors::ErrorBody;
use crate::handlers::client::{CastVoteRequest, CastVoteResponse, ResultsResponse};
use crate::votes::{CastOutcome, Tally};

#[derive(Debug, Error)]
pub enum CallError {
    /// The node could not be reached or did not answer in time.
    #[error("node unreachable: {0}")]
    Unreachable(String),

    /// The node answered with an error other than a vote outcome.
    #[error("node returned {code}: {message}")]
    Server { code: String, message: String },
}

impl CallError {
    /// Whether the session should move on to another node. A node that is
    /// still recovering is as good as unreachable.
    pub fn triggers_failover(&self) -> bool {
        match self {
            CallError::Unreachable(_) => true,
            CallError::Server { code, .. } => code == "NotReady",
        }
    }
}

pub trait NodeApi: Send + Sync + 'static {
    fn cast_vote(
        &self,
        endpoint: &str,
        voter_id: &str,
        candidate: &str,
    ) -> Pin<Box<dyn Future<Output = Result<CastOutcome, CallError>> + Send + '_>>;

    fn get_results(
        &self,
        endpoint: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Tally, CallError>> + Send + '_>>;
}

pub struct HttpNodeApi {
    client: reqwest::Client,
}

impl HttpNodeApi {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        Ok(Self { client })
    }
}

fn url(endpoint: &str, path: &str) -> String {
    format!("{}{}", endpoint.trim_end_matches('/'), path)
}

fn unreachable(e: reqwest::Error) -> CallError {
    CallError::Unreachable(e.to_string())
}

/// Turn a non-success response into a `CallError`, falling back to the
/// status line when the body is not an error document.
async fn server_error(resp: reqwest::Response) -> CallError {
    let status = resp.status();
    match resp.json::<ErrorBody>().await {
        Ok(body) => CallError::Server {
            code: body.code,
            message: body.message,
        },
        Err(_) => CallError::Server {
            code: status.as_u16().to_string(),
            message: status.to_string(),
        },
    }
}

impl NodeApi for HttpNodeApi {
    fn cast_vote(
        &self,
        endpoint: &str,
        voter_id: &str,
        candidate: &str,
    ) -> Pin<Box<dyn Future<Output = Result<CastOutcome, CallError>> + Send + '_>> {
        let url = url(endpoint, "/votes");
        let body = CastVoteRequest {
            voter_id: voter_id.to_string(),
            candidate: candidate.to_string(),
        };
        Box::pin(async move {
            let resp = self
                .client
                .post(url)
                .json(&body)
                .send()
                .await
                .map_err(unreachable)?;
            if resp.status().is_success() {
                let committed: CastVoteResponse = resp.json().await.map_err(unreachable)?;
                return Ok(CastOutcome::Committed {
                    vote_id: committed.vote_id,
                });
            }
            match server_error(resp).await {
                CallError::Server { code, .. } if code == "DuplicateVote" => {
                    Ok(CastOutcome::DuplicateVote)
                }
                CallError::Server { code, .. } if code == "QuorumNotReached" => {
                    Ok(CastOutcome::QuorumNotReached)
                }
                other => Err(other),
            }
        })
    }

    fn get_results(
        &self,
        endpoint: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Tally, CallError>> + Send + '_>> {
        let url = url(endpoint, "/results");
        Box::pin(async move {
            let resp = self.client.get(url).send().await.map_err(unreachable)?;
            if !resp.status().is_success() {
                return Err(server_error(resp).await);
            }
            let results: ResultsResponse = resp.json().await.map_err(unreachable)?;
            Ok(results.tally)
        })
    }
}
