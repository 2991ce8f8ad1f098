//! Node-to-node calls: replicate one vote, fetch full state.

use reqwest::StatusCode;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

use crate::votes::{ReplicateReply, VoteRecord, VoteSnapshot};

/// Failure talking to a peer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection refused, reset, or timed out.
    #[error("peer unreachable: {0}")]
    Unreachable(String),

    /// Peer answered with a non-success status.
    #[error("peer returned {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Peer answered 2xx with a body we could not decode.
    #[error("malformed peer response: {0}")]
    Malformed(String),
}

impl TransportError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, TransportError::Unreachable(_))
    }
}

/// Peer RPC boundary. The coordinator and recovery only talk to peers
/// through this trait so tests can swap in an in-process cluster.
pub trait PeerTransport: Send + Sync + 'static {
    fn replicate_vote(
        &self,
        endpoint: &str,
        record: &VoteRecord,
    ) -> Pin<Box<dyn Future<Output = Result<ReplicateReply, TransportError>> + Send + '_>>;

    fn fetch_state(
        &self,
        endpoint: &str,
    ) -> Pin<Box<dyn Future<Output = Result<VoteSnapshot, TransportError>> + Send + '_>>;
}

/// JSON-over-HTTP transport against `/internal/*` on each peer.
pub struct HttpPeerTransport {
    client: reqwest::Client,
}

impl HttpPeerTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        Ok(Self { client })
    }
}

fn internal_url(endpoint: &str, path: &str) -> String {
    format!("{}/internal/{}", endpoint.trim_end_matches('/'), path)
}

fn send_error(e: reqwest::Error) -> TransportError {
    if e.is_decode() {
        TransportError::Malformed(e.to_string())
    } else {
        TransportError::Unreachable(e.to_string())
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, TransportError> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(TransportError::Rejected {
            status: status.as_u16(),
            message,
        });
    }
    resp.json::<T>()
        .await
        .map_err(|e| TransportError::Malformed(e.to_string()))
}

impl PeerTransport for HttpPeerTransport {
    fn replicate_vote(
        &self,
        endpoint: &str,
        record: &VoteRecord,
    ) -> Pin<Box<dyn Future<Output = Result<ReplicateReply, TransportError>> + Send + '_>> {
        let url = internal_url(endpoint, "replicate");
        let record = record.clone();
        Box::pin(async move {
            let resp = self
                .client
                .post(url)
                .json(&record)
                .send()
                .await
                .map_err(send_error)?;
            // A duplicate is reported in-band as 200 + rejected; a 409 here
            // would be a peer that predates that convention.
            if resp.status() == StatusCode::CONFLICT {
                return Ok(ReplicateReply::Rejected {
                    reason: crate::votes::RejectReason::DuplicateVote,
                });
            }
            decode(resp).await
        })
    }

    fn fetch_state(
        &self,
        endpoint: &str,
    ) -> Pin<Box<dyn Future<Output = Result<VoteSnapshot, TransportError>> + Send + '_>> {
        let url = internal_url(endpoint, "state");
        Box::pin(async move {
            let resp = self.client.get(url).send().await.map_err(send_error)?;
            decode(resp).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::votes::{Ballot, RejectReason};
    use axum::{http::StatusCode as AxumStatus, routing::get, routing::post, Json, Router};

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn record() -> VoteRecord {
        let ballot = Ballot::new("v1", "alice");
        VoteRecord {
            vote_id: ballot.vote_id,
            voter_id: ballot.voter_id,
            candidate: ballot.candidate,
            sequence: 1,
        }
    }

    #[tokio::test]
    async fn test_replicate_decodes_replies() {
        let acked = spawn(Router::new().route(
            "/internal/replicate",
            post(|Json(_): Json<VoteRecord>| async { Json(ReplicateReply::Acked) }),
        ))
        .await;
        let rejected = spawn(Router::new().route(
            "/internal/replicate",
            post(|| async {
                Json(ReplicateReply::Rejected {
                    reason: RejectReason::DuplicateVote,
                })
            }),
        ))
        .await;

        let transport = HttpPeerTransport::new(Duration::from_secs(2)).unwrap();
        assert_eq!(
            transport.replicate_vote(&acked, &record()).await.unwrap(),
            ReplicateReply::Acked
        );
        assert_eq!(
            transport.replicate_vote(&rejected, &record()).await.unwrap(),
            ReplicateReply::Rejected {
                reason: RejectReason::DuplicateVote
            }
        );
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        let endpoint = spawn(Router::new().route(
            "/internal/state",
            get(|| async { (AxumStatus::SERVICE_UNAVAILABLE, "recovering") }),
        ))
        .await;

        let transport = HttpPeerTransport::new(Duration::from_secs(2)).unwrap();
        match transport.fetch_state(&endpoint).await {
            Err(TransportError::Rejected { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "recovering");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_state_roundtrip() {
        let snapshot = VoteSnapshot::from_log(vec![record()]);
        let served = snapshot.clone();
        let endpoint = spawn(Router::new().route(
            "/internal/state",
            get(move || {
                let served = served.clone();
                async move { Json(served) }
            }),
        ))
        .await;

        let transport = HttpPeerTransport::new(Duration::from_secs(2)).unwrap();
        assert_eq!(transport.fetch_state(&endpoint).await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_dead_peer_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpPeerTransport::new(Duration::from_millis(500)).unwrap();
        let err = transport
            .replicate_vote(&format!("http://{addr}"), &record())
            .await
            .unwrap_err();
        assert!(err.is_unreachable());
    }

    #[tokio::test]
    async fn test_garbage_body_is_malformed() {
        let endpoint = spawn(Router::new().route(
            "/internal/state",
            get(|| async { (AxumStatus::OK, "not json") }),
        ))
        .await;

        let transport = HttpPeerTransport::new(Duration::from_secs(2)).unwrap();
        assert!(matches!(
            transport.fetch_state(&endpoint).await,
            Err(TransportError::Malformed(_))
        ));
    }
}
