//! Client session with failover across nodes.
//!
//! A session is bound to one node at a time. When a call to the bound node
//! fails to reach it, the session rebinds to the next node in its list and
//! retries the same request there. Each node is tried at most once per
//! request; when every node has failed the request ends with
//! [`ClientError::AllNodesUnreachable`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::api::{CallError, NodeApi};
use crate::registry::{RegistryError, ServiceRegistry};
use crate::votes::{CastOutcome, Tally};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("all {attempted} known nodes are unreachable")]
    AllNodesUnreachable { attempted: usize },

    #[error("no node endpoints are known")]
    NoEndpoints,

    #[error("registry lookup failed: {0}")]
    Registry(#[from] RegistryError),

    /// The node answered with an error that another node would repeat.
    #[error(transparent)]
    Call(CallError),
}

/// Where the session is in its binding lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Bound { endpoint: String },
    /// The bound node failed; a replacement has not answered yet.
    Rebinding { failed: String },
    /// Every node failed the last request.
    Exhausted,
}

/// One request, replayable against any node.
trait Operation: Send + Sync {
    type Output: Send;

    fn name(&self) -> &'static str;

    fn call<'a>(
        &'a self,
        api: &'a dyn NodeApi,
        endpoint: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Self::Output, CallError>> + Send + 'a>>;
}

struct CastVote<'s> {
    voter_id: &'s str,
    candidate: &'s str,
}

impl Operation for CastVote<'_> {
    type Output = CastOutcome;

    fn name(&self) -> &'static str {
        "cast_vote"
    }

    fn call<'a>(
        &'a self,
        api: &'a dyn NodeApi,
        endpoint: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<CastOutcome, CallError>> + Send + 'a>> {
        api.cast_vote(endpoint, self.voter_id, self.candidate)
    }
}

struct GetResults;

impl Operation for GetResults {
    type Output = Tally;

    fn name(&self) -> &'static str {
        "get_results"
    }

    fn call<'a>(
        &'a self,
        api: &'a dyn NodeApi,
        endpoint: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Tally, CallError>> + Send + 'a>> {
        api.get_results(endpoint)
    }
}

pub struct ClientSession {
    api: Arc<dyn NodeApi>,
    endpoints: Vec<String>,
    /// Index of the bound endpoint.
    cursor: usize,
    state: SessionState,
}

impl ClientSession {
    /// Session over a fixed endpoint list, bound to the first entry.
    pub fn new(api: Arc<dyn NodeApi>, endpoints: Vec<String>) -> Result<Self, ClientError> {
        let first = endpoints.first().cloned().ok_or(ClientError::NoEndpoints)?;
        Ok(Self {
            api,
            endpoints,
            cursor: 0,
            state: SessionState::Bound { endpoint: first },
        })
    }

    /// Session over every node the registry currently lists.
    pub async fn discover(
        api: Arc<dyn NodeApi>,
        registry: &dyn ServiceRegistry,
    ) -> Result<Self, ClientError> {
        let mut endpoints = Vec::new();
        for node_id in registry.list_active().await? {
            match registry.resolve(&node_id).await {
                Ok(endpoint) => endpoints.push(endpoint),
                Err(RegistryError::NotFound { .. }) => {
                    debug!("Node {} vanished before resolve", node_id)
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!("Discovered {} nodes", endpoints.len());
        Self::new(api, endpoints)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub async fn cast_vote(
        &mut self,
        voter_id: &str,
        candidate: &str,
    ) -> Result<CastOutcome, ClientError> {
        self.execute(&CastVote {
            voter_id,
            candidate,
        })
        .await
    }

    pub async fn get_results(&mut self) -> Result<Tally, ClientError> {
        self.execute(&GetResults).await
    }

    /// Run `op` against the bound node, then each following node in turn,
    /// until one answers.
    async fn execute<O: Operation>(&mut self, op: &O) -> Result<O::Output, ClientError> {
        let count = self.endpoints.len();
        let start = self.cursor;
        for attempt in 0..count {
            let index = (start + attempt) % count;
            let endpoint = self.endpoints[index].clone();
            if attempt > 0 {
                info!("Rebinding to {} for {}", endpoint, op.name());
            }
            self.cursor = index;
            self.state = SessionState::Bound {
                endpoint: endpoint.clone(),
            };

            let result = op.call(self.api.as_ref(), &endpoint).await;
            match result {
                Ok(output) => return Ok(output),
                Err(e) if e.triggers_failover() => {
                    warn!("{} via {} failed: {}", op.name(), endpoint, e);
                    self.state = SessionState::Rebinding { failed: endpoint };
                }
                Err(e) => return Err(ClientError::Call(e)),
            }
        }
        self.cursor = start;
        self.state = SessionState::Exhausted;
        Err(ClientError::AllNodesUnreachable { attempted: count })
    }
}
