//! HTTP client for the standalone registry server (`votequorum-registry`).

use reqwest::StatusCode;
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::{NodeEntry, NodeList, RegisterRequest, RegistryError, ServiceRegistry};

pub struct HttpRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRegistry {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn node_url(&self, node_id: &str) -> String {
        format!("{}/nodes/{}", self.base_url, node_id)
    }
}

fn unavailable(e: reqwest::Error) -> RegistryError {
    RegistryError::Unavailable(e.to_string())
}

impl ServiceRegistry for HttpRegistry {
    fn resolve(
        &self,
        node_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, RegistryError>> + Send + '_>> {
        let node_id = node_id.to_string();
        Box::pin(async move {
            let resp = self
                .client
                .get(self.node_url(&node_id))
                .send()
                .await
                .map_err(unavailable)?;
            if resp.status() == StatusCode::NOT_FOUND {
                return Err(RegistryError::NotFound { node_id });
            }
            let entry: NodeEntry = resp
                .error_for_status()
                .map_err(unavailable)?
                .json()
                .await
                .map_err(unavailable)?;
            Ok(entry.endpoint)
        })
    }

    fn list_active(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<BTreeSet<String>, RegistryError>> + Send + '_>> {
        Box::pin(async move {
            let list: NodeList = self
                .client
                .get(format!("{}/nodes", self.base_url))
                .send()
                .await
                .map_err(unavailable)?
                .error_for_status()
                .map_err(unavailable)?
                .json()
                .await
                .map_err(unavailable)?;
            Ok(list.nodes)
        })
    }

    fn register(
        &self,
        node_id: &str,
        endpoint: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), RegistryError>> + Send + '_>> {
        let url = self.node_url(node_id);
        let body = RegisterRequest {
            endpoint: endpoint.to_string(),
        };
        Box::pin(async move {
            self.client
                .put(url)
                .json(&body)
                .send()
                .await
                .map_err(unavailable)?
                .error_for_status()
                .map_err(unavailable)?;
            Ok(())
        })
    }

    fn deregister(
        &self,
        node_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), RegistryError>> + Send + '_>> {
        let url = self.node_url(node_id);
        Box::pin(async move {
            let resp = self.client.delete(url).send().await.map_err(unavailable)?;
            if resp.status() != StatusCode::NOT_FOUND {
                resp.error_for_status().map_err(unavailable)?;
            }
            Ok(())
        })
    }
}
