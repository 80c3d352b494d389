// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Gateway node directory.
//!
//! Lists tunnel gateways clients can connect to. With a registry configured
//! the list comes from the registry and is ranked by the reputation service;
//! otherwise the gateway lists only itself.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::ToSchema;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// A tunnel gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NodeInfo {
    pub id: String,
    pub endpoint: String,
    pub public_key: String,
    pub region: String,
    /// Reputation score, when the reputation service knows the node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reputation: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeDirectoryError {
    #[error("node registry request failed: {0}")]
    Request(String),

    #[error("node registry response was invalid: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait NodeDirectory: Send + Sync {
    /// Known nodes, best reputation first.
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>, NodeDirectoryError>;
}

/// Registry payloads come either bare or wrapped in `{"nodes": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RegistryResponse {
    Bare(Vec<NodeInfo>),
    Wrapped { nodes: Vec<NodeInfo> },
}

impl RegistryResponse {
    fn into_nodes(self) -> Vec<NodeInfo> {
        match self {
            RegistryResponse::Bare(nodes) | RegistryResponse::Wrapped { nodes } => nodes,
        }
    }
}

/// Registry + reputation service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpNodeDirectory {
    registry_url: String,
    reputation_url: Option<String>,
    http: Client,
}

impl HttpNodeDirectory {
    pub fn new(
        registry_url: impl Into<String>,
        reputation_url: Option<String>,
    ) -> Result<Self, NodeDirectoryError> {
        let http = Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| NodeDirectoryError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            registry_url: registry_url.into(),
            reputation_url,
            http,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, NodeDirectoryError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| NodeDirectoryError::Request(format!("GET {url} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NodeDirectoryError::Request(format!(
                "GET {url} returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| NodeDirectoryError::InvalidResponse(format!("GET {url} invalid JSON: {e}")))
    }
}

#[async_trait]
impl NodeDirectory for HttpNodeDirectory {
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>, NodeDirectoryError> {
        let nodes = self
            .get_json::<RegistryResponse>(&self.registry_url)
            .await?
            .into_nodes();

        let scores = match &self.reputation_url {
            Some(url) => match self.get_json::<HashMap<String, f64>>(url).await {
                Ok(scores) => scores,
                Err(e) => {
                    warn!(error = %e, "Reputation lookup failed, listing nodes unranked");
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };

        debug!(nodes = nodes.len(), scored = scores.len(), "Fetched node registry");
        Ok(rank(nodes, &scores))
    }
}

/// A fixed node list; used for the gateway's own entry.
#[derive(Debug, Clone)]
pub struct StaticNodeDirectory {
    nodes: Vec<NodeInfo>,
}

impl StaticNodeDirectory {
    pub fn new(nodes: Vec<NodeInfo>) -> Self {
        Self { nodes }
    }
}

#[async_trait]
impl NodeDirectory for StaticNodeDirectory {
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>, NodeDirectoryError> {
        Ok(self.nodes.clone())
    }
}

/// Attach scores and sort by score descending; unscored nodes last, ties by id.
pub fn rank(mut nodes: Vec<NodeInfo>, scores: &HashMap<String, f64>) -> Vec<NodeInfo> {
    for node in &mut nodes {
        if let Some(score) = scores.get(&node.id) {
            node.reputation = Some(*score);
        }
    }
    nodes.sort_by(|a, b| match (a.reputation, b.reputation) {
        (Some(x), Some(y)) => y.total_cmp(&x).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    });
    nodes
}

/// Nodes in `region`, compared case-insensitively.
pub fn filter_region(nodes: Vec<NodeInfo>, region: &str) -> Vec<NodeInfo> {
    let region = region.trim();
    nodes
        .into_iter()
        .filter(|n| n.region.eq_ignore_ascii_case(region))
        .collect()
}
