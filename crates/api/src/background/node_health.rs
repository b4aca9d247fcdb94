//! Primary-only node health monitor.
//!
//! Probes every secondary's health endpoint on a fixed interval and folds
//! the result into its stored status with [`apply_probe`]. This loop is
//! the only writer of node health fields.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use shipyard_core::node::{apply_probe, HealthUpdate, Node, NodeStatus};
use shipyard_core::paths::HEALTH_PATH;
use shipyard_db::store::{NodeStore, StoreError};
use tokio_util::sync::CancellationToken;

/// Per-probe timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct NodeHealthMonitor {
    store: Arc<dyn NodeStore>,
    client: reqwest::Client,
    interval: Duration,
    unreachable_after: i32,
}

impl NodeHealthMonitor {
    /// `client` should carry [`PROBE_TIMEOUT`] as its request timeout.
    pub fn new(
        store: Arc<dyn NodeStore>,
        client: reqwest::Client,
        interval: Duration,
        unreachable_after: i32,
    ) -> Self {
        Self {
            store,
            client,
            interval,
            unreachable_after,
        }
    }

    /// Check every interval until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            unreachable_after = self.unreachable_after,
            "Node health monitor started"
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Node health monitor stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.check_all().await {
                        tracing::error!(error = %e, "Node health check failed");
                    }
                }
            }
        }
    }

    /// Probe all secondaries concurrently and persist the results.
    pub async fn check_all(&self) -> Result<(), StoreError> {
        let nodes = self.store.list().await?;
        let probes = nodes.iter().map(|node| async move {
            let update = if node.is_primary {
                apply_probe(0, true, self.unreachable_after)
            } else {
                let ok = self.probe(node).await;
                apply_probe(node.consecutive_failures, ok, self.unreachable_after)
            };
            (node, update)
        });

        for (node, update) in join_all(probes).await {
            self.record(node, update).await?;
        }
        Ok(())
    }

    async fn probe(&self, node: &Node) -> bool {
        let url = format!("{}{HEALTH_PATH}", node.address.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::debug!(node_id = %node.id, status = response.status().as_u16(), "Health probe failed");
                false
            }
            Err(e) => {
                tracing::debug!(node_id = %node.id, error = %e, "Health probe failed");
                false
            }
        }
    }

    async fn record(&self, node: &Node, update: HealthUpdate) -> Result<(), StoreError> {
        let unchanged =
            node.status == update.status && node.consecutive_failures == update.consecutive_failures;
        if unchanged {
            return Ok(());
        }

        self.store.record_health(&node.id, update).await?;
        match update.status {
            NodeStatus::Online if node.status != NodeStatus::Online => {
                tracing::info!(node_id = %node.id, "Node is back online");
            }
            NodeStatus::Online => {}
            status => {
                tracing::warn!(
                    node_id = %node.id,
                    %status,
                    failures = update.consecutive_failures,
                    "Node health probe failed",
                );
            }
        }
        Ok(())
    }
}
