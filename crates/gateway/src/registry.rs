//! Gateway-side cache of node identity and reachability.
//!
//! The primary's node list is authoritative. [`NodeRegistry::refresh`]
//! fetches it and swaps in a whole new snapshot, so nodes removed upstream
//! vanish on the next cycle instead of lingering. Reads take a shared lock
//! and never block on I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::Duration;

use shipyard_core::node::NodeSummary;
use shipyard_core::paths::NODES_PATH;
use shipyard_core::trust::GATEWAY_SECRET_HEADER;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Errors from fetching the node list.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The HTTP request itself failed (connect, timeout, decode).
    #[error("node list request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The primary answered with a non-2xx status.
    #[error("node list request returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Default)]
struct Snapshot {
    nodes: HashMap<String, NodeSummary>,
    primary_id: Option<String>,
}

pub struct NodeRegistry {
    client: reqwest::Client,
    primary_url: String,
    secret: String,
    refresh_interval: Duration,
    snapshot: RwLock<Snapshot>,
    initialized: AtomicBool,
}

impl NodeRegistry {
    /// `primary_url` is both where the node list is fetched from and what
    /// [`primary_base_url`](Self::primary_base_url) returns.
    pub fn new(
        client: reqwest::Client,
        primary_url: impl Into<String>,
        secret: impl Into<String>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            client,
            primary_url: primary_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
            refresh_interval,
            snapshot: RwLock::new(Snapshot::default()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Refresh once now, then keep refreshing every interval in the
    /// background until `cancel` fires.
    ///
    /// A failed initial refresh is logged, not returned; the registry stays
    /// uninitialized until a later tick succeeds.
    pub async fn start(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "Initial node registry refresh failed");
        }

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let period = registry.refresh_interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Node registry refresh stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = registry.refresh().await {
                            tracing::warn!(error = %e, "Node registry refresh failed, keeping last snapshot");
                        }
                    }
                }
            }
        })
    }

    /// Fetch the node list from the primary and replace the cache.
    pub async fn refresh(&self) -> Result<(), RegistryError> {
        let response = self
            .client
            .get(format!("{}{NODES_PATH}", self.primary_url))
            .header(GATEWAY_SECRET_HEADER, &self.secret)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let nodes: Vec<NodeSummary> = response.json().await?;
        self.apply_snapshot(nodes);
        Ok(())
    }

    /// Replace the cache with `nodes` and mark the registry initialized.
    pub fn apply_snapshot(&self, nodes: Vec<NodeSummary>) {
        let primary_id = nodes
            .iter()
            .find(|n| n.is_primary)
            .or_else(|| nodes.first())
            .map(|n| n.id.clone());

        let count = nodes.len();
        let nodes = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        {
            let mut snapshot = self.snapshot.write().unwrap_or_else(|p| p.into_inner());
            *snapshot = Snapshot { nodes, primary_id };
        }

        if !self.initialized.swap(true, Ordering::AcqRel) {
            tracing::info!(count, "Node registry initialized");
        } else {
            tracing::debug!(count, "Node registry refreshed");
        }
    }

    /// Address of `node_id`, or `None` if it is unknown or not online.
    pub fn get(&self, node_id: &str) -> Option<String> {
        self.read()
            .nodes
            .get(node_id)
            .filter(|n| n.status.is_routable())
            .map(|n| n.address.clone())
    }

    /// The cached entry for `node_id` regardless of its health.
    pub fn get_entry(&self, node_id: &str) -> Option<NodeSummary> {
        self.read().nodes.get(node_id).cloned()
    }

    /// Id of the node flagged primary, or the first listed node.
    pub fn primary_id(&self) -> Option<String> {
        self.read().primary_id.clone()
    }

    /// The configured primary address, not the one the primary reports.
    pub fn primary_base_url(&self) -> &str {
        &self.primary_url
    }

    /// Whether at least one refresh has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.snapshot.read().unwrap_or_else(|p| p.into_inner())
    }
}
