//! Nodes: independently running hosts that each own a subset of apps.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Default number of consecutive failed probes before a node is
/// considered unreachable rather than merely offline.
pub const DEFAULT_UNREACHABLE_AFTER: i32 = 3;

/// Reachability of a node as last observed by the primary's health loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Offline,
    Unreachable,
}

impl NodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Online => "online",
            NodeStatus::Offline => "offline",
            NodeStatus::Unreachable => "unreachable",
        }
    }

    /// Only online nodes may receive routed traffic.
    pub fn is_routable(self) -> bool {
        self == NodeStatus::Online
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(NodeStatus::Online),
            "offline" => Ok(NodeStatus::Offline),
            "unreachable" => Ok(NodeStatus::Unreachable),
            other => Err(CoreError::Validation(format!("unknown node status '{other}'"))),
        }
    }
}

/// A registered node as held by the primary's record store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub address: String,
    #[serde(skip_serializing)]
    pub secret: String,
    pub is_primary: bool,
    pub status: NodeStatus,
    pub consecutive_failures: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Wire shape of one element of the node-list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub is_primary: bool,
    pub status: NodeStatus,
}

impl From<&Node> for NodeSummary {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            address: node.address.clone(),
            is_primary: node.is_primary,
            status: node.status,
        }
    }
}

/// Body of `POST /api/nodes/register`, also used by the primary to seed itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterNode {
    pub id: String,
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub is_primary: bool,
}

impl RegisterNode {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.trim().is_empty() {
            return Err(CoreError::Validation("node id must not be empty".into()));
        }
        if !(self.address.starts_with("http://") || self.address.starts_with("https://")) {
            return Err(CoreError::Validation(format!(
                "node address '{}' must be an http(s) URL",
                self.address
            )));
        }
        Ok(())
    }
}

/// Result of folding one health probe into a node's health fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthUpdate {
    pub status: NodeStatus,
    pub consecutive_failures: i32,
}

/// Compute a node's next health state after a probe.
///
/// A success resets the failure counter. Failures go `offline` first and
/// `unreachable` once `unreachable_after` consecutive probes have failed.
pub fn apply_probe(current_failures: i32, probe_ok: bool, unreachable_after: i32) -> HealthUpdate {
    if probe_ok {
        return HealthUpdate {
            status: NodeStatus::Online,
            consecutive_failures: 0,
        };
    }

    let failures = current_failures.saturating_add(1);
    let status = if failures >= unreachable_after.max(1) {
        NodeStatus::Unreachable
    } else {
        NodeStatus::Offline
    };
    HealthUpdate {
        status,
        consecutive_failures: failures,
    }
}
