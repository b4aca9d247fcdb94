//! `nodes` table row.

use shipyard_core::error::CoreError;
use shipyard_core::node::Node;
use shipyard_core::types::Timestamp;
use sqlx::FromRow;

/// A row from the `nodes` table.
#[derive(Debug, Clone, FromRow)]
pub struct NodeRow {
    pub id: String,
    pub name: String,
    pub address: String,
    pub secret: String,
    pub is_primary: bool,
    pub status: String,
    pub consecutive_failures: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<NodeRow> for Node {
    type Error = CoreError;

    fn try_from(row: NodeRow) -> Result<Self, Self::Error> {
        Ok(Node {
            id: row.id,
            name: row.name,
            address: row.address,
            secret: row.secret,
            is_primary: row.is_primary,
            status: row.status.parse()?,
            consecutive_failures: row.consecutive_failures,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
