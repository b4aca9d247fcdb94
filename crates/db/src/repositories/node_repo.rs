//! Repository for the `nodes` table.

use shipyard_core::node::{NodeStatus, RegisterNode};
use sqlx::PgPool;

use crate::models::node::NodeRow;

/// Column list for `nodes` queries.
const COLUMNS: &str = "\
    id, name, address, secret, is_primary, status, consecutive_failures, \
    created_at, updated_at";

pub struct NodeRepo;

impl NodeRepo {
    /// Insert a node or refresh its identity fields if it already exists.
    ///
    /// Health fields are left untouched on conflict; only the health loop
    /// writes them.
    pub async fn upsert(
        pool: &PgPool,
        input: &RegisterNode,
        secret: &str,
    ) -> Result<NodeRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO nodes (id, name, address, secret, is_primary, status) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 address = EXCLUDED.address, \
                 secret = EXCLUDED.secret, \
                 is_primary = EXCLUDED.is_primary, \
                 updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NodeRow>(&query)
            .bind(&input.id)
            .bind(&input.name)
            .bind(&input.address)
            .bind(secret)
            .bind(input.is_primary)
            .bind(NodeStatus::Online.as_str())
            .fetch_one(pool)
            .await
    }

    /// All nodes, primary first.
    pub async fn list(pool: &PgPool) -> Result<Vec<NodeRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM nodes ORDER BY is_primary DESC, created_at ASC, id ASC"
        );
        sqlx::query_as::<_, NodeRow>(&query).fetch_all(pool).await
    }

    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<NodeRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM nodes WHERE id = $1");
        sqlx::query_as::<_, NodeRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Write the outcome of a health probe.
    pub async fn record_health(
        pool: &PgPool,
        id: &str,
        status: NodeStatus,
        consecutive_failures: i32,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE nodes \
             SET status = $2, consecutive_failures = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(consecutive_failures)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
