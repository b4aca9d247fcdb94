//! Long-running background tasks spawned by the node binary.

pub mod node_health;
pub mod registration;
