//! Shared domain types for the shipyard node orchestrator.
//!
//! Pure data and pure functions only. No I/O lives here so every other
//! crate (gateway, job engine, persistence, node backend) can depend on it.

pub mod error;
pub mod job;
pub mod node;
pub mod paths;
pub mod trust;
pub mod types;
