//! Row structs decoded by sqlx and converted into `shipyard_core` types.

pub mod job;
pub mod node;
