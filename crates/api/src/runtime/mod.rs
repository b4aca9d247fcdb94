//! Concrete collaborators for the built-in job handlers.

pub mod compose;
pub mod tunnel;

pub use compose::ComposeRuntime;
pub use tunnel::{QuickTunnels, TunnelApiClient, TunnelService};
