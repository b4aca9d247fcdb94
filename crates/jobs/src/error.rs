use shipyard_core::error::CoreError;

/// Why a job did not complete. The `Display` text is what gets persisted
/// in the job's `error_message`.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("unknown job type '{0}'")]
    UnknownType(String),

    #[error("no handler registered for job type '{0}'")]
    NoHandler(String),

    #[error("invalid payload: {0}")]
    Payload(#[source] CoreError),

    /// The container runtime rejected or failed an operation.
    #[error("container runtime: {0}")]
    Runtime(String),

    /// The tunnel provider rejected or failed an operation.
    #[error("tunnel provider: {0}")]
    Tunnel(String),

    #[error("cancelled before completion")]
    Cancelled,
}
