//! Secondary self-registration with the primary.

use std::time::Duration;

use shipyard_core::node::RegisterNode;
use shipyard_core::paths::NODE_REGISTER_PATH;
use shipyard_core::trust::GATEWAY_SECRET_HEADER;
use tokio_util::sync::CancellationToken;

/// Delay between registration attempts.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("primary rejected registration ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// One registration attempt.
pub async fn register(
    client: &reqwest::Client,
    primary_url: &str,
    secret: &str,
    node: &RegisterNode,
) -> Result<(), RegistrationError> {
    let response = client
        .post(format!("{primary_url}{NODE_REGISTER_PATH}"))
        .header(GATEWAY_SECRET_HEADER, secret)
        .json(node)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RegistrationError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    Ok(())
}

/// Register with the primary, retrying every `retry` until it succeeds or
/// `cancel` fires. Returns whether registration succeeded.
pub async fn run(
    client: reqwest::Client,
    primary_url: String,
    secret: String,
    node: RegisterNode,
    retry: Duration,
    cancel: CancellationToken,
) -> bool {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match register(&client, &primary_url, &secret, &node).await {
            Ok(()) => {
                tracing::info!(node_id = %node.id, primary = %primary_url, attempt, "Registered with primary");
                return true;
            }
            Err(e) => {
                tracing::warn!(node_id = %node.id, attempt, error = %e, "Registration with primary failed, retrying");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(node_id = %node.id, "Registration abandoned at shutdown");
                return false;
            }
            _ = tokio::time::sleep(retry) => {}
        }
    }
}
