use std::sync::Arc;

use crate::auth::AuthValidator;
use crate::config::GatewayConfig;
use crate::registry::NodeRegistry;
use crate::router::RequestRouter;

/// Shared gateway state available to every handler.
///
/// Cheaply cloneable; heavy members sit behind `Arc` or are
/// internally reference-counted (`reqwest::Client`).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub registry: Arc<NodeRegistry>,
    pub router: RequestRouter,
    pub auth: Arc<dyn AuthValidator>,
    /// Upstream client: no redirect following, per-request timeout.
    pub client: reqwest::Client,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        registry: Arc<NodeRegistry>,
        auth: Arc<dyn AuthValidator>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            config: Arc::new(config),
            router: RequestRouter::new(Arc::clone(&registry)),
            registry,
            auth,
            client,
        }
    }
}

/// Client used for proxied requests. Redirects are relayed to the browser,
/// never followed.
pub fn upstream_client(config: &GatewayConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(config.upstream_timeout)
        .build()
}
