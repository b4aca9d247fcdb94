pub mod health;
pub mod jobs;
pub mod nodes;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// /health                     liveness (public)
///
/// /nodes                      node list (gateway secret)
/// /nodes/register             secondary self-registration (gateway secret, primary only)
///
/// /jobs                       submit
/// /jobs/{id}                  poll one job
/// /apps/{app_id}/jobs         recent jobs for an app
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/nodes", nodes::router())
        .merge(jobs::router())
}
