use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// ```text
/// POST   /jobs                  -> submit_job
/// GET    /jobs/{id}             -> get_job
/// GET    /apps/{app_id}/jobs    -> list_app_jobs
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(jobs::submit_job))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/apps/{app_id}/jobs", get(jobs::list_app_jobs))
}
