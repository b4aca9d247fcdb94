//! `docker compose` driven container runtime.
//!
//! Each app gets a project directory `{apps_dir}/app-{id}` holding its
//! compose file and `.env`, and a compose project named `shipyard-app-{id}`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use shipyard_core::job::AppDeployPayload;
use shipyard_core::types::DbId;
use shipyard_jobs::handlers::AppRuntime;
use shipyard_jobs::JobError;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const COMPOSE_FILE: &str = "docker-compose.yml";
const ENV_FILE: &str = ".env";

/// Captured stderr kept for error messages.
const MAX_ERROR_BYTES: usize = 4 * 1024;

pub struct ComposeRuntime {
    apps_dir: PathBuf,
    docker: String,
}

impl ComposeRuntime {
    pub fn new(apps_dir: impl Into<PathBuf>) -> Self {
        Self::with_binary(apps_dir, "docker")
    }

    /// Use `docker` as the executable instead of `docker` on `PATH`.
    pub fn with_binary(apps_dir: impl Into<PathBuf>, docker: impl Into<String>) -> Self {
        Self {
            apps_dir: apps_dir.into(),
            docker: docker.into(),
        }
    }

    pub fn project_dir(&self, app_id: DbId) -> PathBuf {
        self.apps_dir.join(format!("app-{app_id}"))
    }

    pub fn project_name(app_id: DbId) -> String {
        format!("shipyard-app-{app_id}")
    }

    /// Run `docker compose -p <project> -f <file> <args...>` in the project dir.
    async fn compose(
        &self,
        app_id: DbId,
        args: &[&str],
        cancel: &CancellationToken,
    ) -> Result<(), JobError> {
        let dir = self.project_dir(app_id);
        let project = Self::project_name(app_id);

        let mut cmd = Command::new(&self.docker);
        cmd.arg("compose")
            .args(["-p", project.as_str(), "-f", COMPOSE_FILE])
            .args(args)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(app_id, %project, ?args, "Running docker compose");
        let mut child = cmd
            .spawn()
            .map_err(|e| JobError::Runtime(format!("failed to start {}: {e}", self.docker)))?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(read_capped(stderr));

        // Dropping `child` on cancellation kills the process.
        let status = tokio::select! {
            status = child.wait() => status
                .map_err(|e| JobError::Runtime(format!("docker compose {}: {e}", args.join(" "))))?,
            _ = cancel.cancelled() => return Err(JobError::Cancelled),
        };

        if status.success() {
            return Ok(());
        }
        let stderr = stderr_task.await.unwrap_or_default();
        let detail = String::from_utf8_lossy(&stderr).trim().to_string();
        Err(JobError::Runtime(format!(
            "docker compose {} exited with {}: {detail}",
            args.join(" "),
            status.code().map_or_else(|| "signal".to_string(), |c| c.to_string()),
        )))
    }
}

async fn read_capped<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h).take(MAX_ERROR_BYTES as u64).read_to_end(&mut buf).await;
        // Keep draining so the child never blocks on a full pipe.
        let _ = tokio::io::copy(&mut h, &mut tokio::io::sink()).await;
    }
    buf
}

fn env_file(spec: &AppDeployPayload) -> String {
    spec.env
        .iter()
        .map(|(key, value)| format!("{key}={value}\n"))
        .collect()
}

async fn write_file(path: &Path, contents: &str) -> Result<(), JobError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| JobError::Runtime(format!("failed to write {}: {e}", path.display())))
}

#[async_trait]
impl AppRuntime for ComposeRuntime {
    async fn write_project(&self, app_id: DbId, spec: &AppDeployPayload) -> Result<(), JobError> {
        spec.validate().map_err(JobError::Payload)?;
        let dir = self.project_dir(app_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| JobError::Runtime(format!("failed to create {}: {e}", dir.display())))?;

        write_file(&dir.join(COMPOSE_FILE), &spec.compose).await?;
        write_file(&dir.join(ENV_FILE), &env_file(spec)).await?;
        tracing::debug!(app_id, dir = %dir.display(), "Compose project written");
        Ok(())
    }

    async fn pull(&self, app_id: DbId, cancel: &CancellationToken) -> Result<(), JobError> {
        self.compose(app_id, &["pull"], cancel).await
    }

    async fn up(&self, app_id: DbId, cancel: &CancellationToken) -> Result<(), JobError> {
        self.compose(app_id, &["up", "-d", "--remove-orphans"], cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;

    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("shipyard-compose-{}", uuid::Uuid::new_v4()))
    }

    fn spec() -> AppDeployPayload {
        AppDeployPayload {
            name: "blog".into(),
            compose: "services:\n  web:\n    image: nginx\n".into(),
            env: BTreeMap::from([
                ("PORT".to_string(), "80".to_string()),
                ("MODE".to_string(), "prod".to_string()),
            ]),
        }
    }

    #[tokio::test]
    async fn writes_compose_and_env_files() {
        let root = scratch_dir();
        let runtime = ComposeRuntime::new(&root);

        runtime.write_project(4, &spec()).await.unwrap();

        let dir = root.join("app-4");
        let compose = tokio::fs::read_to_string(dir.join(COMPOSE_FILE)).await.unwrap();
        let env = tokio::fs::read_to_string(dir.join(ENV_FILE)).await.unwrap();
        assert_eq!(compose, spec().compose);
        assert_eq!(env, "MODE=prod\nPORT=80\n");

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn env_values_with_line_breaks_are_refused() {
        let root = scratch_dir();
        let runtime = ComposeRuntime::new(&root);
        let mut spec = spec();
        spec.env.insert("MODE".into(), "prod\nDEBUG=1".into());

        assert_matches!(
            runtime.write_project(5, &spec).await,
            Err(JobError::Payload(_))
        );
        assert!(!root.join("app-5").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_status_decides_success() {
        let root = scratch_dir();
        let cancel = CancellationToken::new();

        let ok = ComposeRuntime::with_binary(&root, "true");
        ok.write_project(1, &spec()).await.unwrap();
        ok.pull(1, &cancel).await.unwrap();

        let failing = ComposeRuntime::with_binary(&root, "false");
        assert_matches!(failing.up(1, &cancel).await, Err(JobError::Runtime(msg)) if msg.contains("exited with 1"));

        let missing = ComposeRuntime::with_binary(&root, "/nonexistent/docker");
        assert_matches!(missing.pull(1, &cancel).await, Err(JobError::Runtime(msg)) if msg.contains("failed to start"));

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}
