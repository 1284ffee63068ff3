//! Ephemeral Docker sandbox for reproduction attempts.
//!
//! A `SandboxManager` is bound to one optional source repository and drives
//! the full container lifecycle the reproduction agent needs: build an image
//! from a model-authored Dockerfile, start a long-lived container with the
//! cloned repository mounted, and run shell commands inside it.
//!
//! The clone and the build context are separate trees on purpose: the clone
//! is bind-mounted at runtime, while the image is built from a minimal
//! context containing only the Dockerfile. Both live in temp directories
//! tracked by the process-wide [`cleanup::TempDirRegistry`].

pub mod cleanup;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::BuildImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::StreamExt;
use tar::Builder as TarBuilder;
use tokio::process::Command;
use uuid::Uuid;

use crate::error::SandboxError;
use crate::explorer::RepoId;
use self::cleanup::{temp_registry, TempDirRegistry};

/// Where the cloned repository is mounted inside reproduction containers.
pub const REPO_MOUNT_PATH: &str = "/app";

/// Stateful sandbox over one Docker daemon connection.
///
/// At most one active container per instance. Creating a second container
/// overwrites the stored identifier without disposing the first; disposing
/// is the caller's job (see [`SandboxManager::teardown`]).
pub struct SandboxManager {
    docker: Docker,
    source_repo: Option<RepoId>,
    registry: Arc<TempDirRegistry>,
    clone_dir: Option<PathBuf>,
    container_id: Option<String>,
}

impl SandboxManager {
    /// Create a sandbox using the process-wide temp-directory registry.
    pub fn new(docker: Docker, source_repo: Option<RepoId>) -> Self {
        Self::with_registry(docker, source_repo, temp_registry())
    }

    /// Create a sandbox with an explicit registry (used by tests).
    pub fn with_registry(
        docker: Docker,
        source_repo: Option<RepoId>,
        registry: Arc<TempDirRegistry>,
    ) -> Self {
        Self {
            docker,
            source_repo,
            registry,
            clone_dir: None,
            container_id: None,
        }
    }

    /// Identifier of the active container, if one has been created.
    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    /// Directory holding the repository clone, once one exists.
    pub fn clone_dir(&self) -> Option<&Path> {
        self.clone_dir.as_deref()
    }

    /// Build an image from the given Dockerfile text, tagged `image_name`.
    ///
    /// When a source repository is bound, it is first cloned into a fresh
    /// temp directory that later becomes the container bind mount. The
    /// build context itself is a second temp directory holding only the
    /// Dockerfile. The build stream is drained to completion; an error step
    /// in the stream is a build failure, and a drained stream without an
    /// inspectable image afterwards is its own failure mode.
    pub async fn build_image(
        &mut self,
        dockerfile: &str,
        image_name: &str,
    ) -> Result<String, SandboxError> {
        if let Some(repo) = self.source_repo.clone() {
            let dir = self.clone_repository(&repo).await?;
            self.clone_dir = Some(dir);
        }

        let context_dir = self.create_temp_dir("build")?;
        tokio::fs::write(context_dir.join("Dockerfile"), dockerfile).await?;
        let context_tar = archive_build_context(&context_dir)?;

        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: image_name.to_string(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(options, None, Some(context_tar.into()));
        while let Some(update) = stream.next().await {
            let info = update?;
            if let Some(error) = info.error {
                let detail = info
                    .error_detail
                    .and_then(|d| d.message)
                    .unwrap_or_default();
                let message = if detail.is_empty() || detail == error {
                    error
                } else {
                    format!("{error}: {detail}")
                };
                return Err(SandboxError::BuildFailed(message));
            }
            if let Some(line) = info.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    tracing::debug!(image = image_name, "{line}");
                }
            }
        }

        if self.docker.inspect_image(image_name).await.is_err() {
            return Err(SandboxError::ImageMissing(image_name.to_string()));
        }

        tracing::info!(image = image_name, "image built");
        Ok(image_name.to_string())
    }

    /// Create and start a container from `image_name`.
    ///
    /// The repository clone (if any) is bound at [`REPO_MOUNT_PATH`]; a
    /// no-op foreground command keeps the container alive for later execs.
    /// Returns the container id and records it as this instance's active
    /// container, replacing any previous id without disposing it.
    pub async fn create_container(&mut self, image_name: &str) -> Result<String, SandboxError> {
        let name = format!("flake-forge-{}", Uuid::new_v4().simple());

        let binds = self
            .clone_dir
            .as_ref()
            .map(|dir| vec![format!("{}:{}", dir.display(), REPO_MOUNT_PATH)]);

        let config = Config {
            image: Some(image_name.to_string()),
            cmd: Some(vec![
                "tail".to_string(),
                "-f".to_string(),
                "/dev/null".to_string(),
            ]),
            working_dir: Some(REPO_MOUNT_PATH.to_string()),
            tty: Some(false),
            host_config: Some(HostConfig {
                binds,
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.clone(),
            platform: None,
        };

        let response = self.docker.create_container(Some(options), config).await?;
        self.docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await?;

        if let Some(previous) = self.container_id.replace(response.id.clone()) {
            tracing::debug!(previous = %previous, "active container replaced, previous left to the caller");
        }

        tracing::info!(container = %response.id, image = image_name, "container started");
        Ok(response.id)
    }

    /// Run a shell command in the active container, returning combined
    /// stdout+stderr verbatim.
    ///
    /// The container is restarted first if something stopped it externally.
    /// Exit codes are not exposed; non-zero exits simply yield whatever the
    /// shell printed.
    pub async fn execute_command(&mut self, command: &str) -> Result<String, SandboxError> {
        let container_id = self.container_id.clone().ok_or(SandboxError::NoContainer)?;

        let inspect = self
            .docker
            .inspect_container(&container_id, None::<InspectContainerOptions>)
            .await?;
        let running = inspect.state.and_then(|s| s.running).unwrap_or(false);
        if !running {
            tracing::debug!(container = %container_id, "container stopped, restarting");
            self.docker
                .start_container(&container_id, None::<StartContainerOptions<String>>)
                .await?;
        }

        let exec = self
            .docker
            .create_exec(
                &container_id,
                CreateExecOptions {
                    cmd: Some(vec![
                        "/bin/sh".to_string(),
                        "-c".to_string(),
                        command.to_string(),
                    ]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(false),
                    ..Default::default()
                },
            )
            .await?;

        let mut combined = String::new();
        if let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            while let Some(chunk) = output.next().await {
                match chunk? {
                    LogOutput::StdOut { message } | LogOutput::StdErr { message } => {
                        combined.push_str(&String::from_utf8_lossy(&message));
                    }
                    _ => {}
                }
            }
        }

        Ok(combined)
    }

    /// Dispose of the active container and the repository clone.
    ///
    /// Called between issues so one reproduction cannot leak resources into
    /// the next. Failures are logged, never raised.
    pub async fn teardown(&mut self) {
        if let Some(id) = self.container_id.take() {
            let options = RemoveContainerOptions {
                force: true,
                v: true,
                ..Default::default()
            };
            if let Err(err) = self.docker.remove_container(&id, Some(options)).await {
                tracing::debug!(container = %id, error = %err, "failed to remove container");
            } else {
                tracing::debug!(container = %id, "container removed");
            }
        }
        if let Some(dir) = self.clone_dir.take() {
            self.registry.remove_now(&dir);
        }
    }

    async fn clone_repository(&mut self, repo: &RepoId) -> Result<PathBuf, SandboxError> {
        let dir = self.create_temp_dir("clone")?;
        let url = format!("https://github.com/{}.git", repo.full_name());

        let output = Command::new("git")
            .args(["clone", "--depth", "1", &url])
            .arg(&dir)
            .output()
            .await?;

        if !output.status.success() {
            return Err(SandboxError::CloneFailed {
                repo: repo.full_name(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::info!(repo = %repo, dir = %dir.display(), "repository cloned");
        Ok(dir)
    }

    fn create_temp_dir(&self, label: &str) -> Result<PathBuf, SandboxError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("flake-forge-{label}-"))
            .tempdir()?;
        let path = dir.keep();
        self.registry.register(&path);
        Ok(path)
    }
}

/// Tar+gzip a build-context directory (a single Dockerfile) for the image
/// build endpoint.
fn archive_build_context(dir: &Path) -> Result<Vec<u8>, SandboxError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = TarBuilder::new(encoder);
    tar.append_path_with_name(dir.join("Dockerfile"), "Dockerfile")?;
    let encoder = tar.into_inner()?;
    Ok(encoder.finish()?)
}
