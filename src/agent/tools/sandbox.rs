//! Container-management tools for the reproduction agent.
//!
//! The three tools share one [`SandboxManager`] behind a mutex; the loop
//! dispatches same-turn calls sequentially, so the lock is uncontended and
//! exists only to give each tool `&mut` access to the sandbox state.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::{Tool, ToolError, ToolResult};
use crate::sandbox::SandboxManager;

pub type SharedSandbox = Arc<Mutex<SandboxManager>>;

/// Build a Docker image from Dockerfile text supplied by the model.
pub struct BuildImageTool {
    sandbox: SharedSandbox,
}

impl BuildImageTool {
    pub fn new(sandbox: SharedSandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for BuildImageTool {
    fn name(&self) -> &str {
        "build_image"
    }

    fn description(&self) -> &str {
        "Build a Docker image from the given Dockerfile content and tag it \
         with the given name. The repository under analysis is cloned and \
         will be mounted at /app in containers created from this image, so \
         the Dockerfile should not COPY or clone the repository itself."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dockerfile": {
                    "type": "string",
                    "description": "Complete Dockerfile content."
                },
                "image_name": {
                    "type": "string",
                    "description": "Tag for the built image, e.g. 'flaky-repro:latest'."
                }
            },
            "required": ["dockerfile", "image_name"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let dockerfile = required_str(&args, "dockerfile")?;
        let image_name = required_str(&args, "image_name")?;

        let mut sandbox = self.sandbox.lock().await;
        match sandbox.build_image(dockerfile, image_name).await {
            Ok(name) => Ok(ToolResult::success(format!("Image '{name}' built successfully"))),
            Err(err) => Ok(ToolResult::failure(err.to_string())),
        }
    }
}

/// Create and start a container from a previously built image.
pub struct CreateContainerTool {
    sandbox: SharedSandbox,
}

impl CreateContainerTool {
    pub fn new(sandbox: SharedSandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for CreateContainerTool {
    fn name(&self) -> &str {
        "create_container"
    }

    fn description(&self) -> &str {
        "Create and start a container from a previously built image. The \
         repository clone is mounted at /app. The container stays alive for \
         subsequent execute_command calls."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "image_name": {
                    "type": "string",
                    "description": "Name of the image to start a container from."
                }
            },
            "required": ["image_name"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let image_name = required_str(&args, "image_name")?;

        let mut sandbox = self.sandbox.lock().await;
        match sandbox.create_container(image_name).await {
            Ok(id) => Ok(ToolResult::success(format!("Container created: {id}"))),
            Err(err) => Ok(ToolResult::failure(err.to_string())),
        }
    }
}

/// Run a shell command inside the active container.
pub struct ExecuteCommandTool {
    sandbox: SharedSandbox,
}

impl ExecuteCommandTool {
    pub fn new(sandbox: SharedSandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command inside the active container and return its \
         combined stdout and stderr. The repository is mounted at /app. \
         Requires create_container to have been called first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to run, e.g. 'cd /app && npm test'."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let command = required_str(&args, "command")?;

        let mut sandbox = self.sandbox.lock().await;
        match sandbox.execute_command(command).await {
            Ok(output) => Ok(ToolResult::success(output)),
            Err(err) => Ok(ToolResult::failure(err.to_string())),
        }
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing '{key}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::cleanup::TempDirRegistry;
    use bollard::Docker;

    fn shared_sandbox() -> SharedSandbox {
        let docker = Docker::connect_with_local_defaults().expect("docker client");
        let registry = Arc::new(TempDirRegistry::new());
        Arc::new(Mutex::new(SandboxManager::with_registry(
            docker, None, registry,
        )))
    }

    #[tokio::test]
    async fn execute_command_without_container_folds_to_failed_result() {
        let tool = ExecuteCommandTool::new(shared_sandbox());
        let result = tool
            .execute(json!({"command": "echo hi"}))
            .await
            .expect("execute");
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("No container has been created yet. Call createContainer first.")
        );
    }

    #[tokio::test]
    async fn missing_arguments_are_invalid_parameters() {
        let tool = BuildImageTool::new(shared_sandbox());
        let err = tool
            .execute(json!({"dockerfile": "FROM alpine"}))
            .await
            .expect_err("should fail");
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }
}
