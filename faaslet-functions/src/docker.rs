//! Docker-backed execution units
//!
//! Every invocation gets a fresh container created from the function's image.
//! Nothing is pooled; the orchestrator removes each container when the
//! invocation ends.

use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::{ImportImageOptions, ListImagesOptions};
use bollard::Docker;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::runtime::{ContainerRuntime, RuntimeError, UnitInput, UnitSpec};

/// Label attached to every container created for an invocation
pub const FUNCTION_LABEL: &str = "faaslet.function";

/// Docker connection settings
#[derive(Debug, Clone)]
pub struct DockerRuntimeConfig {
    /// Daemon address; `None` uses the local defaults (`DOCKER_HOST` or the local socket)
    pub docker_host: Option<String>,
    /// Per-request timeout. Must cover the longest invocation since the exit
    /// wait is a single request.
    pub request_timeout: Duration,
}

impl Default for DockerRuntimeConfig {
    fn default() -> Self {
        Self {
            docker_host: None,
            request_timeout: Duration::from_secs(600),
        }
    }
}

/// Container runtime talking to the Docker Engine API
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Build a client for the configured daemon. No request is made.
    pub fn connect(config: &DockerRuntimeConfig) -> Result<Self, RuntimeError> {
        let timeout = config.request_timeout.as_secs();
        let docker = match config.docker_host.as_deref() {
            None => Docker::connect_with_local_defaults()?.with_timeout(config.request_timeout),
            Some(address) if address.starts_with("http://") || address.starts_with("tcp://") => {
                let address = address
                    .trim_start_matches("http://")
                    .trim_start_matches("tcp://");
                Docker::connect_with_http(
                    &format!("http://{}", address),
                    timeout,
                    bollard::API_DEFAULT_VERSION,
                )?
            }
            Some(address) => Docker::connect_with_socket(
                address.trim_start_matches("unix://"),
                timeout,
                bollard::API_DEFAULT_VERSION,
            )?,
        };

        Ok(Self { docker })
    }

    /// Check the daemon is reachable
    pub async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await?;
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create(&self, spec: &UnitSpec) -> Result<String, RuntimeError> {
        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(Vec::new()),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            open_stdin: Some(true),
            stdin_once: Some(true),
            labels: Some(HashMap::from([(
                FUNCTION_LABEL.to_string(),
                spec.function_id.clone(),
            )])),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await?;

        for warning in &response.warnings {
            debug!(container_id = %response.id, warning = %warning, "Docker create warning");
        }

        info!(container_id = %response.id, image = %spec.image, "Created container");
        Ok(response.id)
    }

    async fn start(&self, unit_id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(unit_id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn attach(&self, unit_id: &str) -> Result<UnitInput, RuntimeError> {
        let options = AttachContainerOptions::<String> {
            stdin: Some(true),
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            ..Default::default()
        };

        let AttachContainerResults { mut output, input } =
            self.docker.attach_container(unit_id, Some(options)).await?;

        // Output is collected from the log endpoint after exit; keep the attached
        // side drained so the container never stalls on a full pipe.
        let container_id = unit_id.to_string();
        tokio::spawn(async move {
            while let Some(frame) = output.next().await {
                if let Err(e) = frame {
                    debug!(container_id = %container_id, error = %e, "Attach stream closed");
                    break;
                }
            }
        });

        Ok(input)
    }

    async fn wait(&self, unit_id: &str) -> Result<i64, RuntimeError> {
        // "not-running" instead of "next-exit": a unit that exits before the
        // wait request lands must not be waited on forever.
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut stream = self.docker.wait_container(unit_id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => {
                if let Some(message) = response.error.and_then(|e| e.message) {
                    return Err(RuntimeError::Other(message));
                }
                Ok(response.status_code)
            }
            // A non-zero exit is a normal exit for our purposes.
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Err(RuntimeError::Other(
                "wait stream ended without an exit status".to_string(),
            )),
        }
    }

    async fn stop(&self, unit_id: &str, grace: Duration) -> Result<(), RuntimeError> {
        let options = StopContainerOptions {
            t: i64::try_from(grace.as_secs()).unwrap_or(i64::MAX),
        };
        self.docker.stop_container(unit_id, Some(options)).await?;
        Ok(())
    }

    async fn remove(&self, unit_id: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker.remove_container(unit_id, Some(options)).await?;
        debug!(container_id = %unit_id, "Removed container");
        Ok(())
    }

    async fn logs(&self, unit_id: &str) -> Result<Vec<u8>, RuntimeError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut stream = self.docker.logs(unit_id, Some(options));
        let mut output = Vec::new();
        while let Some(frame) = stream.next().await {
            output.extend_from_slice(&frame?.into_bytes());
        }

        Ok(output)
    }

    async fn list_images(&self) -> Result<Vec<String>, RuntimeError> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await?;

        Ok(images
            .into_iter()
            .flat_map(|image| image.repo_tags)
            .collect())
    }

    async fn load_image(&self, archive: &Path) -> Result<(), RuntimeError> {
        let data = Bytes::from(tokio::fs::read(archive).await?);
        let size = data.len();

        let mut stream = self
            .docker
            .import_image(ImportImageOptions { quiet: true }, data, None);

        while let Some(progress) = stream.next().await {
            let progress = progress?;
            if let Some(error) = progress.error {
                return Err(RuntimeError::Other(error));
            }
            if let Some(status) = progress.stream.or(progress.status) {
                debug!(status = %status.trim(), "Image load progress");
            }
        }

        info!(archive = %archive.display(), size, "Loaded image archive");
        Ok(())
    }
}
