//! Container runtime boundary.
//!
//! Thin wrapper over the Docker daemon API covering exactly the operations
//! the lifecycle consumes: ping, image inspect, image pull, container
//! create/start/stop/remove. Everything else about the daemon is out of
//! scope.

use anyhow::{Context, Result};
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use futures_util::TryStreamExt;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// The service port PostgreSQL listens on inside the container.
pub const POSTGRES_PORT: &str = "5432/tcp";

/// Opaque identifier for a created container.
///
/// Single-use: the handle is only meaningful between create and remove, and
/// teardown consumes it. The daemon rejects operations on a removed id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    /// Abbreviated id for human-readable output, daemon-style.
    pub fn short_id(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connected Docker daemon client.
pub struct Runtime {
    docker: Docker,
}

impl Runtime {
    /// Connect using the environment's defaults (DOCKER_HOST or the local
    /// socket).
    pub fn connect() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().context("Failed to connect to Docker daemon")?;
        Ok(Self { docker })
    }

    /// Verify the daemon is responsive.
    pub async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .context("Docker daemon is not responding")?;
        Ok(())
    }

    /// Whether the image is already present locally.
    pub async fn image_present(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to inspect image '{}'", image)),
        }
    }

    /// Pull an image, draining the daemon's progress stream.
    pub async fn pull_image(&self, image: &str) -> Result<()> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        self.docker
            .create_image(Some(options), None, None)
            .try_collect::<Vec<_>>()
            .await
            .with_context(|| format!("Failed to pull image '{}'", image))?;
        Ok(())
    }

    /// Create a container from the given spec, returning its handle.
    pub async fn create_container(
        &self,
        name: &str,
        platform: Option<String>,
        image: &str,
        env: Vec<String>,
        host_port: u16,
    ) -> Result<ContainerHandle> {
        let options = CreateContainerOptions {
            name: name.to_string(),
            platform,
        };
        let config = build_container_config(image, env, host_port);

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .with_context(|| format!("Failed to create container '{}'", name))?;

        Ok(ContainerHandle(response.id))
    }

    pub async fn start_container(&self, handle: &ContainerHandle) -> Result<()> {
        self.docker
            .start_container(handle.id(), None::<StartContainerOptions<String>>)
            .await
            .with_context(|| format!("Failed to start container {}", handle.short_id()))?;
        Ok(())
    }

    /// Stop a container, granting it the given grace period before the
    /// daemon kills it. The daemon's stop timeout has whole-second
    /// granularity; sub-second values round up.
    pub async fn stop_container(&self, handle: &ContainerHandle, timeout: Duration) -> Result<()> {
        let options = StopContainerOptions {
            t: stop_timeout_secs(timeout),
        };
        self.docker
            .stop_container(handle.id(), Some(options))
            .await
            .with_context(|| format!("Failed to stop container {}", handle.short_id()))?;
        Ok(())
    }

    pub async fn remove_container(&self, handle: &ContainerHandle) -> Result<()> {
        self.docker
            .remove_container(handle.id(), Some(RemoveContainerOptions::default()))
            .await
            .with_context(|| format!("Failed to remove container {}", handle.short_id()))?;
        Ok(())
    }
}

/// Build the container spec: image, env, exposed service port, and the host
/// binding that maps the reserved port onto it.
fn build_container_config(image: &str, env: Vec<String>, host_port: u16) -> ContainerConfig<String> {
    let mut exposed_ports = HashMap::new();
    exposed_ports.insert(POSTGRES_PORT.to_string(), HashMap::new());

    let mut port_bindings = HashMap::new();
    port_bindings.insert(
        POSTGRES_PORT.to_string(),
        Some(vec![PortBinding {
            host_ip: Some("0.0.0.0".to_string()),
            host_port: Some(host_port.to_string()),
        }]),
    );

    ContainerConfig {
        image: Some(image.to_string()),
        env: Some(env),
        exposed_ports: Some(exposed_ports),
        host_config: Some(HostConfig {
            port_bindings: Some(port_bindings),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn stop_timeout_secs(timeout: Duration) -> i64 {
    timeout.as_millis().div_ceil(1000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_short_id() {
        let handle = ContainerHandle::from_raw("0123456789abcdef0123456789abcdef");
        assert_eq!(handle.short_id(), "0123456789ab");

        let short = ContainerHandle::from_raw("abc");
        assert_eq!(short.short_id(), "abc");
    }

    #[test]
    fn test_container_config_binds_reserved_port() {
        let env = vec!["POSTGRES_DB=postgres".to_string()];
        let config = build_container_config("postgres:15", env.clone(), 49153);

        assert_eq!(config.image.as_deref(), Some("postgres:15"));
        assert_eq!(config.env, Some(env));
        assert!(config
            .exposed_ports
            .as_ref()
            .unwrap()
            .contains_key(POSTGRES_PORT));

        let bindings = config.host_config.unwrap().port_bindings.unwrap();
        let binding = bindings[POSTGRES_PORT].as_ref().unwrap();
        assert_eq!(binding.len(), 1);
        assert_eq!(binding[0].host_ip.as_deref(), Some("0.0.0.0"));
        assert_eq!(binding[0].host_port.as_deref(), Some("49153"));
    }

    #[test]
    fn test_stop_timeout_rounds_up_to_whole_seconds() {
        assert_eq!(stop_timeout_secs(Duration::from_secs(1)), 1);
        assert_eq!(stop_timeout_secs(Duration::from_millis(500)), 1);
        assert_eq!(stop_timeout_secs(Duration::from_millis(1001)), 2);
        assert_eq!(stop_timeout_secs(Duration::ZERO), 0);
    }
}
