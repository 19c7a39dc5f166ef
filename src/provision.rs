//! Provisioner: create and start a disposable instance.
//!
//! The sequence is strictly linear: reserve a port, pull the image, create
//! the container with the reserved port bound to the service port, start it,
//! then poll for readiness. Failures are fatal to the run; there is no
//! retry beyond the readiness poll itself.

use crate::config::{Config, PullPolicy};
use crate::connection::ConnectionDescriptor;
use crate::output::Output;
use crate::ports::PortReservation;
use crate::probe;
use crate::runtime::{ContainerHandle, Runtime};
use anyhow::{Context, Result};
use std::time::{Duration, Instant};

/// Per-attempt connect budget inside the readiness poll. Kept short so a
/// hung connect cannot eat the whole readiness deadline.
const READINESS_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

const READINESS_INITIAL_DELAY: Duration = Duration::from_millis(100);
const READINESS_MAX_DELAY: Duration = Duration::from_secs(2);

/// A provisioned, started, ready instance.
pub struct Provisioned {
    pub handle: ContainerHandle,
    pub descriptor: ConnectionDescriptor,
}

/// Inputs resolved from config + CLI before provisioning starts.
pub struct ProvisionRequest {
    pub image: String,
    pub name: String,
    pub platform: Option<String>,
    pub env: Vec<String>,
    pub pull_policy: PullPolicy,
    pub readiness_timeout: Duration,
}

impl ProvisionRequest {
    pub fn from_config(
        config: &Config,
        cli_image: Option<&str>,
        cli_name: Option<&str>,
        cli_pull: Option<&str>,
        cli_readiness: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            image: config.image(cli_image),
            name: config.container_name(cli_name)?,
            platform: config.platform(),
            env: config.container_env(),
            pull_policy: config.pull_policy(cli_pull)?,
            readiness_timeout: config.readiness_timeout(cli_readiness)?,
        })
    }
}

/// Provision a disposable instance: reserve a port, fetch the image, create
/// and start the container, wait until it accepts connections, and return
/// its handle together with the connection descriptor.
///
/// If the container was created but failed to start or become ready, it is
/// removed best-effort before the error is returned, so a failed provision
/// leaves nothing behind.
pub async fn provision(
    runtime: &Runtime,
    config: &Config,
    request: &ProvisionRequest,
    output: &Output,
) -> Result<Provisioned> {
    let reservation = PortReservation::reserve()?;
    let host_port = reservation.port();
    output.verbose(&format!("Reserved host port {}", host_port));

    match request.pull_policy {
        PullPolicy::Always => {
            output.info(&format!("Pulling image {}...", request.image));
            runtime.pull_image(&request.image).await?;
        }
        PullPolicy::Missing => {
            if runtime.image_present(&request.image).await? {
                output.verbose(&format!("Image {} already present", request.image));
            } else {
                output.info(&format!("Pulling image {}...", request.image));
                runtime.pull_image(&request.image).await?;
            }
        }
    }

    let handle = runtime
        .create_container(
            &request.name,
            request.platform.clone(),
            &request.image,
            request.env.clone(),
            host_port,
        )
        .await?;
    output.verbose(&format!("Created container {}", handle.short_id()));

    // The descriptor's port is the reserved port by construction; the same
    // value went into the container's binding map above.
    let descriptor = ConnectionDescriptor::for_local_port(
        config.database_user(),
        config.database_password(),
        host_port,
        config.database_name(),
    );

    // Release the placeholder listener just before the container needs the
    // port. A third party can grab it in this gap; start then fails with a
    // bind error and the run aborts.
    reservation.release();

    if let Err(e) = start_and_wait(runtime, &handle, &descriptor, request, output).await {
        // Don't leave a half-started container behind. The original error
        // is what the caller needs; removal failure is secondary.
        if let Err(cleanup) = runtime.remove_container(&handle).await {
            output.warn(&format!(
                "Failed to clean up container {} after provisioning error: {:#}",
                handle.short_id(),
                cleanup
            ));
        }
        return Err(e);
    }

    Ok(Provisioned { handle, descriptor })
}

async fn start_and_wait(
    runtime: &Runtime,
    handle: &ContainerHandle,
    descriptor: &ConnectionDescriptor,
    request: &ProvisionRequest,
    output: &Output,
) -> Result<()> {
    runtime.start_container(handle).await?;
    output.verbose("Container started, waiting for readiness...");
    wait_ready(descriptor, request.readiness_timeout).await
}

/// Poll until the instance accepts a connection and answers `SELECT 1`,
/// backing off exponentially between attempts, bounded by `deadline`.
pub async fn wait_ready(descriptor: &ConnectionDescriptor, deadline: Duration) -> Result<()> {
    let start = Instant::now();
    let mut backoff = Backoff::new(READINESS_INITIAL_DELAY, READINESS_MAX_DELAY);

    loop {
        match probe::check_ready(descriptor, READINESS_ATTEMPT_TIMEOUT).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                if start.elapsed() >= deadline {
                    return Err(e).with_context(|| {
                        format!("Instance not ready after {:?}", deadline)
                    });
                }
            }
        }

        let remaining = deadline.saturating_sub(start.elapsed());
        tokio::time::sleep(backoff.next_delay().min(remaining)).await;
    }
}

/// Exponential backoff: doubles each round up to a cap.
struct Backoff {
    next: Duration,
    cap: Duration,
}

impl Backoff {
    fn new(initial: Duration, cap: Duration) -> Self {
        Self { next: initial, cap }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.cap);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.next_delay(), Duration::from_millis(800));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1600));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        // Stays at the cap from here on
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_wait_ready_gives_up_at_deadline() {
        // Nothing listens on this descriptor; the poll must exhaust its
        // budget and report the deadline, not hang.
        let descriptor = ConnectionDescriptor::for_local_port("postgres", "postgres", 1, "postgres");
        let start = Instant::now();
        let result = wait_ready(&descriptor, Duration::from_millis(300)).await;
        assert!(result.is_err());
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("not ready after"));
    }

    #[test]
    fn test_request_resolution_respects_cli() {
        let config = Config::default();
        let request = ProvisionRequest::from_config(
            &config,
            Some("postgres:16"),
            Some("test-app"),
            Some("missing"),
            Some("10s"),
        )
        .unwrap();
        assert_eq!(request.image, "postgres:16");
        assert_eq!(request.name, "test-app");
        assert_eq!(request.pull_policy, PullPolicy::Missing);
        assert_eq!(request.readiness_timeout, Duration::from_secs(10));
    }
}
