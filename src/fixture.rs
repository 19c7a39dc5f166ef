//! Run-scoped fixture bundling the container handle and connection
//! descriptor.
//!
//! Tests hold a `PgFixture` by value instead of reading package-level
//! globals, so parallel or repeated runs in one process each get their own
//! container, port, and name. Per container the lifecycle is Created →
//! Started → (probed) → Stopped → Removed; `decommission` consumes the
//! fixture, making use-after-removal unrepresentable.

use crate::config::Config;
use crate::connection::ConnectionDescriptor;
use crate::output::Output;
use crate::probe;
use crate::provision::{self, ProvisionRequest};
use crate::runtime::{ContainerHandle, Runtime};
use crate::teardown::{self, TeardownReport};
use anyhow::Result;
use std::time::Duration;

/// A provisioned disposable PostgreSQL instance.
pub struct PgFixture {
    runtime: Runtime,
    handle: ContainerHandle,
    descriptor: ConnectionDescriptor,
    connect_timeout: Duration,
    stop_timeout: Duration,
}

impl PgFixture {
    /// Provision a fixture using defaults resolved from config and
    /// environment (POSTGRES_IMAGE, APP_NAME).
    pub async fn provision(config: &Config) -> Result<Self> {
        let request = ProvisionRequest::from_config(config, None, None, None, None)?;
        Self::provision_with(config, request).await
    }

    /// Provision a fixture from an explicit request.
    pub async fn provision_with(config: &Config, request: ProvisionRequest) -> Result<Self> {
        let output = Output::new(false, true, false);
        let runtime = Runtime::connect()?;
        runtime.ping().await?;

        let provisioned = provision::provision(&runtime, config, &request, &output).await?;

        Ok(Self {
            runtime,
            handle: provisioned.handle,
            descriptor: provisioned.descriptor,
            connect_timeout: config.connect_timeout(None)?,
            stop_timeout: config.stop_timeout(None)?,
        })
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Connection URL for handing to database clients.
    pub fn url(&self) -> String {
        self.descriptor.url()
    }

    pub fn container_id(&self) -> &str {
        self.handle.id()
    }

    /// Probe the instance: connect, ping, `SELECT 1`, validate.
    pub async fn probe(&self) -> Result<i32> {
        probe::probe(&self.descriptor, self.connect_timeout).await
    }

    /// Stop and remove the container, consuming the fixture.
    pub async fn decommission(self) -> TeardownReport {
        teardown::decommission(&self.runtime, self.handle, self.stop_timeout).await
    }
}
