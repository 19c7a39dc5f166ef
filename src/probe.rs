//! Connectivity probe.
//!
//! Opens a connection to a provisioned instance, verifies liveness, and runs
//! the one piece of consumer-visible business logic this crate has:
//! `SELECT 1`, asserting the single returned row's single column equals 1.
//! The query is intentionally trivial: it proves the container is reachable,
//! not that any application behaves.

use crate::connection::ConnectionDescriptor;
use anyhow::{bail, Context, Result};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_postgres::{Client, NoTls};

/// A live connection to the instance under probe.
///
/// The background connection task exits when the session is dropped.
pub struct ProbeSession {
    client: Client,
    _shutdown_tx: oneshot::Sender<()>,
}

impl ProbeSession {
    /// Connect with timeout enforcement.
    pub async fn connect(descriptor: &ConnectionDescriptor, connect_timeout: Duration) -> Result<Self> {
        let url = descriptor.url();
        let connect_future = tokio_postgres::connect(&url, NoTls);
        let (client, connection) = tokio::time::timeout(connect_timeout, connect_future)
            .await
            .with_context(|| format!("Connection timed out after {:?}", connect_timeout))?
            .with_context(|| format!("Failed to connect to {}", descriptor.masked_url()))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        // Spawn connection handler that exits on shutdown or error
        tokio::spawn(async move {
            tokio::select! {
                _ = connection => {}
                _ = shutdown_rx => {}
            }
        });

        Ok(Self {
            client,
            _shutdown_tx: shutdown_tx,
        })
    }

    /// Round-trip an empty query, the wire-level equivalent of a ping.
    pub async fn ping(&self) -> Result<()> {
        self.client
            .simple_query("")
            .await
            .context("Liveness check failed")?;
        Ok(())
    }

    /// Run `SELECT 1` and validate the result shape and value.
    pub async fn select_one(&self) -> Result<i32> {
        let rows = self
            .client
            .query("SELECT 1", &[])
            .await
            .context("Query failed")?;

        if rows.len() != 1 {
            bail!("SELECT 1 returned {} rows, want 1", rows.len());
        }

        let value: i32 = rows[0].try_get(0).context("Failed to scan row")?;
        if value != 1 {
            bail!("SELECT 1 returned {}, want 1", value);
        }

        Ok(value)
    }
}

/// Full probe: connect, ping, query, validate. Any stage failing is a hard
/// probe failure with no retry.
pub async fn probe(descriptor: &ConnectionDescriptor, connect_timeout: Duration) -> Result<i32> {
    let session = ProbeSession::connect(descriptor, connect_timeout).await?;
    session.ping().await?;
    session.select_one().await
}

/// Single readiness attempt used by the provisioner's poll loop: a probe
/// with a short per-attempt timeout, failure meaning "not yet" rather than
/// "broken".
pub async fn check_ready(descriptor: &ConnectionDescriptor, attempt_timeout: Duration) -> Result<()> {
    let session = ProbeSession::connect(descriptor, attempt_timeout).await?;
    session.select_one().await?;
    Ok(())
}
