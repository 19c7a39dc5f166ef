//! Decommissioner: stop and remove a disposable instance.
//!
//! Teardown failures never overwrite an earlier probe or test outcome. They
//! are surfaced as a report the caller can log or map to its own exit code,
//! rather than swallowed or escalated into a panic.

use crate::runtime::{ContainerHandle, Runtime};
use std::time::Duration;

/// What happened during teardown, step by step.
///
/// `stopped` false with an error means the stop call failed and removal was
/// not attempted; a container that is stopped but not removed still holds
/// its name.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub stopped: bool,
    pub removed: bool,
    pub error: Option<anyhow::Error>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.stopped && self.removed && self.error.is_none()
    }
}

/// Stop the container within `stop_timeout`, then remove it.
///
/// The handle is consumed: a decommissioned container is gone, and the type
/// system should not let it be stopped or removed twice. (The daemon would
/// reject the second attempt anyway; idempotence is intentionally not
/// provided.)
pub async fn decommission(
    runtime: &Runtime,
    handle: ContainerHandle,
    stop_timeout: Duration,
) -> TeardownReport {
    let mut report = TeardownReport::default();

    if let Err(e) = runtime.stop_container(&handle, stop_timeout).await {
        report.error = Some(e);
        return report;
    }
    report.stopped = true;

    if let Err(e) = runtime.remove_container(&handle).await {
        report.error = Some(e);
        return report;
    }
    report.removed = true;

    report
}
