//! Exit code policy for pgspawn.
//!
#![allow(dead_code)] // Constants defined for policy documentation, used selectively
//!
//! ## Outcomes (0-3)
//!
//! Lifecycle commands return exit codes based on what the run determined:
//! - `0` = Success (container provisioned / probe passed / teardown clean)
//! - `1` = Probe failure (the instance was provisioned but the connectivity
//!   check failed)
//! - `3` = Teardown failure (stop or remove failed; the probe verdict, if
//!   any, is reported separately and is not overwritten by this)
//!
//! ## Operational Failures (10+)
//!
//! Operational failures (daemon unreachable, image pull failure, container
//! create/start failure, invalid config) use codes >= 10 to distinguish
//! them from probe verdicts:
//! - `10` = General operational failure (provisioning aborted)
//! - `12` = Configuration error
//!
//! This separation allows automation to distinguish between:
//! - "The database instance failed its check" (probe, 1)
//! - "We never got as far as checking" (operational failure, 10+)

/// Exit code: success
pub const SUCCESS: i32 = 0;

/// Exit code: probe failed (connect, liveness, query, or value mismatch)
pub const PROBE_FAILURE: i32 = 1;

/// Exit code: teardown failed (container stop or remove)
pub const TEARDOWN_FAILURE: i32 = 3;

/// Exit code: general operational failure (provisioning aborted)
pub const OPERATIONAL_FAILURE: i32 = 10;

/// Exit code: configuration error
pub const CONFIG_ERROR: i32 = 12;
