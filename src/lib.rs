//! Disposable PostgreSQL containers for integration tests.
//!
//! The lifecycle is a strictly sequential Provision → probe → Decommission:
//! reserve a free host port, pull the image, create and start a container
//! bound to that port, wait for it to accept connections, hand out a
//! connection descriptor, and finally stop and remove the container.
//!
//! Library consumers use [`fixture::PgFixture`]; the `pgspawn` binary wraps
//! the same lifecycle in a CLI.

pub mod config;
pub mod connection;
pub mod exit_codes;
pub mod fixture;
pub mod output;
pub mod ports;
pub mod probe;
pub mod provision;
pub mod runtime;
pub mod teardown;

pub use config::Config;
pub use connection::ConnectionDescriptor;
pub use fixture::PgFixture;
