//! Lifecycle integration tests for the pgspawn library.
//!
//! These tests talk to a real Docker daemon and a real PostgreSQL container;
//! they skip cleanly when no daemon is reachable.
//!
//! ## Running Locally
//!
//! ```bash
//! cargo test --test lifecycle_integration
//!
//! # Against a different image
//! PGSPAWN_TEST_IMAGE=postgres:16 cargo test --test lifecycle_integration
//! ```

#[macro_use]
mod common;

use pgspawn::config::Config;
use pgspawn::fixture::PgFixture;
use pgspawn::ports::PortReservation;
use pgspawn::provision::ProvisionRequest;
use pgspawn::runtime::{ContainerHandle, Runtime};
use std::time::Duration;
use tokio_postgres::NoTls;

fn request(config: &Config, name: &str, pull: &str) -> ProvisionRequest {
    let image = common::test_image();
    ProvisionRequest::from_config(config, Some(&image), Some(name), Some(pull), None)
        .expect("request resolution should succeed")
}

#[tokio::test]
async fn test_full_lifecycle() {
    skip_if_no_docker!();

    let config = Config::default();
    let name = common::unique_name("pgspawn-lifecycle");
    let fixture = PgFixture::provision_with(&config, request(&config, &name, "always"))
        .await
        .expect("provisioning should succeed");

    let container_id = fixture.container_id().to_string();
    let descriptor = fixture.descriptor().clone();

    // The descriptor's port is the bound host port; a direct client connect
    // through it proves the binding matches.
    assert!(descriptor.url().contains(&format!(":{}/", descriptor.port)));

    let value = fixture.probe().await.expect("probe should pass");
    assert_eq!(value, 1);

    // The descriptor works for an ordinary client too, not just the probe.
    let (client, connection) = tokio_postgres::connect(&fixture.url(), NoTls)
        .await
        .expect("direct connect should succeed");
    tokio::spawn(async move {
        let _ = connection.await;
    });
    let row = client
        .query_one("SELECT 1", &[])
        .await
        .expect("query should succeed");
    assert_eq!(row.get::<_, i32>(0), 1);
    drop(client);

    let report = fixture.decommission().await;
    assert!(
        report.is_clean(),
        "teardown should be clean: {:?}",
        report.error
    );

    // The container is gone; a second stop of the same id must fail.
    let runtime = Runtime::connect().unwrap();
    let stale = ContainerHandle::from_raw(container_id);
    let second_stop = runtime.stop_container(&stale, Duration::from_secs(1)).await;
    assert!(second_stop.is_err());
    let second_remove = runtime.remove_container(&stale).await;
    assert!(second_remove.is_err());
}

#[tokio::test]
async fn test_provision_fails_for_unknown_image() {
    skip_if_no_docker!();

    let config = Config::default();
    let name = common::unique_name("pgspawn-noimage");
    let req = ProvisionRequest::from_config(
        &config,
        Some("pgspawn/definitely-does-not-exist:0"),
        Some(&name),
        Some("always"),
        None,
    )
    .unwrap();

    let result = PgFixture::provision_with(&config, req).await;
    assert!(result.is_err());
    let message = format!("{:#}", result.err().unwrap());
    assert!(
        message.contains("pull"),
        "error should point at the pull step: {}",
        message
    );
}

#[tokio::test]
async fn test_start_fails_when_reserved_port_is_taken() {
    skip_if_no_docker!();

    let config = Config::default();
    let runtime = Runtime::connect().unwrap();
    let image = common::test_image();

    if !runtime.image_present(&image).await.unwrap() {
        runtime.pull_image(&image).await.unwrap();
    }

    // Hold the listener open across create and start, simulating a third
    // party grabbing the port inside the documented race window.
    let reservation = PortReservation::reserve().unwrap();
    let name = common::unique_name("pgspawn-portrace");
    let handle = runtime
        .create_container(
            &name,
            None,
            &image,
            config.container_env(),
            reservation.port(),
        )
        .await
        .expect("create should succeed while the port is merely reserved");

    let started = runtime.start_container(&handle).await;
    assert!(started.is_err(), "start should fail on an occupied port");

    reservation.release();
    runtime
        .remove_container(&handle)
        .await
        .expect("created-but-never-started container should remove cleanly");
}

#[tokio::test]
async fn test_fixtures_coexist_in_one_process() {
    skip_if_no_docker!();

    let config = Config::default();
    let a = PgFixture::provision_with(
        &config,
        request(&config, &common::unique_name("pgspawn-pair"), "missing"),
    )
    .await
    .expect("first fixture should provision");
    let b = PgFixture::provision_with(
        &config,
        request(&config, &common::unique_name("pgspawn-pair"), "missing"),
    )
    .await
    .expect("second fixture should provision");

    assert_ne!(a.container_id(), b.container_id());
    assert_ne!(a.descriptor().port, b.descriptor().port);

    assert_eq!(a.probe().await.unwrap(), 1);
    assert_eq!(b.probe().await.unwrap(), 1);

    assert!(a.decommission().await.is_clean());
    assert!(b.decommission().await.is_clean());
}
