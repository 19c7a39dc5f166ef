//! Ephemeral port reservation.
//!
//! Discovers a free host port by binding a throwaway listener to port 0 on
//! loopback and reading back the OS-assigned port. The listener is held only
//! until the container spec has been built; it must be released before the
//! container binds the port. A third party can grab the port in the gap
//! between release and container start; acceptable for a test harness.

use anyhow::{Context, Result};
use std::net::TcpListener;

/// A reserved ephemeral port, held open by a placeholder listener.
pub struct PortReservation {
    listener: TcpListener,
    port: u16,
}

impl PortReservation {
    /// Bind a placeholder listener to `127.0.0.1:0` and record the port the
    /// OS assigned.
    pub fn reserve() -> Result<Self> {
        let listener =
            TcpListener::bind("127.0.0.1:0").context("Failed to reserve an ephemeral port")?;
        let port = listener
            .local_addr()
            .context("Failed to read back the reserved port")?
            .port();
        Ok(Self { listener, port })
    }

    /// The port number held by this reservation.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Release the placeholder listener so the container can bind the port.
    pub fn release(self) {
        drop(self.listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_returns_nonzero_port() {
        let reservation = PortReservation::reserve().unwrap();
        assert!(reservation.port() > 0);
    }

    #[test]
    fn test_reserved_port_is_held_until_release() {
        let reservation = PortReservation::reserve().unwrap();
        let port = reservation.port();

        // While the reservation is live, rebinding the same port fails.
        let rebind = TcpListener::bind(("127.0.0.1", port));
        assert!(rebind.is_err());

        // After release, the port is free again.
        reservation.release();
        let rebind = TcpListener::bind(("127.0.0.1", port));
        assert!(rebind.is_ok());
    }

    #[test]
    fn test_distinct_reservations_get_distinct_ports() {
        let a = PortReservation::reserve().unwrap();
        let b = PortReservation::reserve().unwrap();
        assert_ne!(a.port(), b.port());
    }
}
