//! TCP reachability probing
//!
//! Pure async connect attempts, no external binaries required.

use std::net::IpAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

/// Whether a TCP connection to `address:port` succeeds within `timeout`.
pub async fn tcp_probe(address: &str, port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect((address, port))).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!("Probe {}:{} refused: {}", address, port, e);
            false
        }
        Err(_) => {
            debug!("Probe {}:{} timed out after {:?}", address, port, timeout);
            false
        }
    }
}

/// Whether `address` names the machine we are running on
pub fn is_loopback(address: &str) -> bool {
    address.eq_ignore_ascii_case("localhost")
        || address
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
}
