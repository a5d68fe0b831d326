//! TCP listener binding for service ports.
//!
//! # Responsibilities
//! - Bind one service port on the configured address
//! - Report bind failures with the service and port attached

use std::io;
use std::net::{IpAddr, SocketAddr};

use tokio::net::{TcpListener, TcpSocket};

/// Pending connection queue length.
const BACKLOG: u32 = 1024;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
#[error("failed to bind {addr} for service '{service}': {source}")]
pub struct BindError {
    pub service: String,
    pub addr: SocketAddr,
    #[source]
    pub source: io::Error,
}

/// Bind `ip:port` for `service`.
///
/// Address reuse is enabled so a port released by a stopped listener can be
/// rebound right away; a port still held by a live listener is refused.
pub fn bind(service: &str, ip: IpAddr, port: u16) -> Result<TcpListener, BindError> {
    let addr = SocketAddr::new(ip, port);
    let wrap = |source| BindError {
        service: service.to_string(),
        addr,
        source,
    };

    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(wrap)?;
    socket.set_reuseaddr(true).map_err(wrap)?;
    socket.bind(addr).map_err(wrap)?;
    let listener = socket.listen(BACKLOG).map_err(wrap)?;

    tracing::debug!(service, address = %addr, "Listener bound");
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn second_bind_on_live_port_fails() {
        let first = bind("a", IpAddr::V4(Ipv4Addr::LOCALHOST), 0).unwrap();
        let port = first.local_addr().unwrap().port();

        let err = bind("b", IpAddr::V4(Ipv4Addr::LOCALHOST), port).unwrap_err();
        assert_eq!(err.service, "b");
        assert_eq!(err.addr.port(), port);

        drop(first);
        assert!(bind("b", IpAddr::V4(Ipv4Addr::LOCALHOST), port).is_ok());
    }
}
