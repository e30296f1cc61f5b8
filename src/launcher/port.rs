use std::io::ErrorKind;

use tokio::net::TcpListener;

use crate::error::LaunchError;

/// Fails with [`LaunchError::PortInUse`] while something listens on `port`.
///
/// The check binds the port on all interfaces and releases it immediately.
pub async fn ensure_port_free(port: u16) -> Result<(), LaunchError> {
    match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AddrInUse => Err(LaunchError::PortInUse { port }),
        Err(e) => Err(LaunchError::Other {
            reason: format!("probing port {port}: {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bound_port_is_reported() {
        let held = TcpListener::bind(("0.0.0.0", 0)).await.unwrap();
        let port = held.local_addr().unwrap().port();

        let err = ensure_port_free(port).await.unwrap_err();
        assert!(matches!(err, LaunchError::PortInUse { port: p } if p == port));

        drop(held);
        assert!(ensure_port_free(port).await.is_ok());
    }
}
