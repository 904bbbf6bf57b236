//! TLS wrapping for accepted connections.

use std::io;
use std::sync::Arc;

use may::net::TcpStream;
use rustls::{ServerConnection, StreamOwned};

use super::conn::ServerStream;

/// Server-side TLS configuration.
///
/// Provisioning the `rustls::ServerConfig` (certificates, key material,
/// protocol versions) is the application's concern; the server only wraps
/// accepted sockets with it. The handshake happens lazily on the first
/// read, so handshake failures surface as read errors and close the
/// connection like any other I/O fault.
#[derive(Clone)]
pub struct TlsContext {
    config: Arc<rustls::ServerConfig>,
}

impl TlsContext {
    pub fn new(config: Arc<rustls::ServerConfig>) -> Self {
        Self { config }
    }

    pub(crate) fn wrap(&self, socket: TcpStream) -> io::Result<ServerStream> {
        let conn = ServerConnection::new(self.config.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        Ok(ServerStream::Tls(Box::new(StreamOwned::new(conn, socket))))
    }
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext").finish_non_exhaustive()
    }
}
