use std::net::SocketAddr;

use serde::Deserialize;

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server binds to. Defaults to
    /// `127.0.0.1:8000` when unset and not overridden on the command line.
    pub listen_address: Option<SocketAddr>,
    /// Whether to attach a permissive CORS layer.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: None,
            cors: true,
        }
    }
}

impl ServerConfig {
    /// The address to bind, falling back to the default.
    pub fn listen_address_or_default(&self) -> SocketAddr {
        self.listen_address
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8000)))
    }
}
