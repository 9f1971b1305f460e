use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TailbridgeConfig {
    pub service: ServiceConfig,
    pub serve: ServeConfig,
}

/// The local chat service being exposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Bind address of the local service, `host:port` or `:port`.
    /// A bare `:port` is normalized to `localhost:port` before forwarding.
    pub listen_address: String,

    /// Externally configured base URL of the service. Compared against the
    /// tailnet DNS name to warn about mismatched links/redirects.
    pub site_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_address: ":8065".into(),
            site_url: "http://localhost:8065".into(),
        }
    }
}

/// Tailnet exposure settings. Mutated only by `serve setup`; read as a value
/// snapshot when an exposure is started.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Whether to expose the service on startup.
    pub enabled: bool,

    /// Tailnet auth key used to join. Stored in the config file; the file is
    /// written with mode 0600 on Unix.
    pub auth_key: String,

    /// Hostname to register on the tailnet.
    pub hostname: String,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auth_key: String::new(),
            hostname: "tailbridge".into(),
        }
    }
}
