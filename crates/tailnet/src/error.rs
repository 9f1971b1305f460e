use thiserror::Error;

/// Typed failures of the exposure pipeline. None of these trigger an
/// automatic retry; the operator re-invokes `setup`.
#[derive(Debug, Error)]
pub enum TailnetError {
    /// Missing auth key or malformed listen address. Rejected before any
    /// state change.
    #[error("invalid exposure configuration: {0}")]
    Config(String),

    /// Joining the tailnet failed (bad auth key, network unreachable).
    #[error("failed to join tailnet: {0}")]
    Join(String),

    /// The TLS listener could not be established (port in use, permission
    /// denied, certificate minting failed).
    #[error("failed to bind tailnet TLS listener: {0}")]
    Listen(String),

    /// The node's local status query timed out or returned no usable DNS
    /// name. The listener may be up, but the operator cannot be told where
    /// the service is reachable.
    #[error("node identity unavailable: {0}")]
    IdentityUnavailable(String),

    /// The accept loop failed. Recorded on the controller as a `Failed`
    /// state; the process stays alive and reportable.
    #[error("forwarding failed: {0}")]
    Forwarding(String),
}
