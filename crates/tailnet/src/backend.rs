//! Capability seam between the exposure pipeline and the tailnet itself.
//!
//! The controller depends on exactly three calls: join, listen, and local
//! status. Keeping them behind traits lets tests simulate join/listen/
//! identity failures without a network stack.

use std::{io, net::SocketAddr, path::PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::TailnetError;

/// Standard HTTPS port the public listener binds on the tailnet side.
pub const PUBLIC_HTTPS_PORT: u16 = 443;

/// Parameters for joining the tailnet.
#[derive(Debug, Clone)]
pub struct JoinOptions {
    /// Dedicated persistent directory for node state, so repeated restarts
    /// reuse the same node identity and credentials.
    pub state_dir: PathBuf,
    /// Hostname to register on the tailnet.
    pub hostname: String,
    /// Pre-authorized key used to join.
    pub auth_key: String,
}

/// Snapshot of the node's own view of itself.
#[derive(Debug, Clone, Default)]
pub struct LocalNodeStatus {
    /// Externally resolvable DNS name of this node. May carry a trailing
    /// root-label dot (`host.example.ts.net.`).
    pub self_dns_name: String,
}

/// A TLS-terminated byte stream accepted from the public listener.
pub trait TailnetStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> TailnetStream for T {}

/// The public listener obtained from a joined node.
#[async_trait]
pub trait TailnetListener: Send {
    async fn accept(&mut self) -> io::Result<(Box<dyn TailnetStream>, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// A joined tailnet node: the session object representing membership,
/// including its listener factory and control interface.
#[async_trait]
pub trait TailnetNode: Send + Sync {
    /// Request a TLS-terminating listener on the given port.
    async fn listen_tls(&self, port: u16) -> Result<Box<dyn TailnetListener>, TailnetError>;

    /// Query the node's local control interface for its own status.
    /// Callers bound this with a timeout; see [`crate::identity`].
    async fn local_status(&self) -> Result<LocalNodeStatus, TailnetError>;

    /// Release node resources. Idempotent.
    async fn close(&self);
}

/// Entry point: joins the tailnet and hands back a node session.
#[async_trait]
pub trait TailnetBackend: Send + Sync {
    async fn join(&self, opts: JoinOptions) -> Result<Box<dyn TailnetNode>, TailnetError>;
}
