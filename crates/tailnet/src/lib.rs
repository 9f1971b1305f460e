//! Tailnet ingress exposure: join a mesh-VPN node, obtain a TLS listener on
//! its public hostname, and reverse-proxy inbound HTTPS to the local service.
//!
//! Lifecycle:
//! 1. `ServeController::start` snapshots the exposure config
//! 2. Backend joins the tailnet (persistent state dir, stable node identity)
//! 3. TLS listener bound on port 443, public hostname resolved (10 s bound)
//! 4. Forwarding task attached; state becomes `Running`
//!
//! The tailnet itself sits behind the [`backend`] traits so the whole
//! pipeline runs against in-memory doubles in tests; [`host`] carries the
//! production implementation over the host's `tailscale` daemon.

pub mod backend;
pub mod controller;
pub mod error;
pub mod host;
pub mod identity;
pub mod proxy;
pub mod testing;

pub use backend::{
    JoinOptions, LocalNodeStatus, PUBLIC_HTTPS_PORT, TailnetBackend, TailnetListener, TailnetNode,
};
pub use controller::{
    PublicIdentity, ServeController, ServeStartConfig, ServeState, ServeStatusSnapshot,
};
pub use error::TailnetError;
pub use host::HostBackend;
pub use identity::{STATUS_TIMEOUT, resolve_public_hostname, site_url_matches};
pub use proxy::ForwardTarget;
