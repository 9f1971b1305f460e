//! Production backend over the host's `tailscale` daemon.
//!
//! Joining runs `tailscale up`, identity comes from `tailscale status
//! --json`, and the public listener is a TCP socket bound on the node's
//! tailnet address, TLS-terminated with a certificate minted by `tailscale
//! cert`. Everything daemon-specific stays behind the [`crate::backend`]
//! traits; nothing else in the crate shells out.

use std::{
    io,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{net::TcpListener, process::Command};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info};

use crate::{
    backend::{JoinOptions, LocalNodeStatus, TailnetBackend, TailnetListener, TailnetNode,
        TailnetStream},
    error::TailnetError,
};

/// Backend that drives the `tailscale` CLI on the host.
pub struct HostBackend {
    tailscale_bin: PathBuf,
}

impl HostBackend {
    pub fn new() -> Self {
        Self {
            tailscale_bin: PathBuf::from("tailscale"),
        }
    }

    /// Use a specific `tailscale` binary instead of resolving via `PATH`.
    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            tailscale_bin: path.into(),
        }
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TailnetBackend for HostBackend {
    async fn join(&self, opts: JoinOptions) -> Result<Box<dyn TailnetNode>, TailnetError> {
        tokio::fs::create_dir_all(&opts.state_dir)
            .await
            .map_err(|e| {
                TailnetError::Join(format!("create state dir {}: {e}", opts.state_dir.display()))
            })?;

        run_checked(
            Command::new(&self.tailscale_bin)
                .arg("up")
                .arg(format!("--auth-key={}", opts.auth_key))
                .arg(format!("--hostname={}", opts.hostname)),
        )
        .await
        .map_err(TailnetError::Join)?;

        info!(hostname = %opts.hostname, "joined tailnet");
        Ok(Box::new(HostNode {
            tailscale_bin: self.tailscale_bin.clone(),
            state_dir: opts.state_dir,
        }))
    }
}

struct HostNode {
    tailscale_bin: PathBuf,
    state_dir: PathBuf,
}

#[derive(Deserialize)]
struct StatusDoc {
    #[serde(rename = "Self")]
    self_peer: PeerDoc,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct PeerDoc {
    #[serde(rename = "DNSName")]
    dns_name: String,
    #[serde(rename = "TailscaleIPs")]
    tailscale_ips: Vec<String>,
}

impl HostNode {
    async fn status_doc(&self) -> Result<StatusDoc, String> {
        let raw = run_checked(
            Command::new(&self.tailscale_bin)
                .arg("status")
                .arg("--json"),
        )
        .await?;
        serde_json::from_str(&raw).map_err(|e| format!("parse status output: {e}"))
    }
}

#[async_trait]
impl TailnetNode for HostNode {
    async fn listen_tls(&self, port: u16) -> Result<Box<dyn TailnetListener>, TailnetError> {
        let status = self.status_doc().await.map_err(TailnetError::Listen)?;
        let dns_name = status.self_peer.dns_name.trim_end_matches('.').to_string();
        if dns_name.is_empty() {
            return Err(TailnetError::Listen(
                "node has no DNS name; is MagicDNS enabled for the tailnet?".into(),
            ));
        }
        let ip: IpAddr = status
            .self_peer
            .tailscale_ips
            .iter()
            .find_map(|s| s.parse().ok())
            .ok_or_else(|| TailnetError::Listen("node reports no tailnet address".into()))?;

        // Mint (or refresh) the node's HTTPS keypair into the state dir.
        let cert_path = self.state_dir.join(format!("{dns_name}.crt"));
        let key_path = self.state_dir.join(format!("{dns_name}.key"));
        run_checked(
            Command::new(&self.tailscale_bin)
                .arg("cert")
                .arg("--cert-file")
                .arg(&cert_path)
                .arg("--key-file")
                .arg(&key_path)
                .arg(&dns_name),
        )
        .await
        .map_err(TailnetError::Listen)?;

        let acceptor = tls_acceptor(&cert_path, &key_path).map_err(TailnetError::Listen)?;
        let listener = TcpListener::bind(SocketAddr::new(ip, port))
            .await
            .map_err(|e| TailnetError::Listen(format!("bind {ip}:{port}: {e}")))?;
        debug!(%ip, port, %dns_name, "tailnet TLS listener bound");

        Ok(Box::new(TlsTailnetListener {
            inner: listener,
            acceptor,
        }))
    }

    async fn local_status(&self) -> Result<LocalNodeStatus, TailnetError> {
        let doc = self
            .status_doc()
            .await
            .map_err(TailnetError::IdentityUnavailable)?;
        Ok(LocalNodeStatus {
            self_dns_name: doc.self_peer.dns_name,
        })
    }

    async fn close(&self) {
        // Membership is left intact: the daemon may be shared with other
        // workloads on the host. Listener and certs are released by drop.
    }
}

async fn run_checked(cmd: &mut Command) -> Result<String, String> {
    let output = cmd
        .output()
        .await
        .map_err(|e| format!("spawn tailscale: {e}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "tailscale exited with {}: {}",
            output.status,
            stderr.trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, String> {
    let certs = rustls_pemfile::certs(&mut pem_reader(cert_path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("read certificates from {}: {e}", cert_path.display()))?;
    let key = rustls_pemfile::private_key(&mut pem_reader(key_path)?)
        .map_err(|e| format!("read key from {}: {e}", key_path.display()))?
        .ok_or_else(|| format!("no private key found in {}", key_path.display()))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| format!("tls protocol config: {e}"))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| format!("tls certificate config: {e}"))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn pem_reader(path: &Path) -> Result<io::BufReader<std::fs::File>, String> {
    std::fs::File::open(path)
        .map(io::BufReader::new)
        .map_err(|e| format!("open {}: {e}", path.display()))
}

struct TlsTailnetListener {
    inner: TcpListener,
    acceptor: TlsAcceptor,
}

#[async_trait]
impl TailnetListener for TlsTailnetListener {
    async fn accept(&mut self) -> io::Result<(Box<dyn TailnetStream>, SocketAddr)> {
        let (tcp, addr) = self.inner.accept().await?;
        let tls = self.acceptor.accept(tcp).await?;
        Ok((Box::new(tls), addr))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
