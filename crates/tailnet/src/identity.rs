//! Node identity resolution and site-URL consistency checking.

use std::time::Duration;

use url::Url;

use crate::{backend::TailnetNode, error::TailnetError};

/// Bound on the local status round trip.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolve the node's externally visible DNS name, bounded by `timeout`.
///
/// Fails with [`TailnetError::IdentityUnavailable`] if the control interface
/// is unreachable, the timeout elapses, or the node reports no usable name.
pub async fn resolve_public_hostname(
    node: &dyn TailnetNode,
    timeout: Duration,
) -> Result<String, TailnetError> {
    let status = match tokio::time::timeout(timeout, node.local_status()).await {
        Ok(res) => res.map_err(|e| TailnetError::IdentityUnavailable(e.to_string()))?,
        Err(_) => {
            return Err(TailnetError::IdentityUnavailable(format!(
                "local status query timed out after {timeout:?}"
            )));
        },
    };

    // Status reports the DNS name rooted ("host.example.ts.net.").
    let hostname = status.self_dns_name.trim_end_matches('.');
    if hostname.is_empty() {
        return Err(TailnetError::IdentityUnavailable(
            "node reported an empty DNS name".into(),
        ));
    }
    Ok(hostname.to_string())
}

/// Whether the host component of the configured site URL equals the tailnet
/// hostname. URL parsing lowercases registered domain names, so the hostname
/// side is lowercased too: the comparison is ASCII case-insensitive, as DNS
/// names are. Scheme, port, and path are ignored; an unparseable URL never
/// matches. Used only for an operator-facing warning; a mismatch never
/// blocks exposure startup.
pub fn site_url_matches(hostname: &str, site_url: &str) -> bool {
    match Url::parse(site_url) {
        Ok(url) => url.host_str() == Some(hostname.to_ascii_lowercase().as_str()),
        Err(_) => false,
    }
}
