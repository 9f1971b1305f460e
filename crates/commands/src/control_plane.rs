use anyhow::Context;
use async_trait::async_trait;

use crate::traits::ControlPlaneApi;

const DEFAULT_BASE_URL: &str = "https://api.tailscale.com";

/// Thin HTTP client against the tailnet's management API. The only call we
/// need is a credential check, done by listing the tailnet's devices.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: reqwest::Client,
    base_url: String,
}

impl HttpControlPlane {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point at a different API endpoint (useful for testing).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for HttpControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlPlaneApi for HttpControlPlane {
    async fn validate(&self, tailnet: &str, api_key: &str) -> anyhow::Result<()> {
        let url = format!("{}/api/v2/tailnet/{tailnet}/devices", self.base_url);
        let resp = self
            .client
            .get(&url)
            .basic_auth(api_key, None::<&str>)
            .send()
            .await
            .context("control plane request failed")?;
        anyhow::ensure!(
            resp.status().is_success(),
            "control plane rejected the credentials ({})",
            resp.status()
        );
        Ok(())
    }
}
