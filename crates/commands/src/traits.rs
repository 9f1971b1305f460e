//! Boundaries to the chat platform and the tailnet control plane. The
//! surrounding platform implements these; tests use in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-user control-plane credentials held by the keyed store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredentials {
    pub tailnet: String,
    pub api_key: String,
}

/// Posts ephemeral (caller-only) messages into the chat channel.
#[async_trait]
pub trait ChatPoster: Send + Sync {
    async fn post_ephemeral(&self, user_id: &str, channel_id: &str, message: &str);
}

/// Identity-and-role lookups against the chat platform.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn is_system_admin(&self, user_id: &str) -> anyhow::Result<bool>;
}

/// Keyed per-user credential storage.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, user_id: &str) -> anyhow::Result<Option<UserCredentials>>;
    async fn set(&self, user_id: &str, credentials: &UserCredentials) -> anyhow::Result<()>;
    async fn delete(&self, user_id: &str) -> anyhow::Result<()>;
}

/// Remote management API of the tailnet, used only to validate credentials.
#[async_trait]
pub trait ControlPlaneApi: Send + Sync {
    async fn validate(&self, tailnet: &str, api_key: &str) -> anyhow::Result<()>;
}
