use std::{collections::HashMap, io, path::PathBuf};

use anyhow::Context;
use async_trait::async_trait;

use crate::traits::{CredentialStore, UserCredentials};

/// File-based credential store at `<data_dir>/credentials.json`: one JSON
/// map keyed by user id. Stands in when the chat platform provides no keyed
/// store of its own. A missing file reads as empty; a corrupt or unreadable
/// file is an error, never an empty map, so a later write cannot wipe other
/// users' stored credentials.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new() -> Self {
        Self {
            path: tailbridge_config::data_dir().join("credentials.json"),
        }
    }

    /// Store at a specific path (useful for testing).
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    fn load_map(&self) -> anyhow::Result<HashMap<String, UserCredentials>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("read {}", self.path.display()));
            },
        };
        serde_json::from_str(&data)
            .with_context(|| format!("corrupt credential store at {}", self.path.display()))
    }

    fn save_map(&self, map: &HashMap<String, UserCredentials>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, &data)?;

        // Holds API keys; keep it owner-readable only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

impl Default for FileCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, user_id: &str) -> anyhow::Result<Option<UserCredentials>> {
        Ok(self.load_map()?.get(user_id).cloned())
    }

    async fn set(&self, user_id: &str, credentials: &UserCredentials) -> anyhow::Result<()> {
        let mut map = self.load_map()?;
        map.insert(user_id.to_string(), credentials.clone());
        self.save_map(&map)
    }

    async fn delete(&self, user_id: &str) -> anyhow::Result<()> {
        let mut map = self.load_map()?;
        if map.remove(user_id).is_some() {
            self.save_map(&map)?;
        }
        Ok(())
    }
}
