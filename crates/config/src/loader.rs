use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::TailbridgeConfig};

/// Config file name, checked project-local first, then user-global.
const CONFIG_FILENAME: &str = "tailbridge.toml";

/// Override for the config directory, set via `set_config_dir()`.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Set a custom config directory. When set, config discovery only looks in
/// this directory (project-local and user-global paths are skipped). Each
/// call replaces the previous override, so tests can isolate themselves.
pub fn set_config_dir(path: PathBuf) {
    *lock_override() = Some(path);
}

fn lock_override() -> std::sync::MutexGuard<'static, Option<PathBuf>> {
    CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn config_dir_override() -> Option<PathBuf> {
    lock_override().clone()
}

/// Load config from the given path.
pub fn load_config(path: &Path) -> anyhow::Result<TailbridgeConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    Ok(toml::from_str(&raw)?)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./tailbridge.toml` (project-local)
/// 2. `~/.config/tailbridge/tailbridge.toml` (user-global)
///
/// Returns `TailbridgeConfig::default()` if no config file is found.
pub fn discover_and_load() -> TailbridgeConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return TailbridgeConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            TailbridgeConfig::default()
        },
    }
}

/// Find the config file in standard locations.
///
/// When a config dir override is set, only that directory is searched —
/// project-local and user-global paths are skipped for isolation.
fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        let p = dir.join(CONFIG_FILENAME);
        // Override is set — never fall through to other locations.
        return p.exists().then_some(p);
    }

    // Project-local
    let p = PathBuf::from(CONFIG_FILENAME);
    if p.exists() {
        return Some(p);
    }

    // User-global: ~/.config/tailbridge/
    let p = home_dir()?.join(".config").join("tailbridge").join(CONFIG_FILENAME);
    p.exists().then_some(p)
}

/// Returns the config directory: override, or `~/.config/tailbridge/`.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return Some(dir);
    }
    home_dir().map(|h| h.join(".config").join("tailbridge"))
}

/// Returns the data directory: `~/.tailbridge/` (or the config dir override
/// when set, so tests keep node state out of the home directory).
pub fn data_dir() -> PathBuf {
    if let Some(dir) = config_dir_override() {
        return dir;
    }
    home_dir()
        .map(|h| h.join(".tailbridge"))
        .unwrap_or_else(|| PathBuf::from(".tailbridge"))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// Returns the path of an existing config file, or the default path.
fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file() {
        return path;
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_FILENAME)
}

/// Lock guarding config read-modify-write cycles.
static CONFIG_SAVE_LOCK: Mutex<()> = Mutex::new(());

/// Atomically load the current config, apply `f`, and save.
///
/// Acquires a process-wide lock so concurrent callers cannot race.
/// Returns the path written to.
pub fn update_config(f: impl FnOnce(&mut TailbridgeConfig)) -> anyhow::Result<PathBuf> {
    let _guard = CONFIG_SAVE_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let mut config = discover_and_load();
    f(&mut config);
    save_config_inner(&config)
}

/// Serialize `config` to TOML and write it to the active config path.
///
/// Prefer [`update_config`] for read-modify-write cycles to avoid races.
pub fn save_config(config: &TailbridgeConfig) -> anyhow::Result<PathBuf> {
    let _guard = CONFIG_SAVE_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    save_config_inner(config)
}

fn save_config_inner(config: &TailbridgeConfig) -> anyhow::Result<PathBuf> {
    let path = find_or_default_config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))?;
    std::fs::write(&path, toml_str)?;

    // The file may hold a tailnet auth key; keep it owner-readable only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    debug!(path = %path.display(), "saved config");
    Ok(path)
}
