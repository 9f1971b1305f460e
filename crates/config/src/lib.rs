//! Process-wide configuration: schema, discovery, load/save.
//!
//! Config lives in `tailbridge.toml`, looked up project-local first and then
//! in `~/.config/tailbridge/`. `${ENV_VAR}` placeholders in the raw file are
//! substituted before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use loader::{
    config_dir, data_dir, discover_and_load, load_config, save_config, set_config_dir,
    update_config,
};
pub use schema::{ServeConfig, ServiceConfig, TailbridgeConfig};
