//! Admin-gated `serve setup` / `serve status` handlers.

use anyhow::Context;
use tailbridge_config::TailbridgeConfig;
use tailbridge_tailnet::{ServeStartConfig, ServeState, site_url_matches};

use crate::router::CommandEnv;

const NOT_RUNNING: &str = "Tailnet serve is not running";

/// Build the controller's start snapshot from the current configuration.
/// Node state lives in a dedicated subdirectory of the data dir so repeated
/// restarts reuse the same node identity.
pub fn start_config_from(config: &TailbridgeConfig) -> ServeStartConfig {
    ServeStartConfig {
        auth_key: config.serve.auth_key.clone(),
        hostname: config.serve.hostname.clone(),
        listen_address: config.service.listen_address.clone(),
        state_dir: tailbridge_config::data_dir().join("tailnet"),
    }
}

/// Success message for a fresh exposure, with the site-URL warning appended
/// when the configured URL points elsewhere.
pub fn setup_message(hostname: &str, site_url: &str) -> String {
    let mut message = format!(
        "Successfully started tailnet serve!\n\
         Your chat service is now reachable over tailnet HTTPS.\n\
         You can access it at: https://{hostname}\n"
    );
    push_site_url_warning(&mut message, hostname, site_url);
    message
}

fn running_message(hostname: &str, site_url: &str) -> String {
    let mut message = format!("Tailnet serve is running at https://{hostname}");
    push_site_url_warning(&mut message, hostname, site_url);
    message
}

fn push_site_url_warning(message: &mut String, hostname: &str, site_url: &str) {
    if !site_url_matches(hostname, site_url) {
        message.push_str(&format!(
            "\nWarning: the configured site URL does not match the tailnet DNS name.\n\
             Please update it to: https://{hostname}\n"
        ));
    }
}

pub(crate) async fn handle_setup(
    env: &CommandEnv,
    user_id: &str,
    auth_key: Option<&str>,
) -> anyhow::Result<String> {
    ensure_admin(env, user_id).await?;
    let auth_key =
        auth_key.ok_or_else(|| anyhow::anyhow!("usage: /tailbridge serve setup <auth-key>"))?;

    tailbridge_config::update_config(|c| {
        c.serve.enabled = true;
        c.serve.auth_key = auth_key.to_string();
    })
    .context("failed to save auth key")?;

    let config = tailbridge_config::discover_and_load();
    let identity = env
        .controller
        .start(start_config_from(&config))
        .await
        .context("failed to start tailnet serve")?;

    Ok(setup_message(&identity.hostname, &config.service.site_url))
}

pub(crate) async fn handle_status(env: &CommandEnv, user_id: &str) -> anyhow::Result<String> {
    ensure_admin(env, user_id).await?;

    let snapshot = env.controller.status().await;
    if snapshot.state != ServeState::Running {
        return Ok(match snapshot.last_error {
            Some(err) => format!("{NOT_RUNNING} (last error: {err})"),
            None => NOT_RUNNING.to_string(),
        });
    }

    // Live check against the node, not the hostname cached at start.
    match env.controller.live_hostname().await {
        Some(Ok(hostname)) => {
            let config = tailbridge_config::discover_and_load();
            Ok(running_message(&hostname, &config.service.site_url))
        },
        Some(Err(e)) => Err(anyhow::anyhow!("failed to resolve tailnet DNS name: {e}")),
        None => Ok(NOT_RUNNING.to_string()),
    }
}

async fn ensure_admin(env: &CommandEnv, user_id: &str) -> anyhow::Result<()> {
    let is_admin = env
        .users
        .is_system_admin(user_id)
        .await
        .context("failed to look up user")?;
    anyhow::ensure!(
        is_admin,
        "only system administrators can use the serve command"
    );
    Ok(())
}
