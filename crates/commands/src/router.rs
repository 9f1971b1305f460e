//! Command routing: raw slash-command text in, one ephemeral reply out.

use std::sync::Arc;

use anyhow::Context;
use tailbridge_tailnet::ServeController;
use tracing::debug;

use crate::{
    serve,
    traits::{ChatPoster, ControlPlaneApi, CredentialStore, UserCredentials, UserDirectory},
};

const USAGE: &str = "Available commands: connect <tailnet> <api-key>, disconnect, tailnet, serve";
const CONNECT_USAGE: &str = "Usage: /tailbridge connect <tailnet> <api-key>";
const SERVE_USAGE: &str = "Available serve commands: setup <auth-key>, status";
const AUTH_FIRST: &str =
    "Please authenticate first using: `/tailbridge connect <tailnet> <api-key>`";

/// Collaborators the handlers run against.
pub struct CommandEnv {
    pub users: Arc<dyn UserDirectory>,
    pub poster: Arc<dyn ChatPoster>,
    pub credentials: Arc<dyn CredentialStore>,
    pub control_plane: Arc<dyn ControlPlaneApi>,
    pub controller: Arc<ServeController>,
}

/// A command invocation as delivered by the chat dispatcher.
#[derive(Debug, Clone)]
pub struct CommandArgs {
    pub user_id: String,
    pub channel_id: String,
    /// Full command text, e.g. `/tailbridge serve status`.
    pub command: String,
}

/// Route a command and post the single resulting ephemeral reply. Handler
/// errors are rendered for the caller; nothing is silently swallowed.
pub async fn execute(env: &CommandEnv, args: &CommandArgs) {
    let reply = match dispatch(env, args).await {
        Ok(message) => message,
        Err(e) => format!("An error occurred: {e:#}"),
    };
    env.poster
        .post_ephemeral(&args.user_id, &args.channel_id, &reply)
        .await;
}

/// Route a command to its handler and return the reply text.
pub async fn dispatch(env: &CommandEnv, args: &CommandArgs) -> anyhow::Result<String> {
    let split: Vec<&str> = args.command.split_whitespace().collect();
    let Some(cmd) = split.get(1) else {
        return Ok(USAGE.to_string());
    };
    debug!(user_id = %args.user_id, command = %cmd, "handling command");

    match *cmd {
        "connect" => {
            if split.len() != 4 {
                return Ok(CONNECT_USAGE.to_string());
            }
            handle_connect(env, &args.user_id, split[2], split[3]).await
        },
        "disconnect" => handle_disconnect(env, &args.user_id).await,
        "tailnet" => handle_tailnet(env, &args.user_id).await,
        "serve" => match split.get(2) {
            Some(&"setup") => {
                if split.len() > 4 {
                    return Ok(SERVE_USAGE.to_string());
                }
                serve::handle_setup(env, &args.user_id, split.get(3).copied()).await
            },
            Some(&"status") => serve::handle_status(env, &args.user_id).await,
            _ => Ok(SERVE_USAGE.to_string()),
        },
        _ => Ok(USAGE.to_string()),
    }
}

async fn handle_connect(
    env: &CommandEnv,
    user_id: &str,
    tailnet: &str,
    api_key: &str,
) -> anyhow::Result<String> {
    env.control_plane
        .validate(tailnet, api_key)
        .await
        .context("failed to authenticate with the control plane")?;

    let credentials = UserCredentials {
        tailnet: tailnet.to_string(),
        api_key: api_key.to_string(),
    };
    env.credentials
        .set(user_id, &credentials)
        .await
        .context("failed to store credentials")?;

    Ok(format!("Successfully authenticated for tailnet: {tailnet}"))
}

async fn handle_disconnect(env: &CommandEnv, user_id: &str) -> anyhow::Result<String> {
    let Some(credentials) = env
        .credentials
        .get(user_id)
        .await
        .context("failed to retrieve credentials")?
    else {
        return Ok(AUTH_FIRST.to_string());
    };

    env.credentials
        .delete(user_id)
        .await
        .context("failed to remove credentials")?;

    Ok(format!(
        "Successfully disconnected from tailnet: {}",
        credentials.tailnet
    ))
}

async fn handle_tailnet(env: &CommandEnv, user_id: &str) -> anyhow::Result<String> {
    let Some(credentials) = env
        .credentials
        .get(user_id)
        .await
        .context("failed to retrieve credentials")?
    else {
        return Ok(AUTH_FIRST.to_string());
    };
    Ok(format!("Your tailnet: {}", credentials.tailnet))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serial_test::serial;
    use tailbridge_tailnet::testing::MemoryBackend;

    use super::*;
    use crate::store::FileCredentialStore;

    struct FakeUsers {
        admin: bool,
    }

    #[async_trait]
    impl UserDirectory for FakeUsers {
        async fn is_system_admin(&self, _user_id: &str) -> anyhow::Result<bool> {
            Ok(self.admin)
        }
    }

    #[derive(Default)]
    struct FakePoster {
        posts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChatPoster for FakePoster {
        async fn post_ephemeral(&self, user_id: &str, _channel_id: &str, message: &str) {
            self.posts
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push((user_id.to_string(), message.to_string()));
        }
    }

    struct FakeControlPlane {
        accept: bool,
    }

    #[async_trait]
    impl ControlPlaneApi for FakeControlPlane {
        async fn validate(&self, _tailnet: &str, _api_key: &str) -> anyhow::Result<()> {
            anyhow::ensure!(self.accept, "control plane rejected the credentials (401)");
            Ok(())
        }
    }

    struct TestHarness {
        env: CommandEnv,
        poster: Arc<FakePoster>,
        _dir: tempfile::TempDir,
    }

    fn harness(admin: bool, backend: MemoryBackend) -> TestHarness {
        let dir = tempfile::tempdir().expect("tempdir");
        tailbridge_config::set_config_dir(dir.path().to_path_buf());

        let poster = Arc::new(FakePoster::default());
        let env = CommandEnv {
            users: Arc::new(FakeUsers { admin }),
            poster: Arc::clone(&poster) as Arc<dyn ChatPoster>,
            credentials: Arc::new(FileCredentialStore::with_path(
                dir.path().join("credentials.json"),
            )),
            control_plane: Arc::new(FakeControlPlane { accept: true }),
            controller: Arc::new(ServeController::new(Arc::new(backend))),
        };
        TestHarness {
            env,
            poster,
            _dir: dir,
        }
    }

    fn args(command: &str) -> CommandArgs {
        CommandArgs {
            user_id: "user-1".into(),
            channel_id: "channel-1".into(),
            command: command.into(),
        }
    }

    #[tokio::test]
    #[serial]
    async fn bare_command_prints_usage() {
        let h = harness(false, MemoryBackend::new("node.example.ts.net"));
        let reply = dispatch(&h.env, &args("/tailbridge")).await.expect("dispatch");
        assert_eq!(reply, USAGE);
    }

    #[tokio::test]
    #[serial]
    async fn unknown_subcommand_prints_usage() {
        let h = harness(false, MemoryBackend::new("node.example.ts.net"));
        let reply = dispatch(&h.env, &args("/tailbridge frobnicate")).await.expect("dispatch");
        assert_eq!(reply, USAGE);
    }

    #[tokio::test]
    #[serial]
    async fn serve_requires_system_admin() {
        let h = harness(false, MemoryBackend::new("node.example.ts.net"));
        let err = dispatch(&h.env, &args("/tailbridge serve setup tskey-x"))
            .await
            .expect_err("must fail");
        assert!(err.to_string().contains("system administrators"));
    }

    #[tokio::test]
    #[serial]
    async fn execute_wraps_errors_for_the_caller() {
        let h = harness(false, MemoryBackend::new("node.example.ts.net"));
        execute(&h.env, &args("/tailbridge serve status")).await;

        let posts = h.poster.posts.lock().unwrap_or_else(|p| p.into_inner());
        assert_eq!(posts.len(), 1);
        assert!(posts[0].1.starts_with("An error occurred: "));
    }

    #[tokio::test]
    #[serial]
    async fn serve_setup_persists_config_and_reports_url() {
        let h = harness(true, MemoryBackend::new("node.example.ts.net."));
        let reply = dispatch(&h.env, &args("/tailbridge serve setup tskey-valid"))
            .await
            .expect("setup");

        assert!(reply.contains("https://node.example.ts.net"));
        // Default site URL points at localhost, so the warning fires.
        assert!(reply.contains("Warning"));

        let cfg = tailbridge_config::discover_and_load();
        assert!(cfg.serve.enabled);
        assert_eq!(cfg.serve.auth_key, "tskey-valid");
    }

    #[tokio::test]
    #[serial]
    async fn serve_setup_with_matching_site_url_has_no_warning() {
        let h = harness(true, MemoryBackend::new("node.example.ts.net"));
        tailbridge_config::update_config(|c| {
            c.service.site_url = "https://node.example.ts.net".into();
        })
        .expect("seed config");

        let reply = dispatch(&h.env, &args("/tailbridge serve setup tskey-valid"))
            .await
            .expect("setup");
        assert!(!reply.contains("Warning"));
    }

    #[tokio::test]
    #[serial]
    async fn serve_setup_with_trailing_arguments_prints_usage() {
        let h = harness(true, MemoryBackend::new("node.example.ts.net"));
        let reply = dispatch(&h.env, &args("/tailbridge serve setup tskey-x extra"))
            .await
            .expect("dispatch");
        assert_eq!(reply, SERVE_USAGE);
    }

    #[tokio::test]
    #[serial]
    async fn serve_setup_without_key_is_a_usage_error() {
        let h = harness(true, MemoryBackend::new("node.example.ts.net"));
        let err = dispatch(&h.env, &args("/tailbridge serve setup"))
            .await
            .expect_err("must fail");
        assert!(err.to_string().contains("usage:"));
    }

    #[tokio::test]
    #[serial]
    async fn serve_status_before_any_start_reports_not_running() {
        let h = harness(true, MemoryBackend::new("node.example.ts.net"));
        let reply = dispatch(&h.env, &args("/tailbridge serve status")).await.expect("status");
        assert_eq!(reply, "Tailnet serve is not running");
    }

    #[tokio::test]
    #[serial]
    async fn serve_status_after_setup_reports_live_hostname() {
        let h = harness(true, MemoryBackend::new("node.example.ts.net."));
        dispatch(&h.env, &args("/tailbridge serve setup tskey-valid"))
            .await
            .expect("setup");

        let reply = dispatch(&h.env, &args("/tailbridge serve status")).await.expect("status");
        assert!(reply.contains("running at https://node.example.ts.net"));
    }

    #[tokio::test]
    #[serial]
    async fn serve_status_after_failed_setup_reports_last_error() {
        let h = harness(
            true,
            MemoryBackend::new("node.example.ts.net").with_join_error("invalid key"),
        );
        dispatch(&h.env, &args("/tailbridge serve setup tskey-bad"))
            .await
            .expect_err("setup must fail");

        let reply = dispatch(&h.env, &args("/tailbridge serve status")).await.expect("status");
        assert!(reply.contains("not running"));
        assert!(reply.contains("invalid key"));
    }

    #[tokio::test]
    #[serial]
    async fn connect_stores_credentials_and_tailnet_reports_them() {
        let h = harness(false, MemoryBackend::new("node.example.ts.net"));
        let reply = dispatch(&h.env, &args("/tailbridge connect corp.example.com tskey-api-x"))
            .await
            .expect("connect");
        assert!(reply.contains("corp.example.com"));

        let reply = dispatch(&h.env, &args("/tailbridge tailnet")).await.expect("tailnet");
        assert_eq!(reply, "Your tailnet: corp.example.com");

        let reply = dispatch(&h.env, &args("/tailbridge disconnect")).await.expect("disconnect");
        assert!(reply.contains("disconnected from tailnet: corp.example.com"));

        let reply = dispatch(&h.env, &args("/tailbridge tailnet")).await.expect("tailnet");
        assert_eq!(reply, AUTH_FIRST);
    }

    #[tokio::test]
    #[serial]
    async fn connect_with_rejected_credentials_stores_nothing() {
        let mut h = harness(false, MemoryBackend::new("node.example.ts.net"));
        h.env.control_plane = Arc::new(FakeControlPlane { accept: false });

        let err = dispatch(&h.env, &args("/tailbridge connect corp.example.com bad-key"))
            .await
            .expect_err("must fail");
        assert!(err.to_string().contains("authenticate"));

        let reply = dispatch(&h.env, &args("/tailbridge tailnet")).await.expect("tailnet");
        assert_eq!(reply, AUTH_FIRST);
    }

    #[tokio::test]
    #[serial]
    async fn connect_with_wrong_arity_prints_usage() {
        let h = harness(false, MemoryBackend::new("node.example.ts.net"));
        let reply = dispatch(&h.env, &args("/tailbridge connect corp.example.com"))
            .await
            .expect("dispatch");
        assert_eq!(reply, CONNECT_USAGE);
    }
}
