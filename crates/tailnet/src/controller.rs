//! Exposure lifecycle controller: owns the serve state machine and the
//! active tailnet session.

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    backend::{JoinOptions, PUBLIC_HTTPS_PORT, TailnetBackend, TailnetNode},
    error::TailnetError,
    identity,
    proxy::{ForwardTarget, forward_loop},
};

/// Value snapshot of the exposure configuration at the moment `start` is
/// invoked. The controller never reads live configuration.
#[derive(Debug, Clone)]
pub struct ServeStartConfig {
    pub auth_key: String,
    pub hostname: String,
    /// Bind address of the local service (`host:port` or `:port`).
    pub listen_address: String,
    /// Persistent directory for tailnet node state.
    pub state_dir: PathBuf,
}

/// Identity of a successfully established exposure.
#[derive(Debug, Clone)]
pub struct PublicIdentity {
    /// DNS name by which the tailnet makes this node reachable.
    pub hostname: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeState {
    NotRunning,
    Starting,
    Running,
    Failed,
}

/// Observable controller state. Pure data; reading it has no side effects.
#[derive(Debug, Clone)]
pub struct ServeStatusSnapshot {
    pub state: ServeState,
    pub public_hostname: Option<String>,
    pub last_error: Option<String>,
}

struct ActiveSession {
    node: Arc<dyn TailnetNode>,
    cancel: CancellationToken,
    forward_task: tokio::task::JoinHandle<()>,
}

/// Drives an exposure session: at most one live node handle and one
/// forwarding task exist per controller at any time. Construct one per
/// process component; there is no ambient global instance.
pub struct ServeController {
    backend: Arc<dyn TailnetBackend>,
    status_timeout: Duration,
    /// Serializes start/stop. A start that loses the race performs its own
    /// fresh start, superseding the winner's session.
    session: Mutex<Option<ActiveSession>>,
    status: Arc<RwLock<ServeStatusSnapshot>>,
}

impl ServeController {
    pub fn new(backend: Arc<dyn TailnetBackend>) -> Self {
        Self {
            backend,
            status_timeout: identity::STATUS_TIMEOUT,
            session: Mutex::new(None),
            status: Arc::new(RwLock::new(ServeStatusSnapshot {
                state: ServeState::NotRunning,
                public_hostname: None,
                last_error: None,
            })),
        }
    }

    /// Override the identity-resolution bound (tests use a short one).
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    /// Establish (or re-establish) the exposure.
    ///
    /// Any prior session is torn down first — cancelled, awaited, closed —
    /// so two listeners are never bound to the public port at once. On any
    /// failure the state transitions to `Failed` and no partial handle is
    /// retained. This call blocks on network operations (join, bind, one
    /// bounded identity round trip); keep it off latency-sensitive paths.
    pub async fn start(&self, config: ServeStartConfig) -> Result<PublicIdentity, TailnetError> {
        if config.auth_key.trim().is_empty() {
            return Err(TailnetError::Config("auth key is empty".into()));
        }
        let target = ForwardTarget::parse(&config.listen_address)?;

        let mut session = self.session.lock().await;
        if let Some(prev) = session.take() {
            info!("superseding existing exposure session");
            shutdown_session(prev).await;
        }
        self.set_status(ServeState::Starting, None, None).await;

        let join = JoinOptions {
            state_dir: config.state_dir.clone(),
            hostname: config.hostname.clone(),
            auth_key: config.auth_key.clone(),
        };
        let node: Arc<dyn TailnetNode> = match self.backend.join(join).await {
            Ok(node) => Arc::from(node),
            Err(e) => return self.fail(e).await,
        };

        let listener = match node.listen_tls(PUBLIC_HTTPS_PORT).await {
            Ok(listener) => listener,
            Err(e) => {
                node.close().await;
                return self.fail(e).await;
            },
        };

        let hostname =
            match identity::resolve_public_hostname(node.as_ref(), self.status_timeout).await {
                Ok(hostname) => hostname,
                Err(e) => {
                    drop(listener);
                    node.close().await;
                    return self.fail(e).await;
                },
            };

        // Handle captured and state transitioned before the accept loop
        // starts, so `status` never reports `Running` without a listener.
        self.set_status(ServeState::Running, Some(hostname.clone()), None)
            .await;

        let cancel = CancellationToken::new();
        let forward_task = tokio::spawn({
            let target = target.clone();
            let cancel = cancel.clone();
            let status = Arc::clone(&self.status);
            async move {
                if let Err(e) = forward_loop(listener, target, cancel).await {
                    error!(error = %e, "forwarding loop failed");
                    let mut st = status.write().await;
                    st.state = ServeState::Failed;
                    st.last_error = Some(e.to_string());
                }
            }
        });

        *session = Some(ActiveSession {
            node,
            cancel,
            forward_task,
        });
        info!(hostname = %hostname, target = %target, "tailnet exposure running");
        Ok(PublicIdentity { hostname })
    }

    /// Tear down the active session, if any, and return to `NotRunning`.
    pub async fn stop(&self) {
        let mut session = self.session.lock().await;
        if let Some(prev) = session.take() {
            shutdown_session(prev).await;
            self.set_status(ServeState::NotRunning, None, None).await;
            info!("tailnet exposure stopped");
        }
    }

    /// Current state. Safe to call concurrently with `start`; never blocks
    /// on the forwarding loop.
    pub async fn status(&self) -> ServeStatusSnapshot {
        self.status.read().await.clone()
    }

    /// Re-resolve the public hostname from the live node (not the cached
    /// value recorded at start). `None` when no session is established.
    pub async fn live_hostname(&self) -> Option<Result<String, TailnetError>> {
        let node = {
            let session = self.session.lock().await;
            session.as_ref().map(|s| Arc::clone(&s.node))
        };
        let node = node?;
        Some(identity::resolve_public_hostname(node.as_ref(), self.status_timeout).await)
    }

    async fn fail(&self, err: TailnetError) -> Result<PublicIdentity, TailnetError> {
        warn!(error = %err, "exposure start failed");
        self.set_status(ServeState::Failed, None, Some(err.to_string()))
            .await;
        Err(err)
    }

    async fn set_status(
        &self,
        state: ServeState,
        public_hostname: Option<String>,
        last_error: Option<String>,
    ) {
        let mut st = self.status.write().await;
        st.state = state;
        st.public_hostname = public_hostname;
        st.last_error = last_error;
    }
}

async fn shutdown_session(session: ActiveSession) {
    session.cancel.cancel();
    if let Err(e) = session.forward_task.await {
        warn!(error = %e, "forwarding task did not exit cleanly");
    }
    session.node.close().await;
}
