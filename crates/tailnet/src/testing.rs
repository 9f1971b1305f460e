//! In-memory backend doubles for exercising the exposure pipeline without a
//! real tailnet. Listeners are plain TCP sockets on loopback, so end-to-end
//! forwarding tests can drive the proxy with an ordinary HTTP client.

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tokio::net::TcpListener;

use crate::{
    backend::{JoinOptions, LocalNodeStatus, TailnetBackend, TailnetListener, TailnetNode,
        TailnetStream},
    error::TailnetError,
};

#[derive(Default)]
struct BackendState {
    dns_name: String,
    join_error: Mutex<Option<String>>,
    listen_error: Mutex<Option<String>>,
    hang_status: AtomicBool,
    joins: AtomicUsize,
    closed_nodes: AtomicUsize,
    live_listeners: Arc<AtomicUsize>,
    last_listener_addr: Mutex<Option<SocketAddr>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scriptable in-memory tailnet backend.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<BackendState>,
}

impl MemoryBackend {
    /// Backend whose node reports the given DNS name (trailing dot allowed,
    /// as real status output carries one).
    pub fn new(dns_name: &str) -> Self {
        Self {
            state: Arc::new(BackendState {
                dns_name: dns_name.to_string(),
                ..BackendState::default()
            }),
        }
    }

    /// Make `join` fail with the given message. Scripting goes through the
    /// shared state, so it applies to every clone of this backend.
    pub fn with_join_error(self, msg: &str) -> Self {
        *lock(&self.state.join_error) = Some(msg.to_string());
        self
    }

    /// Make `listen_tls` fail with the given message.
    pub fn with_listen_error(self, msg: &str) -> Self {
        *lock(&self.state.listen_error) = Some(msg.to_string());
        self
    }

    /// Make `local_status` hang forever, simulating an unreachable control
    /// interface.
    pub fn with_hung_status(self) -> Self {
        self.state.hang_status.store(true, Ordering::SeqCst);
        self
    }

    /// Number of currently bound listeners across all sessions.
    pub fn live_listeners(&self) -> usize {
        self.state.live_listeners.load(Ordering::SeqCst)
    }

    /// Number of successful joins.
    pub fn joins(&self) -> usize {
        self.state.joins.load(Ordering::SeqCst)
    }

    /// Number of nodes that have been closed.
    pub fn closed_nodes(&self) -> usize {
        self.state.closed_nodes.load(Ordering::SeqCst)
    }

    /// Loopback address of the most recently bound listener.
    pub fn last_listener_addr(&self) -> Option<SocketAddr> {
        *lock(&self.state.last_listener_addr)
    }
}

#[async_trait]
impl TailnetBackend for MemoryBackend {
    async fn join(&self, _opts: JoinOptions) -> Result<Box<dyn TailnetNode>, TailnetError> {
        if let Some(msg) = lock(&self.state.join_error).clone() {
            return Err(TailnetError::Join(msg));
        }
        self.state.joins.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryNode {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryNode {
    state: Arc<BackendState>,
}

#[async_trait]
impl TailnetNode for MemoryNode {
    async fn listen_tls(&self, _port: u16) -> Result<Box<dyn TailnetListener>, TailnetError> {
        if let Some(msg) = lock(&self.state.listen_error).clone() {
            return Err(TailnetError::Listen(msg));
        }
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| TailnetError::Listen(e.to_string()))?;
        if let Ok(addr) = listener.local_addr() {
            *lock(&self.state.last_listener_addr) = Some(addr);
        }
        self.state.live_listeners.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryListener {
            inner: listener,
            live: Arc::clone(&self.state.live_listeners),
        }))
    }

    async fn local_status(&self) -> Result<LocalNodeStatus, TailnetError> {
        if self.state.hang_status.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        Ok(LocalNodeStatus {
            self_dns_name: self.state.dns_name.clone(),
        })
    }

    async fn close(&self) {
        self.state.closed_nodes.fetch_add(1, Ordering::SeqCst);
    }
}

struct MemoryListener {
    inner: TcpListener,
    live: Arc<AtomicUsize>,
}

#[async_trait]
impl TailnetListener for MemoryListener {
    async fn accept(&mut self) -> io::Result<(Box<dyn TailnetStream>, SocketAddr)> {
        let (stream, addr) = self.inner.accept().await?;
        Ok((Box::new(stream), addr))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
