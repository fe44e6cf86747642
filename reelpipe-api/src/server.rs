//! Relay lifecycle: bind, serve in the background, shut down gracefully.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use reelpipe_core::{Config, PlaybackSession};
use reelpipe_proxy::{ProxyBase, UpstreamClient};

use crate::http::{create_router, AppState};

/// A running relay bound to one local port.
///
/// Binding happens before the serve task is spawned, so the effective port
/// (the OS picks one when the configured port is 0) is known as soon as
/// `start` returns and can be baked into every proxy URL. The lifecycle is
/// one-way: started, then shut down; a fresh playback means a fresh relay.
pub struct RelayServer {
    local_addr: SocketAddr,
    session: Arc<PlaybackSession>,
    shutdown_tx: Option<watch::Sender<bool>>,
    serve_task: Option<JoinHandle<()>>,
}

impl RelayServer {
    /// Bind the configured address and start serving in a background task.
    pub async fn start(config: &Config) -> Result<Self> {
        Self::start_with_session(config, Arc::new(PlaybackSession::new())).await
    }

    /// Like [`start`](Self::start), sharing a caller-owned session so the
    /// CLI can await playback signals without holding the server.
    pub async fn start_with_session(
        config: &Config,
        session: Arc<PlaybackSession>,
    ) -> Result<Self> {
        let bind_addr = config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind relay address {bind_addr}"))?;
        let local_addr = listener
            .local_addr()
            .context("relay listener has no local address")?;

        let upstream =
            UpstreamClient::new(config.upstream.clone()).context("failed to build HTTP client")?;
        let state = AppState {
            upstream,
            base: ProxyBase::from_addr(local_addr),
            relay: config.relay.clone(),
            session: Arc::clone(&session),
        };
        let router = create_router(state);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let serve_task = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                // Fires on an explicit shutdown send or when the sender is
                // dropped with the relay handle.
                let _ = shutdown_rx.changed().await;
            });
            if let Err(e) = serve.await {
                error!("relay server error: {e}");
            }
        });

        info!("relay listening on http://{local_addr}");

        Ok(Self {
            local_addr,
            session,
            shutdown_tx: Some(shutdown_tx),
            serve_task: Some(serve_task),
        })
    }

    /// Effective bound address, port included.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base for minting proxy URLs that point back at this relay.
    #[must_use]
    pub fn base(&self) -> ProxyBase {
        ProxyBase::from_addr(self.local_addr)
    }

    /// The playback session served by this relay.
    #[must_use]
    pub fn session(&self) -> Arc<PlaybackSession> {
        Arc::clone(&self.session)
    }

    /// Stop accepting connections and wait for the serve task to finish.
    /// Idempotent; repeat calls return immediately.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.serve_task.take() {
            if let Err(e) = task.await {
                error!("relay serve task failed: {e}");
            }
        }
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        // Dropping the sender ends the serve task even without an explicit
        // shutdown call.
        self.shutdown_tx.take();
    }
}
