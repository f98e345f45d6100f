//! TCP listener and acceptor loop

use super::registry::SessionRegistry;
use super::relay::{run_relay, RelayContext};
use crate::config::ServerConfig;
use crate::history::HistoryRecorder;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Pause after the process runs out of file descriptors
const EXHAUSTION_BACKOFF: Duration = Duration::from_millis(100);

const EBADF: i32 = 9;
const ENFILE: i32 = 23;
const EMFILE: i32 = 24;

/// Acceptor-level errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Listener failed: {0}")]
    Accept(#[source] io::Error),
}

/// Relay server accepting chat connections
pub struct RelayServer {
    listener: TcpListener,
    context: RelayContext,
}

impl RelayServer {
    /// Bind the configured address
    pub async fn bind(
        config: ServerConfig,
        history: Option<HistoryRecorder>,
    ) -> Result<Self, ServerError> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;

        Ok(Self::from_listener(listener, config, history))
    }

    /// Serve on an already-bound listener
    pub fn from_listener(
        listener: TcpListener,
        config: ServerConfig,
        history: Option<HistoryRecorder>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        Self {
            listener,
            context: RelayContext::new(registry, history, config),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared session table, for diagnostics
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.context.registry)
    }

    /// Accept connections until a shutdown signal arrives
    ///
    /// Relays already running are left to finish on their own.
    pub async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<(), ServerError> {
        let RelayServer { listener, context } = self;

        match listener.local_addr() {
            Ok(addr) => tracing::info!("Server listening on {}", addr),
            Err(e) => tracing::warn!("Server listening on unknown address: {}", e),
        }

        let result = loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutdown signal received");
                    break Ok(());
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => spawn_relay(stream, addr, &context),
                        Err(e) if is_fatal_accept_error(&e) => {
                            tracing::error!("Listener is no longer usable: {}", e);
                            break Err(ServerError::Accept(e));
                        }
                        Err(e) => {
                            tracing::warn!("Failed to accept connection: {}", e);
                            if is_resource_exhaustion(&e) {
                                tokio::time::sleep(EXHAUSTION_BACKOFF).await;
                            }
                        }
                    }
                }
            }
        };

        drop(listener);
        cleanup(&context).await;

        result
    }

    /// Run until Ctrl-C is pressed
    pub async fn run_until_ctrl_c(self) -> Result<(), ServerError> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to install Ctrl-C handler: {}", e);
                // Keep the sender alive so the server is not shut down by accident
                std::future::pending::<()>().await;
            }
            let _ = shutdown_tx.send(()).await;
        });

        self.run(shutdown_rx).await
    }
}

/// Flush history once the acceptor stops
async fn cleanup(context: &RelayContext) {
    tracing::info!("Cleaning up server resources");

    if let Some(history) = &context.history {
        history.shutdown().await;
        let dropped = history.dropped();
        if dropped > 0 {
            tracing::warn!("{} history records were dropped", dropped);
        }
    }
}

fn spawn_relay(stream: TcpStream, addr: SocketAddr, context: &RelayContext) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
    }

    let (reader, writer) = stream.into_split();
    let context = context.clone();

    tokio::spawn(async move {
        if let Err(e) = run_relay(reader, writer, addr.to_string(), context).await {
            tracing::error!("Relay error for {}: {}", addr, e);
        }
    });
}

/// Errors meaning the listening socket itself is gone
fn is_fatal_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::InvalidInput | io::ErrorKind::NotConnected | io::ErrorKind::Unsupported
    ) || e.raw_os_error() == Some(EBADF)
}

fn is_resource_exhaustion(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(ENFILE) | Some(EMFILE))
}
