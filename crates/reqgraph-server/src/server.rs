//! Server lifecycle.
//!
//! [`GraphServer`] runs the HTTP endpoint on its own thread (a dedicated
//! tokio runtime sized by `endpoint_threads`) and owns the worker pool that
//! carries every load and save. Shutdown is ordered: drain the pool, stop
//! the endpoint gracefully, join both.

use std::net::SocketAddr;
use std::thread::JoinHandle;

use crate::error::ServerError;
use crate::router::build_router;
use crate::state::AppState;

/// Configuration for [`GraphServer::start`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub endpoint_threads: usize,
    pub pool_threads: usize,
    pub db_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: "127.0.0.1".to_string(),
            port: 8080,
            endpoint_threads: 2,
            pool_threads: 2,
            db_path: "reqgraph.db".to_string(),
        }
    }
}

/// A running graph server.
pub struct GraphServer {
    state: AppState,
    local_addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    endpoint_thread: Option<JoinHandle<()>>,
}

impl GraphServer {
    /// Opens the database, starts the worker pool, binds the socket, and
    /// spawns the HTTP endpoint on an independent thread.
    pub fn start(config: ServerConfig) -> Result<GraphServer, ServerError> {
        let state = AppState::new(&config.db_path, config.pool_threads)?;
        let app = build_router(state.clone());

        // Bind synchronously so address errors surface to the caller
        // instead of dying inside the endpoint thread.
        let listener = std::net::TcpListener::bind((config.address.as_str(), config.port))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let endpoint_threads = config.endpoint_threads.max(1);
        let endpoint_thread = std::thread::Builder::new()
            .name("reqgraph-endpoint".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(endpoint_threads)
                    .enable_all()
                    .build();
                let runtime = match runtime {
                    Ok(rt) => rt,
                    Err(e) => {
                        tracing::error!("failed to build endpoint runtime: {e}");
                        return;
                    }
                };
                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(listener) {
                        Ok(l) => l,
                        Err(e) => {
                            tracing::error!("failed to adopt listen socket: {e}");
                            return;
                        }
                    };
                    let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    });
                    if let Err(e) = serve.await {
                        tracing::error!("endpoint exited with error: {e}");
                    }
                });
            })?;

        tracing::info!("graph server listening on {local_addr}");
        Ok(GraphServer {
            state,
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            endpoint_thread: Some(endpoint_thread),
        })
    }

    /// The bound address (useful when the configured port was 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Blocks until the endpoint thread exits.
    pub fn join(&mut self) {
        if let Some(thread) = self.endpoint_thread.take() {
            if thread.join().is_err() {
                tracing::error!("endpoint thread panicked");
            }
        }
    }

    /// Drains the worker pool, stops the endpoint, joins both. Idempotent.
    pub fn shutdown(&mut self) {
        self.state.pool.shutdown();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.join();
        self.state.pool.join();
    }
}

impl Drop for GraphServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
