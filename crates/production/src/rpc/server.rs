//! RPC server lifecycle.

use super::routes::create_router;
use super::state::RpcState;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use tokio::task::JoinHandle;
use tracing::info;

/// Configuration for the RPC server.
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub listen_addr: SocketAddr,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8545)),
        }
    }
}

/// The RPC server; serves until its handle is shut down.
pub struct RpcServer;

/// Handle to a running RPC server.
pub struct RpcServerHandle {
    /// The address actually bound (useful with port 0 in tests).
    pub local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl RpcServerHandle {
    /// Stop serving. In-flight requests are aborted.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

impl RpcServer {
    /// Bind and start serving. The ready flag flips once the listener is
    /// bound, so readiness probes pass only after requests can land.
    pub async fn start(
        config: RpcServerConfig,
        state: RpcState,
    ) -> Result<RpcServerHandle, std::io::Error> {
        let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        state.ready.store(true, Ordering::Relaxed);
        info!(%local_addr, "rpc server listening");

        let router = create_router(state);
        let task = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, router).await {
                tracing::error!(%error, "rpc server exited");
            }
        });

        Ok(RpcServerHandle { local_addr, task })
    }
}
