pub mod router;

pub use router::{parse_broadcast_request, router, AppState, BroadcastRequest};

use crate::{BroadcastError, Result};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

/// HTTP front end for the broadcaster
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Bind `addr` and serve until `shutdown` resolves
    pub async fn run<F>(self, addr: SocketAddr, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BroadcastError::ServerError(format!("Failed to bind to {}: {}", addr, e)))?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    ///
    /// Once `shutdown` resolves, new connections are refused and in-flight
    /// background broadcasts are awaited before returning.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Server running on {}", listener.local_addr()?);

        axum::serve(listener, router(self.state.clone()))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| BroadcastError::ServerError(format!("Server error: {}", e)))?;

        let tasks = self.state.tasks();
        tasks.close();
        if !tasks.is_empty() {
            info!("Waiting for {} background broadcasts to finish", tasks.len());
        }
        tasks.wait().await;

        info!("Server stopped");
        Ok(())
    }
}
