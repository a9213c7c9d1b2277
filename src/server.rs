use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{self, ApiState};
use crate::config::ServerConfig;
use crate::kernel::Kernel;
use crate::pool::WorkerPool;

/// Process-level wiring: one pool plus the HTTP API in front of it.
pub struct Server {
    pub config: ServerConfig,
    pub pool: Arc<WorkerPool>,
}

impl Server {
    pub fn new(config: ServerConfig, kernel: Arc<dyn Kernel>) -> Self {
        let pool = Arc::new(WorkerPool::new(config.pool.clone(), kernel));
        Self { config, pool }
    }

    /// Run until `shutdown` fires.
    ///
    /// 1. Starts the workers and dispatcher
    /// 2. Serves the HTTP API (blocking) until the token is cancelled
    /// 3. Drains the pool within the configured grace period
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot start or the listener cannot bind.
    /// The pool is still shut down when the API fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), Box<dyn std::error::Error>> {
        self.pool.run().await?;

        let state = ApiState {
            pool: Arc::clone(&self.pool),
            config: self.config.api.clone(),
        };
        let served = api::serve(self.config.api.listen_addr, state, shutdown.clone()).await;
        if let Err(e) = &served {
            tracing::error!(error = %e, "HTTP API failed");
        }

        self.pool.shutdown(self.config.shutdown_grace).await;
        served?;
        Ok(())
    }
}
