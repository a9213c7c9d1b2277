use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fibpool::api::parse_duration;
use fibpool::config::{ApiConfig, PoolConfig, ServerConfig};
use fibpool::kernel::{Fibonacci, FIBONACCI_MAX_INPUT};
use fibpool::server::Server;
use fibpool::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "fibpool")]
#[command(version)]
#[command(about = "Elastic worker pool serving Fibonacci jobs over HTTP")]
struct Args {
    /// Address for the HTTP API
    #[arg(long, env = "FIBPOOL_LISTEN", default_value = "0.0.0.0:8081")]
    listen: SocketAddr,

    /// Maximum number of concurrent workers
    #[arg(long, env = "FIBPOOL_MAX_WORKERS", default_value = "4")]
    max_workers: usize,

    /// Workers started with the pool (defaults to --max-workers)
    #[arg(long, env = "FIBPOOL_INITIAL_WORKERS")]
    initial_workers: Option<usize>,

    /// Capacity of the inbound job queue
    #[arg(long, env = "FIBPOOL_QUEUE_SIZE", default_value = "20")]
    queue_size: usize,

    /// How long a submission may wait for queue room, e.g. "500ms".
    /// Omit or pass "0" to reject immediately when the queue is full.
    #[arg(long, env = "FIBPOOL_ENQUEUE_TIMEOUT", value_parser = parse_duration)]
    enqueue_timeout: Option<Duration>,

    /// Upper bound on a single kernel run, e.g. "30s"
    #[arg(long, env = "FIBPOOL_JOB_TIMEOUT", value_parser = parse_duration)]
    job_timeout: Option<Duration>,

    /// Job records kept for inspection through the API
    #[arg(long, env = "FIBPOOL_LEDGER_CAPACITY", default_value = "10000")]
    ledger_capacity: usize,

    /// Largest accepted job value
    #[arg(long, env = "FIBPOOL_MAX_VALUE", default_value_t = FIBONACCI_MAX_INPUT)]
    max_value: u64,

    /// Longest accepted job delay, e.g. "10m"
    #[arg(long, env = "FIBPOOL_MAX_DELAY", default_value = "1h", value_parser = parse_duration)]
    max_delay: Duration,

    /// Time allowed for draining on shutdown
    #[arg(long, env = "FIBPOOL_SHUTDOWN_GRACE", default_value = "5s", value_parser = parse_duration)]
    shutdown_grace: Duration,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let mut pool = PoolConfig::new(self.max_workers, self.queue_size)
            .with_ledger_capacity(self.ledger_capacity);
        if let Some(initial) = self.initial_workers {
            pool = pool.with_initial_workers(initial);
        }
        pool.job_timeout = self.job_timeout.filter(|d| !d.is_zero());

        ServerConfig {
            pool,
            api: ApiConfig {
                listen_addr: self.listen,
                enqueue_timeout: self.enqueue_timeout.filter(|d| !d.is_zero()),
                max_value: self.max_value.min(FIBONACCI_MAX_INPUT),
                max_delay: self.max_delay,
                ..ApiConfig::default()
            },
            shutdown_grace: self.shutdown_grace,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config();

    tracing::info!(
        listen_addr = %config.api.listen_addr,
        max_workers = config.pool.max_workers,
        initial_workers = config.pool.effective_initial_workers(),
        queue_capacity = config.pool.queue_capacity,
        enqueue_timeout = ?config.api.enqueue_timeout,
        job_timeout = ?config.pool.job_timeout,
        "Starting fibpool"
    );

    let shutdown = install_shutdown_handler();
    let server = Server::new(config, Arc::new(Fibonacci::new()));
    server.run(shutdown).await?;

    tracing::info!("fibpool stopped");
    Ok(())
}
