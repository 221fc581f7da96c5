//! storm-server: assembles the Storm process.
//!
//! Resolves configuration, installs logging, starts the daemon connection
//! pool, and serves the REST API until a shutdown signal arrives. The pool is
//! drained before returning.
//!
//! The daemon client itself is supplied by the embedding binary:
//!
//! ```rust,ignore
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_args()?;
//!     storm_server::run(config, |settings: &DaemonSettings| DelugeClient::new(settings)).await
//! }
//! ```

pub mod config;
pub mod logging;

use std::future::Future;

use axum::Router;
use storm_api::{ApiState, Daemon};
use storm_pool::Pool;
use tokio::net::TcpListener;
use tracing::{error, info};

pub use config::{ConfigError, DaemonSettings, Options, RpcVersion, ServerConfig};
pub use logging::LogStyle;

/// Mount the API router under `base_path`.
pub fn app(api: Router, base_path: &str) -> Router {
    if base_path == "/" {
        return api;
    }
    Router::new()
        .nest(base_path, api)
        .fallback(storm_api::not_found)
}

/// Initialise logging, bind the configured address, and serve until Ctrl-C
/// or SIGTERM.
pub async fn run<D, F>(config: ServerConfig, connect: F) -> anyhow::Result<()>
where
    D: Daemon,
    F: FnMut(&DaemonSettings) -> D + Send + 'static,
{
    logging::init(config.log_style);
    info!(
        listen = %config.listen,
        daemon = %format_args!("{}:{}", config.daemon.hostname, config.daemon.port),
        max_connections = config.pool.max_connections,
        "storm starting"
    );

    let listener = TcpListener::bind(config.listen).await?;
    serve(listener, &config, connect, shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves, then close
/// the pool.
pub async fn serve<D, F, S>(
    listener: TcpListener,
    config: &ServerConfig,
    mut connect: F,
    shutdown: S,
) -> anyhow::Result<()>
where
    D: Daemon,
    F: FnMut(&DaemonSettings) -> D + Send + 'static,
    S: Future<Output = ()> + Send + 'static,
{
    let settings = config.daemon.clone();
    let pool = Pool::new(config.pool.clone(), move || connect(&settings))?;
    let state = ApiState::new(pool.clone(), config.acquire_timeout);
    let router = app(storm_api::build_router(state), &config.base_path);

    let addr = listener.local_addr()?;
    info!(%addr, base_path = %config.base_path, "API server starting");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await;

    info!("closing daemon connections");
    pool.close().await;
    served?;

    info!("storm stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received");
}
