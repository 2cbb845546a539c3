//! Prism server library.
//!
//! Provides a reusable serve function for the binary and for integration
//! tests: router assembly, the auth passthrough layer, CORS, and graceful
//! shutdown.

#![deny(missing_docs)]

mod auth;

use std::net::SocketAddr;

use axum::{Router, middleware, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

/// Configuration for serving Prism.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to.
    pub listen_address: SocketAddr,
    /// The resolved Prism configuration.
    pub config: config::Config,
    /// Cancellation token for graceful shutdown.
    pub shutdown_signal: CancellationToken,
    /// The version string to log on startup.
    pub version: String,
    /// Optional oneshot sender to send back the bound address (useful if
    /// port 0 was specified).
    pub bound_addr_sender: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
}

/// Starts and runs the Prism server with the provided configuration.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        version,
        bound_addr_sender,
    }: ServeConfig,
) -> anyhow::Result<()> {
    log::info!("Prism {version}");

    let mut app = Router::new()
        .merge(llm::router(&config)?)
        .route("/health", get(health))
        .layer(middleware::from_fn(auth::authenticate));

    if config.server.cors {
        log::debug!("Attaching permissive CORS layer");
        app = app.layer(CorsLayer::permissive());
    }

    let listener = TcpListener::bind(listen_address).await?;
    let bound_addr = listener.local_addr()?;

    if let Some(sender) = bound_addr_sender {
        let _ = sender.send(bound_addr);
    }

    log::info!("Listening on {bound_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal.cancelled().await;
            log::info!("Shutdown signal received, draining connections");
        })
        .await?;

    Ok(())
}

async fn health() -> &'static str {
    "OK"
}
