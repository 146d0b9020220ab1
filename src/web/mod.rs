//! HTTP front end: embedded UI plus the JSON API over the query pipeline.

pub mod handlers;
pub mod routes;
pub mod session;
pub mod state;
pub mod static_files;
pub mod templates;

use crate::config::WebConfig;
use axum::http::HeaderName;
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use state::AppState;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Full application router with middleware attached.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(session::SESSION_HEADER)]);

    Router::new()
        .merge(routes::ui_routes())
        .merge(routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

fn bind(config: &WebConfig) -> std::io::Result<tokio::net::TcpListener> {
    let addr: SocketAddr = (config.host.as_str(), config.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("Cannot resolve {}:{}", config.host, config.port),
            )
        })?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    tokio::net::TcpListener::from_std(socket.into())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

pub async fn run_server(
    config: WebConfig,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = bind(&config)?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
