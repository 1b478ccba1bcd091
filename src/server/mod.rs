use crate::config::Config;
use crate::events::EventBus;
use crate::player::SharedPlayback;
use crate::runtime::ShimRegistry;
use crate::vfs::VfsHandle;
use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod routes_content;
pub mod routes_player;
pub mod routes_runtime;
pub mod routes_sse;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    /// Handle to the virtual file server actor
    pub vfs: VfsHandle,
    /// Runtime shim answering the bridge
    pub shims: Arc<ShimRegistry>,
    pub events: EventBus,
    /// Player state, read by the player page
    pub playback: SharedPlayback,
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .merge(routes_content::content_routes())
        .merge(routes_runtime::runtime_routes())
        .merge(routes_player::player_routes())
        .merge(routes_sse::sse_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// A server running in the background.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Origin the rendering context loads the player from.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting requests and wait for in-flight ones.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.cancel();
        self.task.await.context("Server task panicked")??;
        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

async fn bind(host: &str, port: u16) -> Result<tokio::net::TcpListener> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid server address")?;
    tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))
}

/// Start the HTTP server in the background.
///
/// Port 0 picks a free port; see [`ServerHandle::local_addr`].
pub async fn spawn_server(ctx: AppContext, host: &str, port: u16) -> Result<ServerHandle> {
    let listener = bind(host, port).await?;
    let addr = listener.local_addr()?;
    let app = create_router(ctx);
    let shutdown = CancellationToken::new();

    let stop = shutdown.clone();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await
    });

    tracing::info!("Server listening on {}", addr);
    Ok(ServerHandle {
        addr,
        shutdown,
        task,
    })
}

/// Run the HTTP server until `shutdown` completes.
pub async fn serve(
    ctx: AppContext,
    host: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = bind(host, port).await?;
    tracing::info!("Starting server on {}", listener.local_addr()?);

    axum::serve(listener, create_router(ctx))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Completes on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
