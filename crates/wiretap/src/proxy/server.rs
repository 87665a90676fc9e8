//! Proxy server assembly and lifecycle.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;

use crate::admin;
use crate::config::Config;
use crate::error::{Result, WiretapError};
use crate::proxy::handler::handle_proxy;
use crate::storage::InteractionStore;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub client: reqwest::Client,
    pub store: InteractionStore,
}

/// The interceptor proxy server
pub struct ProxyServer {
    config: Config,
    store: InteractionStore,
}

impl ProxyServer {
    pub fn new(config: Config, store: InteractionStore) -> Self {
        Self { config, store }
    }

    /// Bind and serve until a shutdown signal arrives, then drain in-flight
    /// requests (bounded by the configured grace period) and flush the store.
    pub async fn serve(&self) -> Result<()> {
        let client = build_http_client(&self.config)?;

        let state = Arc::new(AppState {
            config: self.config.clone(),
            client,
            store: self.store.clone(),
        });

        let app = create_router(state);

        let addr: SocketAddr = self
            .config
            .listen_addr()
            .parse()
            .map_err(|e| WiretapError::Config(format!("Invalid listen address: {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WiretapError::Proxy(format!("Failed to bind to {addr}: {e}")))?;

        tracing::info!("Interceptor proxy listening on {addr}");
        tracing::info!("  OpenAI upstream:    {}", self.config.openai_url);
        tracing::info!("  Anthropic upstream: {}", self.config.anthropic_url);
        tracing::info!("  Ollama upstream:    {}", self.config.ollama_url);
        tracing::info!("  Database:           {}", self.config.db_path);

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        tokio::spawn(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        });

        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown({
            let mut rx = shutdown_rx.clone();
            async move {
                let _ = rx.wait_for(|fired| *fired).await;
            }
        })
        .into_future();

        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        let mut shutdown_rx = shutdown_rx;
        tokio::pin!(server);
        tokio::select! {
            result = &mut server => {
                result.map_err(|e| WiretapError::Proxy(format!("Server error: {e}")))?;
            }
            _ = async {
                let _ = shutdown_rx.wait_for(|fired| *fired).await;
                tokio::time::sleep(grace).await;
            } => {
                tracing::warn!(
                    "Shutdown grace period ({}s) elapsed with requests still in flight",
                    grace.as_secs()
                );
            }
        }

        // Make sure queued interaction writes reach disk before exit
        self.store.flush().await;
        tracing::info!("Proxy server shut down gracefully");
        Ok(())
    }
}

fn build_http_client(config: &Config) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .read_timeout(Duration::from_secs(config.read_timeout_secs));
    if let Some(cap) = config.request_timeout_secs {
        builder = builder.timeout(Duration::from_secs(cap));
    }
    builder
        .build()
        .map_err(|e| WiretapError::Proxy(format!("Failed to create HTTP client: {e}")))
}

/// Admin routes first, then everything else falls through to the proxy.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/_interceptor", admin::router())
        .fallback(handle_proxy)
        .with_state(state)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
