use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use lamp_core::RagService;
use lamp_llm::LlmProvider;
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::router::build_router;

pub(crate) struct AppState<P> {
    pub service: Arc<RagService<P>>,
    pub started_at: Instant,
}

// Manual impl: `P` itself need not be `Clone`.
impl<P> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            started_at: self.started_at,
        }
    }
}

pub struct GatewayServer<P> {
    addr: SocketAddr,
    auth_token: Option<String>,
    rate_limit: u32,
    max_body_size: usize,
    service: Arc<RagService<P>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<P: LlmProvider + 'static> GatewayServer<P> {
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidAddress`] if `bind:port` is not a socket address.
    pub fn new(
        bind: &str,
        port: u16,
        service: Arc<RagService<P>>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self, GatewayError> {
        let raw = format!("{bind}:{port}");
        let addr: SocketAddr = raw
            .parse()
            .map_err(|source| GatewayError::InvalidAddress { addr: raw, source })?;

        if addr.ip().is_unspecified() {
            tracing::warn!(%addr, "gateway listening on all interfaces");
        }

        Ok(Self {
            addr,
            auth_token: None,
            rate_limit: 120,
            max_body_size: 1_048_576,
            service,
            shutdown_rx,
        })
    }

    #[must_use]
    pub fn with_auth(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, limit: u32) -> Self {
        self.rate_limit = limit;
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Serve until the shutdown channel flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the server fails.
    pub async fn serve(self) -> Result<(), GatewayError> {
        let state = AppState {
            service: self.service,
            started_at: Instant::now(),
        };
        let router = build_router(state, self.auth_token, self.rate_limit, self.max_body_size);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: self.addr,
                source,
            })?;
        tracing::info!("gateway listening on {}", self.addr);

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            tracing::info!("gateway shutting down");
        })
        .await
        .map_err(GatewayError::Serve)
    }
}
