//! Control HTTP server

use std::{net::SocketAddr, time::Duration};

use axum::{
    Router,
    routing::{get, post},
};
use courier_common::{Signal, tracing};
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;

use crate::{
    ControlConfig, ControlError,
    handlers::{self, ControlState},
};

/// Build the control router
///
/// Exposed separately from [`ControlServer`] so the routes can be exercised
/// without binding a socket.
pub fn router(state: ControlState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/api/messaging/start", post(handlers::start_processing))
        .route("/api/messaging/stop", post(handlers::stop_processing))
        .route("/api/messaging/status", get(handlers::processing_status))
        .route("/api/messaging/process", post(handlers::process_now))
        .route("/api/messages/sent", get(handlers::sent_messages))
        .route("/health", get(handlers::health))
        .route("/version", get(handlers::version))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
}

/// Control HTTP server
///
/// Serves the messaging start/stop/status/process routes, the sent-message
/// listing, and `/health` plus `/version`.
pub struct ControlServer {
    listener: TcpListener,
    router: Router,
}

impl ControlServer {
    /// Bind the control server
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the specified address fails.
    pub async fn new(config: &ControlConfig, state: ControlState) -> Result<Self, ControlError> {
        let listener = TcpListener::bind(&config.listen_address)
            .await
            .map_err(|e| ControlError::BindError {
                address: config.listen_address.clone(),
                source: e,
            })?;

        tracing::info!(
            address = %config.listen_address,
            "Control server bound successfully"
        );

        Ok(Self {
            listener,
            router: router(state, config.request_timeout()),
        })
    }

    /// The address actually bound, useful when listening on port 0
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, ControlError> {
        self.listener
            .local_addr()
            .map_err(|e| ControlError::ServerError(e.to_string()))
    }

    /// Run the control server until a shutdown signal is received
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a runtime error.
    pub async fn serve(
        self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), ControlError> {
        tracing::info!("Control server starting");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Control server received shutdown signal");
            })
            .await
            .map_err(|e| ControlError::ServerError(e.to_string()))?;

        tracing::info!("Control server stopped");
        Ok(())
    }
}
