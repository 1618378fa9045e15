//! `GET /health` over axum.

use std::net::SocketAddr;

use axum::{Json, Router, routing::get};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const HEALTH_MESSAGE: &str = "Flask API endpoint is working ✅";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub message: String,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self { status: "ok".into(), message: HEALTH_MESSAGE.into() }
    }
}

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("could not bind health endpoint to {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("health endpoint stopped")]
    Serve(#[source] std::io::Error),
}

async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus::default())
}

pub fn router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// A bound, not yet serving, health endpoint.
pub struct HealthServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl HealthServer {
    pub async fn bind(addr: SocketAddr) -> Result<Self, HealthError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| HealthError::Bind { addr, source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| HealthError::Bind { addr, source })?;
        Ok(Self { listener, addr })
    }

    /// The bound address, with the real port when bound to port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until `shutdown` fires.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), HealthError> {
        info!(addr = %self.addr, "health endpoint listening");
        axum::serve(self.listener, router())
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(HealthError::Serve)
    }
}
