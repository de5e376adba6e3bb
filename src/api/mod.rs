//! REST API server.
//!
//! Provides HTTP endpoints for:
//! - Call-platform webhook ingestion (POST /webhook)
//! - Agent management
//! - Meeting management
//! - Service info

pub mod error;
pub mod routes;

use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tracing::info;

pub use routes::ApiState;

/// Build the full application router. Exposed separately so integration
/// tests can drive it without binding a socket.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/version", get(version))
        .merge(routes::webhook::router(state.clone()))
        .merge(routes::agents::router(state.clone()))
        .merge(routes::meetings::router(state))
}

pub struct ApiServer {
    bind: String,
    port: u16,
    state: ApiState,
}

impl ApiServer {
    pub fn new(bind: &str, port: u16, state: ApiState) -> Self {
        Self {
            bind: bind.to_string(),
            port,
            state,
        }
    }

    pub async fn start(self) -> Result<()> {
        let app = build_router(self.state);

        let listener =
            tokio::net::TcpListener::bind(&format!("{}:{}", self.bind, self.port)).await?;

        info!("API server listening on http://{}:{}", self.bind, self.port);
        info!("Endpoints:");
        info!("  GET  /                    - Service info");
        info!("  GET  /version             - Version info");
        info!("  POST /webhook             - Call platform events");
        info!("  POST /agents              - Create agent");
        info!("  GET  /agents?owner=       - List agents");
        info!("  GET  /agents/:id          - Get agent");
        info!("  PATCH /agents/:id         - Update agent instructions");
        info!("  DELETE /agents/:id?owner= - Delete agent");
        info!("  POST /meetings            - Create meeting");
        info!("  GET  /meetings?owner=     - List meetings");
        info!("  GET  /meetings/:id        - Get meeting");
        info!("  POST /meetings/:id/cancel - Cancel an upcoming meeting");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "colloquy",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "colloquy"
    }))
}
