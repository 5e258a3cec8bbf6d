//! HTTP servers: record ingress plus health and metrics endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, routing::post, Json, Router};
use e2p_core::config::RecordVariant;
use e2p_core::engine::Receiver;
use e2p_core::health::{ComponentHealth, ComponentState, HealthStatus};
use e2p_core::record::Record;
use e2p_core::{BufferError, Error};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Shared state for HTTP endpoints.
pub struct ServerState {
    pub receiver: Receiver,
    pub variant: RecordVariant,
}

/// Health response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: std::collections::HashMap<String, ComponentResponse>,
}

/// Component status response.
#[derive(Debug, Serialize)]
pub struct ComponentResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&ComponentHealth> for ComponentResponse {
    fn from(health: &ComponentHealth) -> Self {
        let status = match health.state {
            ComponentState::Healthy => "healthy",
            ComponentState::Degraded => "degraded",
            ComponentState::Unhealthy => "unhealthy",
            ComponentState::Unknown => "unknown",
        };
        ComponentResponse {
            status: status.to_string(),
            message: health.detail.clone(),
        }
    }
}

/// Ingest response structure.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub rejected: Vec<RejectedRecord>,
}

/// One rejected input record.
#[derive(Debug, Serialize)]
pub struct RejectedRecord {
    pub index: usize,
    pub error: String,
}

/// Start the ingress and health/metrics servers.
pub async fn start_server(
    state: Arc<ServerState>,
    ingest_port: u16,
    health_port: u16,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let ingest_state = Arc::clone(&state);
    let ingest_addr = SocketAddr::from(([0, 0, 0, 0], ingest_port));
    let ingest_router = Router::new()
        .route("/records", post(ingest_handler))
        .with_state(ingest_state);

    let ingest_listener = match tokio::net::TcpListener::bind(ingest_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, port = ingest_port, "Failed to bind ingest server");
            return;
        }
    };

    info!(port = ingest_port, "Ingest server started");

    let health_state = Arc::clone(&state);
    let health_addr = SocketAddr::from(([0, 0, 0, 0], health_port));
    let health_router = Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(health_state);

    let health_listener = match tokio::net::TcpListener::bind(health_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, port = health_port, "Failed to bind health server");
            return;
        }
    };

    info!(port = health_port, "Health server started");

    let ingest_server = async {
        axum::serve(ingest_listener, ingest_router)
            .await
            .map_err(|e| error!(error = %e, "Ingest server error"))
    };

    let health_server = async {
        axum::serve(health_listener, health_router)
            .await
            .map_err(|e| error!(error = %e, "Health server error"))
    };

    tokio::select! {
        _ = ingest_server => {}
        _ = health_server => {}
        _ = shutdown_rx.recv() => {
            info!("HTTP servers shutting down");
        }
    }
}

/// Split an ingest body into record maps: a single JSON object or an array
/// of objects.
fn record_maps(body: Value) -> Result<Vec<serde_json::Map<String, Value>>, String> {
    match body {
        Value::Object(map) => Ok(vec![map]),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => Ok(map),
                other => Err(format!("element {} is not an object, got {}", i, other)),
            })
            .collect(),
        other => Err(format!("body must be an object or array, got {}", other)),
    }
}

/// Record ingress handler.
async fn ingest_handler(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let maps = match record_maps(body) {
        Ok(maps) => maps,
        Err(message) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(IngestResponse {
                    accepted: 0,
                    rejected: vec![RejectedRecord {
                        index: 0,
                        error: message,
                    }],
                }),
            )
        }
    };

    let total = maps.len();
    let mut accepted = 0;
    let mut rejected = Vec::new();
    let mut unavailable = false;

    for (index, map) in maps.into_iter().enumerate() {
        let record = match Record::new(state.variant, map) {
            Ok(record) => record,
            Err(e) => {
                state.receiver.metrics().record_decode_error();
                rejected.push(RejectedRecord {
                    index,
                    error: e.to_string(),
                });
                continue;
            }
        };

        match state.receiver.write(record).await {
            Ok(()) => accepted += 1,
            Err(e) => {
                if matches!(e, Error::Buffer(BufferError::Unavailable(_))) {
                    unavailable = true;
                }
                rejected.push(RejectedRecord {
                    index,
                    error: e.to_string(),
                });
            }
        }
    }

    let status = if unavailable {
        StatusCode::SERVICE_UNAVAILABLE
    } else if accepted == 0 && total > 0 {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };

    (status, Json(IngestResponse { accepted, rejected }))
}

/// Health endpoint handler.
async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let health = state.receiver.health();
    let overall = health.overall();

    let components: std::collections::HashMap<String, ComponentResponse> = health
        .components()
        .iter()
        .map(|(k, v)| (k.clone(), ComponentResponse::from(v)))
        .collect();

    let status_str = match overall {
        HealthStatus::Healthy => "healthy",
        HealthStatus::Degraded => "degraded",
        HealthStatus::Unhealthy => "unhealthy",
    };

    let status_code = match overall {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        status_code,
        Json(HealthResponse {
            status: status_str.to_string(),
            components,
        }),
    )
}

/// Kubernetes liveness probe handler.
async fn healthz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.receiver.health().overall() != HealthStatus::Unhealthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Kubernetes readiness probe handler.
async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.receiver.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus metrics endpoint handler.
async fn metrics_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.receiver.metrics().render_prometheus(),
    )
}
