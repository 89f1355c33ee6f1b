//! HTTP surface for the question-answering pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/query` | Answer a question (`{"question": "...", "domain_id": 3}`) |
//! | `POST` | `/api/validate` | Run the SQL guardrail on a statement (`{"sql": "..."}`) |
//! | `POST` | `/api/index/sync` | Re-index the schema if it changed |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! `POST /api/query` answers 200 with the result record on success and 500
//! with the same record (carrying `error` instead of `answer`) when every
//! attempt failed. Requests rejected before processing use:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be blank" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::guardrail::ValidationOutcome;
use crate::orchestrator::{EngineError, Orchestrator};
use crate::retrieval::ReindexOutcome;

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

/// Start the server on `[server].bind`, syncing the schema index first when
/// `retrieval.sync_on_startup` is set.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let orchestrator = Arc::new(Orchestrator::from_config(config).await?);

    if config.retrieval.sync_on_startup {
        if config.embedding.is_enabled() {
            match orchestrator.retrieval().reindex_if_stale().await {
                Ok(outcome) => tracing::info!(?outcome, "startup index sync"),
                Err(e) => tracing::warn!(error = %e, "startup index sync failed"),
            }
        } else {
            tracing::info!("embeddings disabled, skipping startup index sync");
        }
    }

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("nlsql server listening on http://{}", config.server.bind);
    axum::serve(listener, router(orchestrator)).await?;

    Ok(())
}

/// Build the router. Exposed so tests can serve it on an ephemeral port.
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/query", post(handle_query))
        .route("/api/validate", post(handle_validate))
        .route("/api/index/sync", post(handle_index_sync))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { orchestrator })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/query ============

/// Domain identifiers arrive as numbers from some clients and strings from others.
#[derive(Deserialize)]
#[serde(untagged)]
enum DomainId {
    Number(i64),
    Text(String),
}

impl DomainId {
    fn into_string(self) -> String {
        match self {
            DomainId::Number(n) => n.to_string(),
            DomainId::Text(s) => s,
        }
    }
}

#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default)]
    question: String,
    #[serde(default, alias = "domainId")]
    domain_id: Option<DomainId>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Response, AppError> {
    let domain = request.domain_id.map(DomainId::into_string);

    let result = state
        .orchestrator
        .process(&request.question, domain.as_deref())
        .await
        .map_err(|e| match e {
            EngineError::BlankQuestion => bad_request(e.to_string()),
        })?;

    let status = if result.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(result)).into_response())
}

// ============ POST /api/validate ============

#[derive(Deserialize)]
struct ValidateRequest {
    sql: String,
}

#[derive(Serialize)]
struct ValidateResponse {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn handle_validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Json<ValidateResponse> {
    let response = match state.orchestrator.guardrail().validate(&request.sql) {
        ValidationOutcome::Accepted(sql) => ValidateResponse {
            valid: true,
            sql: Some(sql.into_string()),
            error: None,
        },
        ValidationOutcome::Rejected(reason) => ValidateResponse {
            valid: false,
            sql: None,
            error: Some(reason.to_string()),
        },
    };
    Json(response)
}

// ============ POST /api/index/sync ============

async fn handle_index_sync(
    State(state): State<AppState>,
) -> Result<Json<ReindexOutcome>, AppError> {
    state
        .orchestrator
        .retrieval()
        .reindex_if_stale()
        .await
        .map(Json)
        .map_err(|e| internal(format!("index sync failed: {}", e)))
}
