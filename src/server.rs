//! MCP-compatible HTTP server.
//!
//! Exposes the tool surface over a JSON HTTP API suitable for
//! integration with Cursor, Claude, and other MCP-compatible AI tools.
//! The wire-level MCP transport itself is out of scope; this is a
//! plain Axum JSON surface wired to the same [`Tool`] implementations
//! a real transport would dispatch to.
//!
//! # Endpoints
//!
//! | Method | Path               | Description                              |
//! |--------|--------------------|-------------------------------------------|
//! | `GET`  | `/tools/list`      | Enumerate registered tools and schemas    |
//! | `POST` | `/tools/{name}`    | Invoke a tool by name                     |
//! | `GET`  | `/health`          | Health check (returns version)            |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `unknown_tool` (404),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients and cross-origin MCP tool calls.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::context::Context;
use crate::traits::{ToolContext, ToolRegistry};

/// Shared application state passed to all route handlers via Axum's
/// `State` extractor.
#[derive(Clone)]
struct AppState {
    context: Arc<Context>,
    registry: Arc<ToolRegistry>,
}

/// Starts the tool-surface HTTP server.
///
/// Binds to the address configured in `[server].bind`, builds a
/// [`Context`] and the eight built-in tools, and serves indefinitely
/// until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let context = Arc::new(Context::build(config.clone()).await?);
    let registry = Arc::new(ToolRegistry::with_builtins());
    let state = AppState { context, registry };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/tools/list", get(handle_list))
        .route("/tools/{name}", post(handle_invoke))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!(%bind_addr, "tool surface listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn unknown_tool(name: &str) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "unknown_tool".to_string(),
        message: format!("no tool named '{name}'"),
    }
}

fn internal_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Maps a tool handler's error to an HTTP status/code, distinguishing
/// "not found" results (validation-adjacent, never retried) from
/// everything else.
fn classify_tool_error(err: anyhow::Error) -> AppError {
    let msg = err.to_string();
    if msg.starts_with("not found") || msg.contains("no document matches") || msg.contains("no category matches") {
        not_found(msg)
    } else if msg.contains("must not be empty") {
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request".to_string(),
            message: msg,
        }
    } else {
        internal_error(msg)
    }
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolSummary {
    name: String,
    description: String,
    builtin: bool,
    parameters: Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolSummary>,
}

async fn handle_list(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .registry
        .tools()
        .iter()
        .map(|t| ToolSummary {
            name: t.name().to_string(),
            description: t.description().to_string(),
            builtin: t.is_builtin(),
            parameters: t.parameters_schema(),
        })
        .collect();
    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

async fn handle_invoke(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<Value>>,
) -> Result<Json<Value>, AppError> {
    let tool = state.registry.find(&name).ok_or_else(|| unknown_tool(&name))?;
    let params = body.map(|Json(v)| v).unwrap_or_else(|| Value::Object(Default::default()));
    let tool_ctx = ToolContext::new(state.context.clone());

    let result = tool
        .execute(params, &tool_ctx)
        .await
        .map_err(classify_tool_error)?;

    Ok(Json(serde_json::json!({ "result": result })))
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
