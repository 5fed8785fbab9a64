//! REST boundary for function execution.
//!
//! Serves `{context}/v1/functions` under every configured URL context and maps
//! dispatch outcomes onto HTTP statuses: a completed dispatch is 200 with the
//! values returned by the members, invalid targeting is 500.

use crate::core::GridError;
use crate::dispatch::{ExecutionRequest, MemberDispatcher};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum WebError {
    Grid(GridError),
    Input(String),
    NotFound(String),
    Internal(String),
}

impl From<GridError> for WebError {
    fn from(err: GridError) -> Self {
        WebError::Grid(err)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            WebError::Grid(err @ GridError::InvalidTargeting(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                "invalid_targeting".to_string(),
            ),
            WebError::Grid(err @ GridError::FunctionNotFound(_)) => {
                (StatusCode::NOT_FOUND, err.to_string(), "not_found".to_string())
            }
            WebError::Grid(err @ GridError::Cancelled(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                err.to_string(),
                "member_shutting_down".to_string(),
            ),
            WebError::Grid(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                "grid_error".to_string(),
            ),
            WebError::Input(msg) => (StatusCode::BAD_REQUEST, msg, "input_error".to_string()),
            WebError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "not_found".to_string()),
            WebError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                msg,
                "internal_error".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            code,
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;

/// Query parameters of a function execution request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteParams {
    pub on_members: Option<String>,
    pub filter: Option<String>,
}

/// Builds the REST router, mounting the API under each URL context.
pub fn router<S: AsRef<str>>(dispatcher: MemberDispatcher, url_contexts: &[S]) -> Router {
    let mut app = Router::new();
    for context in url_contexts {
        app = app.nest(&format!("{}/v1", context.as_ref()), api_routes());
    }
    app.layer(TraceLayer::new_for_http()).with_state(dispatcher)
}

fn api_routes() -> Router<MemberDispatcher> {
    Router::new()
        .route("/functions", get(list_functions))
        .route("/functions/:function_id", post(execute_function))
}

async fn list_functions(State(dispatcher): State<MemberDispatcher>) -> Result<Json<Vec<String>>> {
    Ok(Json(dispatcher.registered_functions().await?))
}

async fn execute_function(
    State(dispatcher): State<MemberDispatcher>,
    Path(function_id): Path<String>,
    Query(params): Query<ExecuteParams>,
    body: Bytes,
) -> Result<Response> {
    let arguments = parse_arguments(&body)?;
    let request = ExecutionRequest {
        function_id,
        arguments,
        filter: params.filter,
        on_members: params.on_members,
    };

    // Targeting is validated before anything else touches the cluster.
    request.target()?;

    let registered = dispatcher.registered_functions().await?;
    if !registered.iter().any(|id| id == &request.function_id) {
        return Err(GridError::FunctionNotFound(request.function_id).into());
    }

    let outcome = dispatcher.dispatch(request).await;
    if let Some(err) = outcome.error {
        return Err(err.into());
    }
    Ok((outcome.status, Json(outcome.aggregate.values())).into_response())
}

fn parse_arguments(body: &Bytes) -> Result<Option<Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|err| WebError::Input(format!("function arguments must be JSON: {}", err)))
}

/// Binds `addr` and serves the router until the task is cancelled.
pub async fn serve(addr: SocketAddr, app: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "function REST endpoint listening");
    axum::serve(listener, app).await
}
