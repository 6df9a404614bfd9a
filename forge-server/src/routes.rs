//! HTTP route handlers.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use forge::controller::{Controller, new_run_id};
use forge::core::ui_schema::{UiValidation, validate};
use forge::io::durable::validate_id;
use forge::io::events::{FanoutSink, TracingSink};
use forge::io::run_log::RunPaths;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::sse;
use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorBody>);

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// The full application: `/api`, `/events` and CORS.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api_router())
        .route("/events/{run_id}", get(sse::events_handler))
        .layer(cors)
        .with_state(state)
}

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/projects/{id}/runs", post(start_run))
        .route("/projects/{id}/files", get(list_files))
        .route("/projects/{id}/files/{*path}", get(get_file))
        .route("/ui/validate", post(validate_ui))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct StartRunRequest {
    prompt: String,
}

#[derive(Debug, Serialize)]
struct RunStarted {
    run_id: String,
    project_id: String,
}

/// POST /api/projects/{id}/runs - start a run in the background.
async fn start_run(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(body): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<RunStarted>), ApiError> {
    validate_id("project", &project_id)
        .map_err(|err| api_error(StatusCode::BAD_REQUEST, err.to_string()))?;
    if body.prompt.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "prompt is empty"));
    }
    let guard = state
        .registry
        .try_begin(&project_id)
        .map_err(|err| api_error(StatusCode::CONFLICT, err.to_string()))?;

    let run_id = new_run_id();
    let service = (state.services)(&RunPaths::new(&state.root, &run_id));
    let sink = FanoutSink::new().with(TracingSink).with(state.sink());
    let controller = Controller::new(
        &state.config,
        state.root.clone(),
        service,
        Arc::clone(&state.durable),
        Arc::new(sink),
    )
    .map_err(|err| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")))?;

    let started = RunStarted {
        run_id: run_id.clone(),
        project_id: project_id.clone(),
    };
    tokio::task::spawn_blocking(move || {
        let _guard = guard;
        match controller.run_with_id(&run_id, &project_id, &body.prompt) {
            Ok(report) => info!(run_id = %run_id, outcome = ?report.outcome, "run finished"),
            Err(err) => warn!(run_id = %run_id, error = %format!("{err:#}"), "run failed"),
        }
    });

    Ok((StatusCode::ACCEPTED, Json(started)))
}

#[derive(Debug, Serialize)]
struct FilesResponse {
    project_id: String,
    files: Vec<String>,
}

/// GET /api/projects/{id}/files - every stored path of the project.
async fn list_files(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<FilesResponse>, ApiError> {
    validate_id("project", &project_id)
        .map_err(|err| api_error(StatusCode::BAD_REQUEST, err.to_string()))?;
    let files = state
        .durable
        .list(&state.config.store.owner, &project_id)
        .map_err(|err| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")))?;
    Ok(Json(FilesResponse { project_id, files }))
}

/// GET /api/projects/{id}/files/{*path} - one stored file as text.
async fn get_file(
    State(state): State<AppState>,
    Path((project_id, path)): Path<(String, String)>,
) -> Result<String, ApiError> {
    validate_id("project", &project_id)
        .map_err(|err| api_error(StatusCode::BAD_REQUEST, err.to_string()))?;
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(api_error(StatusCode::BAD_REQUEST, format!("invalid path {path:?}")));
    }
    state
        .durable
        .download(&state.config.store.owner, &project_id, &path)
        .map_err(|err| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")))?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("{path} not found")))
}

/// POST /api/ui/validate - run the D-HDC validator over a UI document.
async fn validate_ui(State(state): State<AppState>, Json(doc): Json<Value>) -> Json<UiValidation> {
    Json(validate(&doc, &state.catalog))
}
