// HTTP surface
//
// GET /process-video runs a full build and returns the index record.
// GET /api/locate?t= resolves a hover time against the published record.
// Sprite and metadata folders are served as static files.

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::constants::{METADATA_URL_PREFIX, SPRITES_URL_PREFIX};
use crate::error::PreviewError;
use crate::jobs::{CancelOnDrop, PreviewJob};
use crate::preview::index::IndexRecord;
use crate::preview::lookup::{locate, HoverFrame};

/// Application state shared across routes.
#[derive(Clone)]
pub struct AppState {
    job: PreviewJob,
}

impl AppState {
    pub fn new(job: PreviewJob) -> Self {
        Self { job }
    }
}

/// Error body: `{ "success": false, "error": "..." }`.
#[derive(Debug)]
pub enum ApiError {
    Preview(PreviewError),
    NotFound(String),
    Internal(String),
}

impl From<PreviewError> for ApiError {
    fn from(err: PreviewError) -> Self {
        ApiError::Preview(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Preview(PreviewError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Preview(PreviewError::Busy(_)) => StatusCode::CONFLICT,
            ApiError::Preview(PreviewError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Preview(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Preview(e) => e.to_string(),
            ApiError::NotFound(m) | ApiError::Internal(m) => m.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "error": self.message(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Serialize)]
pub struct BuildResponse {
    pub success: bool,
    pub metadata: IndexRecord,
}

#[derive(Serialize)]
pub struct LocateResponse {
    pub success: bool,
    pub frame: HoverFrame,
}

#[derive(Debug, Deserialize)]
pub struct LocateQuery {
    pub t: f64,
}

/// Handler for `GET /process-video`.
///
/// The build runs on the blocking pool. If the client goes away the handler
/// future is dropped, which flags the build as cancelled and kills the
/// in-flight ffmpeg process.
pub async fn process_video(State(state): State<AppState>) -> Result<Json<BuildResponse>, ApiError> {
    let cancel = Arc::new(AtomicBool::new(false));
    let guard = CancelOnDrop::new(Arc::clone(&cancel));

    let job = state.job.clone();
    let record = tokio::task::spawn_blocking(move || job.run(&cancel))
        .await
        .map_err(|e| ApiError::Internal(format!("build task failed: {}", e)))??;

    guard.disarm();
    Ok(Json(BuildResponse {
        success: true,
        metadata: record,
    }))
}

/// Handler for `GET /api/locate?t=<seconds>`.
pub async fn locate_frame(
    State(state): State<AppState>,
    Query(query): Query<LocateQuery>,
) -> Result<Json<LocateResponse>, ApiError> {
    let path = state.job.request().layout.metadata_path();
    let json = match tokio::fs::read_to_string(&path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("no preview has been built".to_string()));
        }
        Err(e) => return Err(PreviewError::Io(e).into()),
    };
    let record: IndexRecord = serde_json::from_str(&json).map_err(PreviewError::from)?;

    let frame = locate(query.t, &record)
        .ok_or_else(|| ApiError::NotFound(format!("no preview at {}s", query.t)))?;

    Ok(Json(LocateResponse {
        success: true,
        frame,
    }))
}

/// Build the router: API routes plus static sprite and metadata folders.
pub fn router(state: AppState) -> Router {
    let layout = state.job.request().layout.clone();

    Router::new()
        .route("/process-video", get(process_video))
        .route("/api/locate", get(locate_frame))
        .route("/api/health", get(|| async { "OK" }))
        .nest_service(SPRITES_URL_PREFIX, ServeDir::new(&layout.sprites_dir))
        .nest_service(METADATA_URL_PREFIX, ServeDir::new(&layout.metadata_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until the process is stopped.
pub async fn start_server(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    state.job.request().layout.ensure()?;
    let app = router(state);

    log::info!("Backend running at http://{}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ApiError::from(PreviewError::InvalidInput("x".into())), StatusCode::BAD_REQUEST),
            (ApiError::from(PreviewError::Busy("out".into())), StatusCode::CONFLICT),
            (ApiError::from(PreviewError::Cancelled), StatusCode::SERVICE_UNAVAILABLE),
            (ApiError::from(PreviewError::ExtractionFailed("x".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::from(PreviewError::build_failed(2, "x")), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{:?}", err);
        }
    }

    #[test]
    fn test_error_response_status() {
        let response = ApiError::from(PreviewError::Busy("output".into())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_error_message_names_partition() {
        let err = ApiError::from(PreviewError::build_failed(1, "tile filter crashed"));
        assert_eq!(err.message(), "Sprite 1 build failed: tile filter crashed");
    }
}
