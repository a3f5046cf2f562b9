use crate::blob_store::{header_safe_filename, BlobError, BlobRef, BlobStore, BlobUpload};
use crate::config::{ApiConfig, DashboardConfig};
use crate::dashboard::{self, DashboardData};
use crate::error::ApiError;
use crate::export::{self, build_vlog_archive, sensors_to_csv};
use crate::models::{IngestPayload, NewSensorRecord, NewVlogRecord, RecordQuery, SensorKind};
use crate::record_store::RecordStore;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};

/// Description stored with every uploaded vlog
const VLOG_DESCRIPTION: &str = "User Vlog";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub records: Arc<dyn RecordStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub dashboard: DashboardConfig,
}

/// Ingest response
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: String,
    pub msg: String,
}

/// Vlog upload response
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub file_id: String,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/", get(root))
        .route("/ready", get(readiness_check))
        .route("/upload_data", post(upload_data))
        .route(
            "/upload_vlog",
            post(upload_vlog).layer(DefaultBodyLimit::disable()),
        )
        .route("/video/:file_id", get(stream_video))
        .route("/export_csv", get(export_csv))
        .route("/export_zip", get(export_zip))
        .route("/dashboard", get(dashboard_page))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "EmoGo Backend is running!"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.records.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Store one sensor reading in the collection picked by its `type`
#[instrument(skip(state, payload), fields(submitted_type = %payload.kind))]
async fn upload_data(
    State(state): State<AppState>,
    Json(payload): Json<IngestPayload>,
) -> Result<Json<IngestResponse>, ApiError> {
    let kind = SensorKind::classify(&payload.kind);
    if kind == SensorKind::Sentiment && payload.kind != "sentiment" {
        warn!(submitted_type = %payload.kind, "Unrecognized sensor type filed under sentiments");
    }

    let collection = kind.collection();
    let record = NewSensorRecord::stamp(payload, Utc::now());
    state.records.insert_sensor(kind, record).await?;

    metrics::counter!("emogo.records.ingested", "collection" => collection).increment(1);

    Ok(Json(IngestResponse {
        status: "success".to_string(),
        msg: format!("Saved to {collection}"),
    }))
}

/// Stream the `file` form field into the blob store and record it as a vlog
#[instrument(skip_all)]
async fn upload_vlog(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::MalformedUpload(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let upload = BlobUpload {
            filename: field.file_name().unwrap_or("upload").to_string(),
            content_type: field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string(),
        };
        let filename = upload.filename.clone();

        let body = field
            .map_err(|e| BlobError::Upload(e.to_string()))
            .boxed();
        let blob_ref = state.blobs.put(upload, body).await?;

        state
            .records
            .insert_vlog(NewVlogRecord {
                filename: filename.clone(),
                blob_ref: blob_ref.to_string(),
                description: VLOG_DESCRIPTION.to_string(),
                server_time: Utc::now(),
            })
            .await?;

        metrics::counter!("emogo.vlogs.uploaded").increment(1);
        info!(file_id = %blob_ref, filename = %filename, "Vlog uploaded");

        return Ok(Json(UploadResponse {
            status: "success".to_string(),
            file_id: blob_ref.to_string(),
        }));
    }

    Err(ApiError::MissingField("file"))
}

/// Stream a stored vlog back. Any lookup failure is reported as not found.
#[instrument(skip(state))]
async fn stream_video(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Response, ApiError> {
    let lookup = match BlobRef::parse(&file_id) {
        Ok(blob_ref) => state.blobs.get(&blob_ref).await,
        Err(e) => Err(e),
    };

    let blob = lookup.map_err(|e| {
        debug!(file_id = %file_id, error = %e, "Video lookup failed");
        ApiError::VideoNotFound
    })?;

    let disposition = format!("inline; filename=\"{}\"", header_safe_filename(&blob.filename));

    Ok((
        [
            (header::CONTENT_TYPE, blob.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(blob.body),
    )
        .into_response())
}

/// Export every sensor reading as CSV
#[instrument(skip(state))]
async fn export_csv(State(state): State<AppState>) -> Result<Response, ApiError> {
    let (sentiments, gps) = tokio::try_join!(
        state
            .records
            .list_sensors(SensorKind::Sentiment, RecordQuery::all_oldest_first()),
        state
            .records
            .list_sensors(SensorKind::Gps, RecordQuery::all_oldest_first()),
    )?;

    let csv = sensors_to_csv(&sentiments, &gps).context("Failed to build CSV export")?;

    info!(
        sentiments = sentiments.len(),
        gps = gps.len(),
        size_bytes = csv.len(),
        "CSV export built"
    );

    Ok(attachment(
        "text/csv; charset=utf-8",
        export::csv_filename(Utc::now()),
        csv,
    ))
}

/// Export every vlog as one ZIP archive
#[instrument(skip(state))]
async fn export_zip(State(state): State<AppState>) -> Result<Response, ApiError> {
    let vlogs = state
        .records
        .list_vlogs(RecordQuery::all_oldest_first())
        .await?;

    let archive = build_vlog_archive(&vlogs, state.blobs.as_ref()).await?;

    info!(
        entries = archive.entries,
        skipped = archive.skipped,
        size_bytes = archive.bytes.len(),
        "ZIP export built"
    );

    Ok(attachment(
        "application/zip",
        export::zip_filename(Utc::now()),
        archive.bytes,
    ))
}

/// Render the HTML dashboard
#[instrument(skip(state))]
async fn dashboard_page(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let recent = RecordQuery::newest(state.dashboard.recent_limit);

    let (gps, sentiments, vlogs) = tokio::try_join!(
        state.records.list_sensors(SensorKind::Gps, recent),
        state.records.list_sensors(SensorKind::Sentiment, recent),
        state.records.list_vlogs(RecordQuery::all_newest_first()),
    )?;

    Ok(Html(dashboard::render(&DashboardData {
        vlogs,
        sentiments,
        gps,
        refresh_secs: state.dashboard.refresh_secs,
    })))
}

fn attachment(content_type: &'static str, filename: String, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// Serve the API until `shutdown` resolves
pub async fn start_api_server<F>(state: AppState, config: &ApiConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting EmoGo API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
