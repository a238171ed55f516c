mod pages;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use pickup_api::PickupApi;
use pickup_core::SearchHit;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");
const EXPORT_DISPOSITION: &str = "attachment; filename=\"recogidas_export.csv\"";
const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Clone)]
struct ServiceState {
    api: PickupApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    error: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
struct UploadResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    inserted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchParams {
    q: String,
}

#[derive(Debug, Clone, Serialize)]
struct ClearResponse {
    ok: bool,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    records: usize,
}

#[derive(Debug, Parser)]
#[command(name = "pickup-service")]
#[command(about = "Web tool for importing, searching and exporting pickup records")]
struct Args {
    #[arg(long, default_value = "./recogidas.sqlite3")]
    db: PathBuf,
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,
    #[arg(long, default_value = "./export.csv")]
    export_path: PathBuf,
    /// Largest accepted request body, in bytes.
    #[arg(long, default_value_t = 32 * 1024 * 1024)]
    max_upload_bytes: usize,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

impl ServiceState {
    fn error(err: &anyhow::Error) -> ServiceError {
        let message = format!("{err:#}");
        error!(error = %message, "request failed");
        ServiceError { error: message }
    }
}

impl UploadResponse {
    fn inserted(inserted: usize) -> Self {
        Self { ok: true, inserted: Some(inserted), error: None }
    }

    fn failed(error: String) -> Self {
        Self { ok: false, inserted: None, error: Some(error) }
    }
}

fn app(state: ServiceState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(search_page))
        .route("/todas", get(listing_page))
        .route("/api/upload", post(upload))
        .route("/api/search", get(search))
        .route("/api/clear", post(clear))
        .route("/api/export", get(export))
        .route("/api/health", get(health))
        .route("/api/openapi", get(openapi))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let api = PickupApi::new(args.db.clone(), args.export_path);
    api.ensure_schema()?;

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!(bind = %args.bind, db = %args.db.display(), "pickup service listening");
    axum::serve(listener, app(ServiceState { api }, args.max_upload_bytes)).await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn search_page() -> Html<String> {
    Html(pages::search_page())
}

async fn listing_page(State(state): State<ServiceState>) -> Result<Html<String>, ServiceError> {
    let rows = state.api.list_grouped().map_err(|err| ServiceState::error(&err))?;
    Ok(Html(pages::listing_page(&rows)))
}

// Always 200: failures are reported inside the body.
async fn upload(
    State(state): State<ServiceState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<UploadResponse> {
    let bytes = match multipart {
        Ok(multipart) => read_upload(multipart).await,
        Err(rejection) => Err(anyhow!("{rejection}")),
    };

    match bytes.and_then(|bytes| state.api.import_workbook(&bytes)) {
        Ok(summary) => Json(UploadResponse::inserted(summary.inserted)),
        Err(err) => {
            let message = format!("{err:#}");
            warn!(error = %message, "upload rejected");
            Json(UploadResponse::failed(message))
        }
    }
}

async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            return Ok(field.bytes().await?.to_vec());
        }
    }
    Err(anyhow!("the upload has no `{UPLOAD_FIELD}` field"))
}

async fn search(
    State(state): State<ServiceState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchHit>>, ServiceError> {
    let hits = state.api.search(&params.q).map_err(|err| ServiceState::error(&err))?;
    Ok(Json(hits))
}

async fn clear(State(state): State<ServiceState>) -> Result<Json<ClearResponse>, ServiceError> {
    state.api.clear().map_err(|err| ServiceState::error(&err))?;
    Ok(Json(ClearResponse { ok: true }))
}

async fn export(State(state): State<ServiceState>) -> Result<Response, ServiceError> {
    let body = state
        .api
        .export()
        .and_then(|summary| {
            std::fs::read(state.api.export_path())
                .with_context(|| format!("failed to read export file {}", summary.path))
        })
        .map_err(|err| ServiceState::error(&err))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, EXPORT_DISPOSITION),
        ],
        body,
    )
        .into_response())
}

async fn health(State(state): State<ServiceState>) -> Result<Json<HealthResponse>, ServiceError> {
    let status = state.api.status().map_err(|err| ServiceState::error(&err))?;
    Ok(Json(HealthResponse { status: "ok", records: status.records }))
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}
