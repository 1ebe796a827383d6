use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ledgerscan_core::{
    mime_for_path, render_pdf, Ledger, LedgerConfig, LedgerError, QueryAnswer, RecordTable,
    UploadedDocument,
};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

struct AppState {
    ledger: Ledger,
    session: Mutex<RecordTable>,
}

impl AppState {
    fn new(ledger: Ledger) -> Self {
        Self {
            ledger,
            session: Mutex::new(RecordTable::new()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    init_tracing();
    let config = LedgerConfig::load(None)?;
    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let state = build_state(config).await?;
    info!("listening" = %addr);
    let served = axum::serve(listener, router(state.clone())).await;
    release_state(state).await?;
    Ok(served?)
}

/// The ledger owns a blocking HTTP client, which must be created and
/// dropped off the async workers.
async fn build_state(config: LedgerConfig) -> Result<Arc<AppState>, anyhow::Error> {
    let ledger = task::spawn_blocking(move || Ledger::from_config(config)).await??;
    Ok(Arc::new(AppState::new(ledger)))
}

async fn release_state(state: Arc<AppState>) -> Result<(), anyhow::Error> {
    task::spawn_blocking(move || drop(state)).await?;
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/documents", post(handle_documents))
        .route("/records", get(handle_records).delete(handle_clear))
        .route("/query", post(handle_query))
        .route("/report", post(handle_report))
        .route("/report.pdf", get(handle_report_pdf))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[derive(Debug, Serialize)]
struct RecordsResponse {
    income: RecordTable,
    expense: RecordTable,
}

impl RecordsResponse {
    fn from_table(table: &RecordTable) -> Self {
        let (income, expense) = table.split();
        Self { income, expense }
    }
}

#[derive(Debug, Serialize)]
struct DocumentsResponse {
    added: usize,
    #[serde(flatten)]
    records: RecordsResponse,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    question: String,
}

async fn handle_documents(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<DocumentsResponse>, AppError> {
    let documents = extract_files(&mut multipart).await?;
    let response = task::spawn_blocking(move || ingest(&state, documents))
        .await
        .map_err(AppError::internal)??;
    Ok(Json(response))
}

/// Extracts into a private table so the session lock is only held while
/// the batch is appended. Records extracted before a failure are kept.
fn ingest(state: &AppState, documents: Vec<UploadedDocument>) -> Result<DocumentsResponse, AppError> {
    let mut batch = RecordTable::new();
    let outcome = state.ledger.ingest(documents, &mut batch);
    let mut session = state.session.lock();
    session.append(batch);
    let added = outcome?;
    Ok(DocumentsResponse {
        added,
        records: RecordsResponse::from_table(&session),
    })
}

async fn handle_records(State(state): State<Arc<AppState>>) -> Json<RecordsResponse> {
    Json(RecordsResponse::from_table(&state.session.lock()))
}

async fn handle_clear(State(state): State<Arc<AppState>>) -> StatusCode {
    let mut session = state.session.lock();
    info!(dropped = session.len(), "session cleared");
    session.clear();
    StatusCode::NO_CONTENT
}

async fn handle_query(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QueryRequest>,
) -> Result<Json<QueryAnswer>, AppError> {
    let table = state.session.lock().clone();
    let answer = task::spawn_blocking(move || state.ledger.ask(&table, &body.question))
        .await
        .map_err(AppError::internal)??;
    Ok(Json(answer))
}

async fn handle_report(
    State(state): State<Arc<AppState>>,
) -> Result<Json<IndexMap<String, String>>, AppError> {
    let entries = build_report(state).await?;
    Ok(Json(entries))
}

async fn handle_report_pdf(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let entries = build_report(state).await?;
    let bytes = render_pdf(&entries)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"report.pdf\""),
        ],
        bytes,
    )
        .into_response())
}

async fn build_report(state: Arc<AppState>) -> Result<IndexMap<String, String>, AppError> {
    let table = state.session.lock().clone();
    let report = task::spawn_blocking(move || state.ledger.report(&table))
        .await
        .map_err(AppError::internal)??;
    Ok(report.entries())
}

/// Collects every `file` field in upload order.
async fn extract_files(multipart: &mut Multipart) -> Result<Vec<UploadedDocument>, AppError> {
    let mut documents = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(AppError::bad_request)?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("upload-{}", documents.len() + 1));
        let mime_type = match field.content_type() {
            Some(declared) if declared != "application/octet-stream" => declared.to_string(),
            _ => mime_for_path(std::path::Path::new(&filename)).to_string(),
        };
        let data = field.bytes().await.map_err(AppError::bad_request)?;
        documents.push(UploadedDocument::new(filename, mime_type, data.to_vec()));
    }
    if documents.is_empty() {
        return Err(AppError::bad_request("missing file"));
    }
    Ok(documents)
}

#[derive(Debug, Error)]
enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Upstream(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn bad_request<E: ToString>(msg: E) -> Self {
        Self::BadRequest(msg.to_string())
    }

    fn internal<E: Into<anyhow::Error>>(err: E) -> Self {
        Self::Internal(err.into())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let upstream = match &err {
            LedgerError::Extraction { source, .. } => is_upstream(source),
            other => is_upstream(other),
        };
        match err {
            LedgerError::InvalidInput(msg) => AppError::BadRequest(msg),
            err if upstream => AppError::Upstream(err.to_string()),
            err => AppError::Internal(err.into()),
        }
    }
}

fn is_upstream(err: &LedgerError) -> bool {
    matches!(
        err,
        LedgerError::Gateway(_) | LedgerError::MalformedResponse(_) | LedgerError::Schema(_)
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Upstream(msg) => {
                warn!("upstream_error" = %msg);
                (StatusCode::BAD_GATEWAY, msg).into_response()
            }
            AppError::Internal(err) => {
                error!("internal_error" = %err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
