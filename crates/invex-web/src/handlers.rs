//! Request handlers.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::header,
    response::{Html, IntoResponse, Response},
};
use invex_core::{ExtractionJob, ExtractionModel, Pipeline};
use tracing::{info, warn};

use crate::AppState;
use crate::error::WebError;
use crate::types::{FileReport, HealthResponse, HistoryQuery, HistoryResponse, HistorySummary};
use crate::views;

/// GET /
pub async fn index<M: ExtractionModel + 'static>(
    State(state): State<AppState<M>>,
) -> Result<Html<String>, WebError> {
    Ok(Html(views::index_page(&sidebar(&state.pipeline))?))
}

/// POST /extract
///
/// Multipart form with one or more `files` fields. Renders the results page.
pub async fn extract_html<M: ExtractionModel + 'static>(
    State(state): State<AppState<M>>,
    multipart: Multipart,
) -> Result<Html<String>, WebError> {
    let jobs = read_uploads(multipart).await?;
    let reports = run_jobs(&state.pipeline, jobs).await;
    let summary = sidebar(&state.pipeline);
    Ok(Html(views::results_page(&reports, &summary)?))
}

/// POST /api/extract
///
/// Same input as `/extract`; answers with one [`FileReport`] per file.
pub async fn extract_json<M: ExtractionModel + 'static>(
    State(state): State<AppState<M>>,
    multipart: Multipart,
) -> Result<Json<Vec<FileReport>>, WebError> {
    let jobs = read_uploads(multipart).await?;
    Ok(Json(run_jobs(&state.pipeline, jobs).await))
}

/// GET /invoices/{name}
pub async fn download_artifact<M: ExtractionModel + 'static>(
    State(state): State<AppState<M>>,
    Path(name): Path<String>,
) -> Result<Response, WebError> {
    let artifact = state.pipeline.store().read_artifact(&name)?;
    let body = serde_json::to_string_pretty(&artifact)
        .map_err(|e| WebError::Internal(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, attachment(&name)),
        ],
        body,
    )
        .into_response())
}

/// GET /history.csv
pub async fn download_history<M: ExtractionModel + 'static>(
    State(state): State<AppState<M>>,
) -> Result<Response, WebError> {
    let store = state.pipeline.store();
    let bytes = store.history_bytes()?;
    let name = store
        .history_file()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "history.csv".to_string());

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, attachment(&name)),
        ],
        bytes,
    )
        .into_response())
}

/// GET /api/history
pub async fn history_json<M: ExtractionModel + 'static>(
    State(state): State<AppState<M>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, WebError> {
    let mut rows = state.pipeline.store().read_history()?;
    let total = rows.len();
    if let Some(limit) = query.limit {
        rows.drain(..total.saturating_sub(limit));
    }
    Ok(Json(HistoryResponse { total, rows }))
}

/// GET /health
pub async fn health<M: ExtractionModel + 'static>(
    State(state): State<AppState<M>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.pipeline.model().model_id().to_string(),
    })
}

async fn read_uploads(mut multipart: Multipart) -> Result<Vec<ExtractionJob>, WebError> {
    let mut jobs = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| WebError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("files") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let mime_type = field.content_type().map(|s| s.to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| WebError::BadRequest(e.to_string()))?;

        // Browsers send an empty part when no file was chosen
        if file_name.is_empty() && data.is_empty() {
            continue;
        }

        jobs.push(ExtractionJob::from_bytes(file_name, mime_type, data.to_vec()));
    }

    if jobs.is_empty() {
        return Err(WebError::BadRequest("No files provided for extraction".to_string()));
    }
    Ok(jobs)
}

async fn run_jobs<M: ExtractionModel>(
    pipeline: &Pipeline<M>,
    jobs: Vec<ExtractionJob>,
) -> Vec<FileReport> {
    let mut reports = Vec::with_capacity(jobs.len());

    for job in jobs {
        let file = job.file_name.clone();
        let outcome = pipeline.process(job).await;
        if let Err(e) = &outcome {
            warn!("{}: {}", file, e);
        }
        reports.push(FileReport::from_outcome(file, outcome));
    }

    let succeeded = reports.iter().filter(|r| r.is_success()).count();
    info!("Upload processed: {} succeeded, {} failed", succeeded, reports.len() - succeeded);
    reports
}

fn sidebar<M: ExtractionModel>(pipeline: &Pipeline<M>) -> HistorySummary {
    match pipeline.store().read_history() {
        Ok(rows) => HistorySummary::from_rows(rows),
        Err(e) => {
            warn!("History unavailable: {}", e);
            HistorySummary::default()
        }
    }
}

fn attachment(name: &str) -> String {
    let safe: String = name
        .chars()
        .filter(|c| !matches!(c, '"' | '\\') && !c.is_control())
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}
