//! Request and response types.

use invex_core::{ExtractionMetadata, ExtractionReport, HistoryEntry, InvoiceRecord, Result};
use serde::{Deserialize, Serialize};

/// Outcome of one uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Failed,
}

/// Per-file result returned by `POST /api/extract`.
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub file: String,
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<InvoiceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExtractionMetadata>,
    /// Artifact file name, downloadable from `/invoices/{name}`.
    pub artifact: Option<String>,
    pub error: Option<String>,
    pub kind: Option<&'static str>,
}

impl FileReport {
    pub fn from_outcome(file: String, outcome: Result<ExtractionReport>) -> Self {
        match outcome {
            Ok(report) => {
                let artifact = report
                    .artifact
                    .as_ref()
                    .ok()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned());

                let errors = report.persistence_errors();
                let (status, error, kind) = if errors.is_empty() {
                    (ReportStatus::Success, None, None)
                } else {
                    let message = errors
                        .iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("; ");
                    (ReportStatus::Failed, Some(message), Some("persistence_error"))
                };

                Self {
                    file,
                    status,
                    record: Some(report.record),
                    metadata: Some(report.metadata),
                    artifact,
                    error,
                    kind,
                }
            }
            Err(e) => Self {
                file,
                status: ReportStatus::Failed,
                record: None,
                metadata: None,
                artifact: None,
                error: Some(e.to_string()),
                kind: Some(e.kind()),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReportStatus::Success
    }
}

/// Query string of `GET /api/history`.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Only return the last `limit` rows.
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub total: usize,
    pub rows: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model: String,
}

/// Sidebar figures shown on every page.
#[derive(Debug, Default, Serialize)]
pub struct HistorySummary {
    pub total: usize,
    pub last_extraction: Option<String>,
    pub recent: Vec<HistoryEntry>,
}

impl HistorySummary {
    /// Number of rows shown in the sidebar table.
    pub const RECENT_ROWS: usize = 5;

    pub fn from_rows(rows: Vec<HistoryEntry>) -> Self {
        let total = rows.len();
        let last_extraction = rows.last().map(|r| r.extraction_timestamp.clone());
        let recent = rows
            .into_iter()
            .skip(total.saturating_sub(Self::RECENT_ROWS))
            .collect();
        Self {
            total,
            last_extraction,
            recent,
        }
    }
}
