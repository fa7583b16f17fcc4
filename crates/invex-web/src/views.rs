//! Server-rendered HTML pages.
//!
//! Templates are embedded at compile time and HTML-escaped automatically.
//! Views hand them plain strings only, already rendered from the record.

use std::sync::OnceLock;

use invex_core::{InvoiceRecord, LineEntry, Scalar};
use minijinja::{AutoEscape, Environment, context};
use serde::Serialize;
use serde_json::Value;

use crate::error::WebError;
use crate::types::{FileReport, HistorySummary};

static TEMPLATE_ENV: OnceLock<Result<Environment<'static>, String>> = OnceLock::new();

fn init_template_env() -> Result<Environment<'static>, String> {
    let mut env = Environment::new();

    for (name, source) in [
        ("base.html.jinja", include_str!("../templates/base.html.jinja")),
        ("style.css.jinja", include_str!("../templates/style.css.jinja")),
        ("sidebar.html.jinja", include_str!("../templates/sidebar.html.jinja")),
        ("upload_form.html.jinja", include_str!("../templates/upload_form.html.jinja")),
        ("index.html.jinja", include_str!("../templates/index.html.jinja")),
        ("results.html.jinja", include_str!("../templates/results.html.jinja")),
    ] {
        env.add_template(name, source)
            .map_err(|e| format!("Failed to add template {}: {}", name, e))?;
    }

    env.set_auto_escape_callback(|name| {
        if name.ends_with(".html.jinja") {
            AutoEscape::Html
        } else {
            AutoEscape::None
        }
    });

    Ok(env)
}

fn render(name: &str, ctx: minijinja::Value) -> Result<String, WebError> {
    let env = TEMPLATE_ENV
        .get_or_init(init_template_env)
        .as_ref()
        .map_err(|e| WebError::Internal(e.clone()))?;
    let template = env
        .get_template(name)
        .map_err(|e| WebError::Internal(format!("Template not found: {}", e)))?;
    template
        .render(ctx)
        .map_err(|e| WebError::Internal(format!("Template render failed: {}", e)))
}

#[derive(Debug, Serialize)]
struct ReportView {
    file: String,
    error: Option<String>,
    kind: &'static str,
    record: Option<RecordView>,
    artifact: Option<String>,
}

#[derive(Debug, Serialize)]
struct RecordView {
    metrics: Vec<Metric>,
    items: Vec<ItemView>,
    json: String,
}

#[derive(Debug, Serialize)]
struct Metric {
    label: &'static str,
    value: String,
}

#[derive(Debug, Serialize)]
struct ItemView {
    description: String,
    quantity: String,
    unit_price: String,
    total: String,
}

fn cell(value: Option<&Scalar>) -> String {
    value.map(Scalar::to_cell).unwrap_or_else(|| "-".to_string())
}

impl RecordView {
    fn new(record: &InvoiceRecord) -> Self {
        let metrics = vec![
            Metric { label: "Company", value: cell(record.issuer.name.as_ref()) },
            Metric { label: "Tax ID", value: cell(record.issuer.tax_id.as_ref()) },
            Metric { label: "Issue date", value: cell(record.issue_date.as_ref()) },
            Metric { label: "Invoice number", value: cell(record.invoice_number.as_ref()) },
            Metric { label: "Total", value: cell(record.grand_total.as_ref()) },
            Metric { label: "Items", value: record.item_count().to_string() },
        ];

        let items = record
            .line_items
            .iter()
            .map(|entry| match entry {
                LineEntry::Item(item) => ItemView {
                    description: cell(item.description.as_ref()),
                    quantity: cell(item.quantity.as_ref()),
                    unit_price: cell(item.unit_price.as_ref()),
                    total: cell(item.total.as_ref()),
                },
                LineEntry::Other(value) => ItemView {
                    description: match value {
                        Value::Null => "-".to_string(),
                        other => Scalar::from(other.clone()).to_cell(),
                    },
                    quantity: "-".to_string(),
                    unit_price: "-".to_string(),
                    total: "-".to_string(),
                },
            })
            .collect();

        Self {
            metrics,
            items,
            json: serde_json::to_string_pretty(record).unwrap_or_default(),
        }
    }
}

impl ReportView {
    fn new(report: &FileReport) -> Self {
        Self {
            file: report.file.clone(),
            error: report.error.clone(),
            kind: report.kind.unwrap_or("error"),
            record: report.record.as_ref().map(RecordView::new),
            artifact: report.artifact.clone(),
        }
    }
}

/// Landing page with the upload form.
pub fn index_page(sidebar: &HistorySummary) -> Result<String, WebError> {
    render(
        "index.html.jinja",
        context! { title => "Invoice extraction", sidebar => sidebar },
    )
}

/// Results of one upload batch.
pub fn results_page(reports: &[FileReport], sidebar: &HistorySummary) -> Result<String, WebError> {
    let succeeded = reports.iter().filter(|r| r.is_success()).count();
    let reports: Vec<ReportView> = reports.iter().map(ReportView::new).collect();

    render(
        "results.html.jinja",
        context! {
            title => "Extraction results",
            sidebar => sidebar,
            succeeded => succeeded,
            reports => reports,
        },
    )
}
