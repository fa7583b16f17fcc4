//! End-to-end extraction for one file: normalize, call the model, parse,
//! persist.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::error::{InvexError, PersistenceError, Result};
use crate::extraction::{EXTRACTION_PROMPT, ExtractionModel, GeminiClient, parse_response};
use crate::models::config::InvexConfig;
use crate::models::invoice::{ExtractionMetadata, HistoryEntry, InvoiceRecord};
use crate::normalize::{DocumentKind, Normalizer};
use crate::store::InvoiceStore;

/// One file waiting to be extracted.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    /// Original file name, used for type detection and artifact naming.
    pub file_name: String,
    /// MIME type declared by an uploader, if any.
    pub mime_type: Option<String>,
    pub data: Vec<u8>,
}

impl ExtractionJob {
    pub fn from_bytes(file_name: impl Into<String>, mime_type: Option<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type,
            data,
        }
    }

    /// Read a job from disk. Unsupported extensions fail before reading.
    pub fn from_path(path: &Path) -> Result<Self> {
        Normalizer::check_path(path)?;
        let data = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(Self::from_bytes(file_name, None, data))
    }
}

/// A record the model produced, before persistence.
#[derive(Debug, Clone)]
pub struct ParsedInvoice {
    pub record: InvoiceRecord,
    pub metadata: ExtractionMetadata,
}

/// Outcome of a successful parse, including both persistence results.
#[derive(Debug)]
pub struct ExtractionReport {
    pub record: InvoiceRecord,
    pub metadata: ExtractionMetadata,
    pub artifact: std::result::Result<PathBuf, PersistenceError>,
    pub history: std::result::Result<HistoryEntry, PersistenceError>,
}

impl ExtractionReport {
    /// Whether both the artifact and the history row were written.
    pub fn is_persisted(&self) -> bool {
        self.artifact.is_ok() && self.history.is_ok()
    }

    /// Persistence failures, artifact first.
    pub fn persistence_errors(&self) -> Vec<&PersistenceError> {
        [self.artifact.as_ref().err(), self.history.as_ref().err()]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// The shared extraction pipeline used by the CLI and the web server.
pub struct Pipeline<M> {
    normalizer: Arc<Normalizer>,
    model: M,
    store: InvoiceStore,
}

impl Pipeline<GeminiClient> {
    /// Build the production pipeline. Fails if the API key is missing.
    pub fn from_config(config: &InvexConfig) -> Result<Self> {
        let model = GeminiClient::from_config(config)?;
        Ok(Self::new(
            Normalizer::new(&config.pdf),
            model,
            InvoiceStore::new(&config.output),
        ))
    }
}

impl<M: ExtractionModel> Pipeline<M> {
    pub fn new(normalizer: Normalizer, model: M, store: InvoiceStore) -> Self {
        Self {
            normalizer: Arc::new(normalizer),
            model,
            store,
        }
    }

    pub fn store(&self) -> &InvoiceStore {
        &self.store
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Normalize, call the model and parse. Nothing is written.
    pub async fn extract(&self, job: ExtractionJob) -> Result<ParsedInvoice> {
        let start = Instant::now();
        let ExtractionJob {
            file_name,
            mime_type,
            data,
        } = job;

        info!("Processing: {}", file_name);

        let normalizer = Arc::clone(&self.normalizer);
        let name = file_name.clone();
        let document = tokio::task::spawn_blocking(move || {
            normalizer.normalize(&name, mime_type.as_deref(), &data)
        })
        .await
        .map_err(|e| InvexError::Io(std::io::Error::other(e)))??;

        debug!("{} normalized to {} page image(s)", file_name, document.pages.len());

        let text = self.model.generate(EXTRACTION_PROMPT, &document.pages).await?;
        let record = parse_response(&text)?;

        let metadata = ExtractionMetadata {
            file_type: file_type(&file_name, document.kind),
            source_file: file_name,
            pages: document.pages.len(),
            extracted_at: Local::now(),
            model: self.model.model_id().to_string(),
        };

        debug!("Extraction took {:?}", start.elapsed());
        Ok(ParsedInvoice { record, metadata })
    }

    /// Run the whole pipeline for one file.
    ///
    /// Errors before a record exists are returned as `Err` and leave no
    /// trace on disk. Once a record exists both writes are attempted and
    /// reported independently.
    pub async fn process(&self, job: ExtractionJob) -> Result<ExtractionReport> {
        let ParsedInvoice { record, metadata } = self.extract(job).await?;
        Ok(self.persist(record, metadata))
    }

    /// Write the artifact and append the history row.
    pub fn persist(&self, record: InvoiceRecord, metadata: ExtractionMetadata) -> ExtractionReport {
        let artifact = self.store.write_artifact(&record, &metadata);
        if let Err(e) = &artifact {
            warn!("{}", e);
        }

        let entry = HistoryEntry::from_record(&record, &metadata);
        let history = self.store.append_history(&entry).map(|_| entry);
        if let Err(e) = &history {
            warn!("{}", e);
        }

        ExtractionReport {
            record,
            metadata,
            artifact,
            history,
        }
    }
}

fn file_type(file_name: &str, kind: DocumentKind) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_else(|| match kind {
            DocumentKind::Jpeg => ".jpg".to_string(),
            DocumentKind::Png => ".png".to_string(),
            DocumentKind::Pdf => ".pdf".to_string(),
        })
}


#[cfg(test)]
mod tests {
    use image::ImageFormat;
    use pretty_assertions::assert_eq;

    use super::test_support::ScriptedModel;
    use super::*;
    use crate::error::ApiError;
    use crate::models::config::OutputConfig;
    use crate::models::invoice::InvoiceArtifact;
    use crate::normalize::test_support::{sample_image, stub_normalizer};
    use crate::pdf::test_support::sample_pdf;

    const TWO_ITEMS: &str = "```json\n{\"emitente\": {\"razao_social\": \"Loja Exemplo\", \"cnpj\": \"00.000.000/0001-00\", \"endereco\": \"Av. Central, 100\"}, \"data_emissao\": \"15/01/2024\", \"numero_nota\": \"5521\", \"itens\": [{\"descricao\": \"Caneta\", \"quantidade\": 10, \"valor_unitario\": 5.0, \"valor_total\": 50.0}, {\"descricao\": \"Caderno\", \"quantidade\": 2, \"valor_unitario\": 25.0, \"valor_total\": 50.0}], \"valor_total_nota\": 100.00, \"impostos\": {\"icms\": null, \"iss\": null}}\n```";

    fn pipeline(dir: &Path, model: ScriptedModel) -> Pipeline<ScriptedModel> {
        let store = InvoiceStore::new(&OutputConfig {
            json_dir: dir.join("invoices_json"),
            history_file: dir.join("invoices_data.csv"),
        });
        Pipeline::new(stub_normalizer(), model, store)
    }

    #[tokio::test]
    async fn test_two_page_pdf_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), ScriptedModel::new(vec![Ok(TWO_ITEMS.to_string())]));

        let job = ExtractionJob::from_bytes("invoice1.pdf", None, sample_pdf(2));
        let report = pipeline.process(job).await.unwrap();

        assert!(report.is_persisted());
        assert_eq!(
            report.record.grand_total.as_ref().map(|t| t.to_string()),
            Some("100.00".to_string())
        );
        assert_eq!(report.record.item_count(), 2);
        assert_eq!(report.metadata.pages, 2);
        assert_eq!(report.metadata.file_type, ".pdf");
        assert_eq!(*pipeline.model().pages_seen.lock().unwrap(), vec![2]);

        let rows = pipeline.store().read_history().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].grand_total, "100.00");
        assert_eq!(rows[0].item_count, 2);
        assert_eq!(rows[0].source_file, "invoice1.pdf");

        let artifact = std::fs::read_to_string(report.artifact.as_ref().unwrap()).unwrap();
        assert!(artifact.contains("\"valor_total_nota\": 100.00"));
    }

    #[tokio::test]
    async fn test_unusual_reply_is_kept_in_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let reply = "{\"emitente\": {\"cnpj\": 12345678000190, \"ie\": \"isento\"}, \"data_emissao\": 20240105, \"itens\": [null, {\"descricao\": \"Frete\", \"cfop\": \"5102\"}], \"valor_total_nota\": 881, \"chave_acesso\": \"3524 0112\"}";
        let pipeline = pipeline(dir.path(), ScriptedModel::new(vec![Ok(reply.to_string())]));

        let report = pipeline
            .process(ExtractionJob::from_bytes("odd.png", None, sample_image(ImageFormat::Png)))
            .await
            .unwrap();
        assert!(report.is_persisted());

        let rows = pipeline.store().read_history().unwrap();
        assert_eq!(rows[0].tax_id, "12345678000190");
        assert_eq!(rows[0].issue_date, "20240105");
        assert_eq!(rows[0].item_count, 2);
        assert_eq!(rows[0].grand_total, "881");

        let content = std::fs::read_to_string(report.artifact.as_ref().unwrap()).unwrap();
        let artifact: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(artifact["chave_acesso"], "3524 0112");
        assert_eq!(artifact["emitente"]["ie"], "isento");
        assert!(artifact["itens"][0].is_null());
        assert_eq!(artifact["itens"][1]["cfop"], "5102");
        assert!(content.contains("\"valor_total_nota\": 881,"));
    }

    #[tokio::test]
    async fn test_two_successes_add_two_rows_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let second = TWO_ITEMS.replace("Loja Exemplo", "Outra Loja").replace("100.00", "250.50");
        let pipeline = pipeline(
            dir.path(),
            ScriptedModel::new(vec![Ok(TWO_ITEMS.to_string()), Ok(second)]),
        );

        let first = pipeline
            .process(ExtractionJob::from_bytes("a.png", None, sample_image(ImageFormat::Png)))
            .await
            .unwrap();
        let second = pipeline
            .process(ExtractionJob::from_bytes("b.jpg", None, sample_image(ImageFormat::Jpeg)))
            .await
            .unwrap();

        let rows = pipeline.store().read_history().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], *first.history.as_ref().unwrap());
        assert_eq!(rows[1], *second.history.as_ref().unwrap());
        assert_eq!(rows[1].company_name, "Outra Loja");
        assert_eq!(rows[1].grand_total, "250.50");

        for report in [&first, &second] {
            let path = report.artifact.as_ref().unwrap();
            let content = std::fs::read_to_string(path).unwrap();
            let artifact: InvoiceArtifact = serde_json::from_str(&content).unwrap();
            assert_eq!(artifact.record, report.record);
        }
    }

    #[tokio::test]
    async fn test_malformed_response_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(
            dir.path(),
            ScriptedModel::new(vec![Ok("Sorry, I cannot help with that.".to_string())]),
        );

        let result = pipeline
            .process(ExtractionJob::from_bytes("c.png", None, sample_image(ImageFormat::Png)))
            .await;

        assert!(matches!(result, Err(InvexError::MalformedResponse(_))));
        assert!(!pipeline.store().history_file().exists());
        assert!(!pipeline.store().json_dir().exists());
    }

    #[tokio::test]
    async fn test_unsupported_file_never_reaches_model() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), ScriptedModel::new(vec![Ok(TWO_ITEMS.to_string())]));

        let result = pipeline
            .process(ExtractionJob::from_bytes("notes.txt", None, b"hello".to_vec()))
            .await;

        assert!(matches!(result, Err(InvexError::UnsupportedFormat(_))));
        assert_eq!(pipeline.model().calls(), 0);
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(
            dir.path(),
            ScriptedModel::new(vec![Err(ApiError::RateLimited("quota".into()).into())]),
        );

        let result = pipeline
            .process(ExtractionJob::from_bytes("d.png", None, sample_image(ImageFormat::Png)))
            .await;
        assert!(matches!(result, Err(InvexError::Api(ApiError::RateLimited(_)))));
        assert!(!pipeline.store().history_file().exists());
    }

    #[tokio::test]
    async fn test_job_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.PNG");
        std::fs::write(&path, sample_image(ImageFormat::Png)).unwrap();

        let job = ExtractionJob::from_path(&path).unwrap();
        assert_eq!(job.file_name, "scan.PNG");
        assert_eq!(file_type(&job.file_name, DocumentKind::Png), ".png");
        assert!(matches!(
            ExtractionJob::from_path(&dir.path().join("missing.txt")),
            Err(InvexError::UnsupportedFormat(_))
        ));
    }
}
