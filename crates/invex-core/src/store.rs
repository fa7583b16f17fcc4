//! Persistence: per-document JSON artifacts and the consolidated history.
//!
//! Both writes are best-effort and independent of each other. The history
//! file is append-only and not locked; concurrent processes may interleave.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::error::PersistenceError;
use crate::models::config::OutputConfig;
use crate::models::invoice::{
    ExtractionMetadata, HISTORY_HEADER, HistoryEntry, InvoiceArtifact, InvoiceRecord,
};

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Writes artifacts and history rows below the configured locations.
///
/// Artifact names written through one store never collide: a second source
/// with the same file name gets a numbered suffix.
#[derive(Debug)]
pub struct InvoiceStore {
    json_dir: PathBuf,
    history_file: PathBuf,
    claimed: Mutex<HashSet<String>>,
}

impl InvoiceStore {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            json_dir: config.json_dir.clone(),
            history_file: config.history_file.clone(),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    pub fn json_dir(&self) -> &Path {
        &self.json_dir
    }

    pub fn history_file(&self) -> &Path {
        &self.history_file
    }

    /// Artifact file name for a source file: `<sanitized file name>.json`.
    ///
    /// The extension is kept, so `nota.pdf` and `nota.png` map to
    /// `nota.pdf.json` and `nota.png.json`.
    pub fn artifact_name(source_file: &str) -> String {
        let base = Path::new(source_file)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("");

        let sanitized: String = base
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let sanitized = sanitized.trim_matches('.');

        if sanitized.is_empty() {
            "invoice.json".to_string()
        } else {
            format!("{}.json", sanitized)
        }
    }

    /// Reserve an artifact name not yet handed out by this store.
    fn claim_name(&self, source_file: &str) -> String {
        let name = Self::artifact_name(source_file);
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        if claimed.insert(name.clone()) {
            return name;
        }

        let stem = name.trim_end_matches(".json");
        let mut n = 2;
        loop {
            let candidate = format!("{}-{}.json", stem, n);
            if claimed.insert(candidate.clone()) {
                warn!("Artifact {} already written in this run, using {}", name, candidate);
                return candidate;
            }
            n += 1;
        }
    }

    /// Write the record and its metadata as pretty JSON.
    pub fn write_artifact(
        &self,
        record: &InvoiceRecord,
        metadata: &ExtractionMetadata,
    ) -> Result<PathBuf> {
        let path = self.json_dir.join(self.claim_name(&metadata.source_file));
        let fail = |reason: String| PersistenceError::Artifact {
            path: path.clone(),
            reason,
        };

        fs::create_dir_all(&self.json_dir).map_err(|e| fail(e.to_string()))?;

        let artifact = InvoiceArtifact {
            record: record.clone(),
            metadata: metadata.clone(),
        };
        let content = serde_json::to_string_pretty(&artifact).map_err(|e| fail(e.to_string()))?;
        fs::write(&path, content).map_err(|e| fail(e.to_string()))?;

        info!("JSON saved: {}", path.display());
        Ok(path)
    }

    /// Load a previously written artifact by file name.
    pub fn read_artifact(&self, name: &str) -> Result<InvoiceArtifact> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(PersistenceError::NotFound(name.to_string()));
        }
        let path = self.json_dir.join(name);
        let content =
            fs::read_to_string(&path).map_err(|_| PersistenceError::NotFound(name.to_string()))?;
        serde_json::from_str(&content).map_err(|e| PersistenceError::Artifact {
            path,
            reason: e.to_string(),
        })
    }

    /// Append one row, writing the header first if the file is new or empty.
    pub fn append_history(&self, entry: &HistoryEntry) -> Result<()> {
        let fail = |reason: String| PersistenceError::History {
            path: self.history_file.clone(),
            reason,
        };

        if let Some(parent) = self.history_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
        }

        let needs_header = fs::metadata(&self.history_file)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_file)
            .map_err(|e| fail(e.to_string()))?;

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        wtr.serialize(entry).map_err(|e| fail(e.to_string()))?;
        wtr.flush().map_err(|e| fail(e.to_string()))?;

        debug!("History updated: {}", self.history_file.display());
        Ok(())
    }

    /// All history rows in file order. A missing file is an empty history.
    ///
    /// A file whose header is not the history header is rejected rather than
    /// read by position.
    pub fn read_history(&self) -> Result<Vec<HistoryEntry>> {
        if !self.history_file.exists() {
            return Ok(Vec::new());
        }
        let fail = |reason: String| PersistenceError::History {
            path: self.history_file.clone(),
            reason,
        };

        let mut rdr = csv::Reader::from_path(&self.history_file).map_err(|e| fail(e.to_string()))?;

        let headers = rdr.headers().map_err(|e| fail(e.to_string()))?;
        if headers.is_empty() {
            return Ok(Vec::new());
        }
        if !headers.iter().eq(HISTORY_HEADER) {
            return Err(fail(format!(
                "unexpected header '{}', expected '{}'",
                headers.iter().collect::<Vec<_>>().join(","),
                HISTORY_HEADER.join(",")
            )));
        }

        rdr.deserialize()
            .collect::<std::result::Result<Vec<HistoryEntry>, _>>()
            .map_err(|e| fail(e.to_string()))
    }

    /// Raw bytes of the history file, for downloads.
    pub fn history_bytes(&self) -> Result<Vec<u8>> {
        fs::read(&self.history_file)
            .map_err(|_| PersistenceError::NotFound(self.history_file.display().to_string()))
    }
}
