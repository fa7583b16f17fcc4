//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{InvexError, Result};

/// Main configuration for the invex pipeline.
///
/// The API key itself is never stored here; only the name of the
/// environment variable that holds it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvexConfig {
    /// Gemini client configuration.
    pub gemini: GeminiConfig,

    /// PDF rasterization configuration.
    pub pdf: PdfConfig,

    /// Artifact and history locations.
    pub output: OutputConfig,
}

/// Extraction model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// Model identifier.
    pub model: String,

    /// Base URL of the Generative Language API.
    pub api_base: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Request timeout in seconds (None = no client-side timeout).
    pub request_timeout_secs: Option<u64>,

    /// Sampling temperature (None = model default).
    pub temperature: Option<f32>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-pro".to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            request_timeout_secs: None,
            temperature: None,
        }
    }
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// DPI for rendering PDF pages to images.
    pub render_dpi: u32,

    /// Maximum pages to send to the model (0 = unlimited).
    pub max_pages: usize,

    /// Renderer executable (poppler's pdftoppm).
    pub renderer: PathBuf,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            render_dpi: 200,
            max_pages: 0,
            renderer: PathBuf::from("pdftoppm"),
        }
    }
}

/// Where extraction results are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for per-document JSON artifacts.
    pub json_dir: PathBuf,

    /// Consolidated CSV history file.
    pub history_file: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json_dir: PathBuf::from("invoices_json"),
            history_file: PathBuf::from("invoices_data.csv"),
        }
    }
}

impl InvexConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| InvexError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| InvexError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Read the API key from the process environment.
    ///
    /// A `.env` file in the working directory is loaded first, without
    /// overriding variables that are already set.
    pub fn api_key(&self) -> Result<String> {
        let _ = dotenvy::dotenv();
        let var = &self.gemini.api_key_env;
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(InvexError::Config(format!(
                "{} is not set (environment or .env file)",
                var
            ))),
        }
    }
}
