//! Error types for the invex-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the invex library.
///
/// Every variant is attributed to the single file being processed; the
/// pipeline never lets one of these abort a batch.
#[derive(Error, Debug)]
pub enum InvexError {
    /// The file is not a JPEG, PNG or PDF.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The file claims a supported type but cannot be decoded.
    #[error("corrupt file: {0}")]
    CorruptFile(String),

    /// The extraction model could not be reached or refused the request.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// The model answered without any usable text.
    #[error("empty response from model: {0}")]
    EmptyResponse(String),

    /// The model text holds no parseable invoice JSON.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Writing the artifact or the history row failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InvexError {
    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            InvexError::UnsupportedFormat(_) => "unsupported_format",
            InvexError::CorruptFile(_) => "corrupt_file",
            InvexError::Api(_) => "api_error",
            InvexError::EmptyResponse(_) => "empty_response",
            InvexError::MalformedResponse(_) => "malformed_response",
            InvexError::Persistence(_) => "persistence_error",
            InvexError::Config(_) => "config_error",
            InvexError::Io(_) => "io_error",
        }
    }
}

/// Failures talking to the extraction model.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Connection, TLS or transport failure.
    #[error("network failure: {0}")]
    Network(String),

    /// Missing, invalid or unauthorized API key.
    #[error("authentication failed ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// Quota or rate limit exceeded.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Any other non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body was not the expected JSON envelope.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Failures writing or reading the on-disk artifacts.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Writing the per-document JSON artifact failed.
    #[error("failed to write artifact {path}: {reason}")]
    Artifact { path: PathBuf, reason: String },

    /// Appending to or reading the consolidated history failed.
    #[error("history file {path}: {reason}")]
    History { path: PathBuf, reason: String },

    /// Requested artifact does not exist or has an invalid name.
    #[error("artifact not found: {0}")]
    NotFound(String),
}

/// Errors related to PDF loading and rasterization.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// The document has more pages than the configured limit.
    #[error("PDF has {pages} pages, limit is {limit}")]
    TooManyPages { pages: usize, limit: usize },

    /// The page renderer executable could not be started.
    #[error("page renderer '{0}' not found (install poppler-utils)")]
    RendererMissing(String),

    /// The renderer ran but failed or produced the wrong output.
    #[error("failed to render pages: {0}")]
    Render(String),
}

impl From<PdfError> for InvexError {
    fn from(err: PdfError) -> Self {
        InvexError::CorruptFile(err.to_string())
    }
}

/// Result type for the invex library.
pub type Result<T> = std::result::Result<T, InvexError>;
