//! Core library for AI-assisted invoice extraction.
//!
//! This crate provides:
//! - File normalization (JPEG/PNG pass-through, PDF rasterization)
//! - A Gemini `generateContent` client behind the [`ExtractionModel`] trait
//! - Recovery of the invoice JSON from free-form model output
//! - Persistence of per-document artifacts and the CSV history

pub mod error;
pub mod extraction;
pub mod models;
pub mod normalize;
pub mod pdf;
pub mod pipeline;
pub mod store;

pub use error::{ApiError, InvexError, PdfError, PersistenceError, Result};
pub use extraction::{EXTRACTION_PROMPT, ExtractionModel, GeminiClient, parse_response};
pub use models::config::InvexConfig;
pub use models::invoice::{
    ExtractionMetadata, HistoryEntry, InvoiceArtifact, InvoiceRecord, Issuer, LineEntry, LineItem,
    Scalar,
};
pub use normalize::{DocumentKind, NormalizedDocument, Normalizer, PageImage};
pub use pipeline::{ExtractionJob, ExtractionReport, ParsedInvoice, Pipeline};
pub use store::InvoiceStore;

