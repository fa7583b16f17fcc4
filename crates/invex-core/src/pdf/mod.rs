//! PDF processing module.
//!
//! PDFs are validated and counted with lopdf, then handed to a
//! [`PageRenderer`] that rasterizes every page to PNG.

mod poppler;

pub use poppler::PopplerRenderer;

use lopdf::Document;
use tracing::debug;

use crate::error::PdfError;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Trait for page rasterizers.
pub trait PageRenderer: Send + Sync {
    /// Render every page of `data` at `dpi`, returning one PNG per page in
    /// page order.
    fn render_pages(&self, data: &[u8], dpi: u32) -> Result<Vec<Vec<u8>>>;
}

/// Count the pages of a PDF, rejecting documents that cannot be opened.
///
/// Encrypted documents are accepted only when the empty user password
/// unlocks them.
pub fn page_count(data: &[u8]) -> Result<usize> {
    let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

    if doc.is_encrypted() {
        if doc.decrypt("").is_err() {
            return Err(PdfError::Encrypted);
        }
        debug!("Decrypted PDF with empty password");
    }

    let pages = doc.get_pages().len();
    if pages == 0 {
        return Err(PdfError::NoPages);
    }

    debug!("Loaded PDF with {} pages", pages);
    Ok(pages)
}
