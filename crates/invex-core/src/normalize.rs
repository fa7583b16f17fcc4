//! File normalization: turn an uploaded or on-disk file into page images.

use std::fmt;
use std::path::Path;

use image::ImageFormat;
use tracing::{debug, info};

use crate::error::{InvexError, PdfError, Result};
use crate::models::config::PdfConfig;
use crate::pdf::{self, PageRenderer, PopplerRenderer};

/// Supported input kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Jpeg,
    Png,
    Pdf,
}

impl DocumentKind {
    /// Look up a kind from a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(DocumentKind::Jpeg),
            "png" => Some(DocumentKind::Png),
            "pdf" => Some(DocumentKind::Pdf),
            _ => None,
        }
    }

    /// Look up a kind from a MIME type.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(DocumentKind::Jpeg),
            "image/png" => Some(DocumentKind::Png),
            "application/pdf" | "application/x-pdf" => Some(DocumentKind::Pdf),
            _ => None,
        }
    }

    /// Detect a kind from magic bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"%PDF-") {
            return Some(DocumentKind::Pdf);
        }
        match image::guess_format(data).ok()? {
            ImageFormat::Jpeg => Some(DocumentKind::Jpeg),
            ImageFormat::Png => Some(DocumentKind::Png),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentKind::Jpeg => "image/jpeg",
            DocumentKind::Png => "image/png",
            DocumentKind::Pdf => "application/pdf",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Jpeg => write!(f, "JPEG"),
            DocumentKind::Png => write!(f, "PNG"),
            DocumentKind::Pdf => write!(f, "PDF"),
        }
    }
}

/// What the caller claims the file is.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Declared {
    Nothing,
    Supported(DocumentKind),
    Unsupported(String),
}

fn declared_kind(file_name: &str, mime: Option<&str>) -> Declared {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty());

    if let Some(ext) = extension {
        return match DocumentKind::from_extension(ext) {
            Some(kind) => Declared::Supported(kind),
            None => Declared::Unsupported(format!(".{}", ext.to_ascii_lowercase())),
        };
    }

    match mime {
        None => Declared::Nothing,
        Some(m) if m.starts_with("application/octet-stream") => Declared::Nothing,
        Some(m) => match DocumentKind::from_mime(m) {
            Some(kind) => Declared::Supported(kind),
            None => Declared::Unsupported(m.to_string()),
        },
    }
}

/// Resolve the kind of a file from its name, declared MIME and content.
///
/// An unsupported declaration fails first; otherwise the content decides.
pub fn detect(file_name: &str, mime: Option<&str>, data: &[u8]) -> Result<DocumentKind> {
    let declared = declared_kind(file_name, mime);
    if let Declared::Unsupported(what) = &declared {
        return Err(InvexError::UnsupportedFormat(format!(
            "{} (supported: jpg, jpeg, png, pdf)",
            what
        )));
    }

    match (DocumentKind::sniff(data), declared) {
        (Some(sniffed), Declared::Supported(kind)) if sniffed != kind => {
            debug!("{} declared as {} but content is {}", file_name, kind, sniffed);
            Ok(sniffed)
        }
        (Some(sniffed), _) => Ok(sniffed),
        (None, Declared::Supported(kind)) => Err(InvexError::CorruptFile(format!(
            "content is not a valid {} file",
            kind
        ))),
        (None, _) => Err(InvexError::UnsupportedFormat(
            "unrecognized content (supported: jpg, jpeg, png, pdf)".to_string(),
        )),
    }
}

/// One image handed to the extraction model.
#[derive(Debug, Clone, PartialEq)]
pub struct PageImage {
    pub mime_type: &'static str,
    pub data: Vec<u8>,
}

/// A file reduced to its page images, in document order.
#[derive(Debug, Clone)]
pub struct NormalizedDocument {
    pub kind: DocumentKind,
    pub pages: Vec<PageImage>,
}

/// Turns files into page images.
pub struct Normalizer {
    renderer: Box<dyn PageRenderer>,
    render_dpi: u32,
    max_pages: usize,
}

impl Normalizer {
    /// Create a normalizer backed by poppler.
    pub fn new(config: &PdfConfig) -> Self {
        Self::with_renderer(PopplerRenderer::new(&config.renderer), config)
    }

    /// Create a normalizer with a custom page renderer.
    pub fn with_renderer(renderer: impl PageRenderer + 'static, config: &PdfConfig) -> Self {
        Self {
            renderer: Box::new(renderer),
            render_dpi: config.render_dpi,
            max_pages: config.max_pages,
        }
    }

    /// Check the declared type of a path before reading it.
    pub fn check_path(path: &Path) -> Result<()> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        match declared_kind(name, None) {
            Declared::Unsupported(ext) => Err(InvexError::UnsupportedFormat(format!(
                "{} (supported: jpg, jpeg, png, pdf)",
                ext
            ))),
            _ => Ok(()),
        }
    }

    /// Normalize an in-memory file.
    pub fn normalize(
        &self,
        file_name: &str,
        mime: Option<&str>,
        data: &[u8],
    ) -> Result<NormalizedDocument> {
        let kind = detect(file_name, mime, data)?;

        let pages = match kind {
            DocumentKind::Pdf => self.rasterize(data)?,
            DocumentKind::Jpeg | DocumentKind::Png => {
                let format = match kind {
                    DocumentKind::Jpeg => ImageFormat::Jpeg,
                    _ => ImageFormat::Png,
                };
                let image = image::load_from_memory_with_format(data, format)
                    .map_err(|e| InvexError::CorruptFile(format!("cannot decode {}: {}", kind, e)))?;
                debug!("Decoded {} image {}x{}", kind, image.width(), image.height());

                vec![PageImage {
                    mime_type: kind.mime_type(),
                    data: data.to_vec(),
                }]
            }
        };

        Ok(NormalizedDocument { kind, pages })
    }

    fn rasterize(&self, data: &[u8]) -> Result<Vec<PageImage>> {
        let expected = pdf::page_count(data)?;
        if self.max_pages > 0 && expected > self.max_pages {
            return Err(PdfError::TooManyPages {
                pages: expected,
                limit: self.max_pages,
            }
            .into());
        }

        info!("Converting PDF to images ({} pages)", expected);
        let rendered = self.renderer.render_pages(data, self.render_dpi)?;

        if rendered.len() != expected {
            return Err(PdfError::Render(format!(
                "expected {} page images, renderer produced {}",
                expected,
                rendered.len()
            ))
            .into());
        }

        Ok(rendered
            .into_iter()
            .map(|data| PageImage {
                mime_type: DocumentKind::Png.mime_type(),
                data,
            })
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Cursor;

    use image::{ImageBuffer, ImageFormat, Rgb};

    use super::*;

    /// Encode a small solid image.
    pub fn sample_image(format: ImageFormat) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(8, 8, Rgb([200u8, 120, 40]));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), format)
            .expect("encode sample image");
        out
    }

    /// Renderer that emits one tiny PNG per page, labelled by page number
    /// in its single pixel's red channel.
    pub struct StubRenderer {
        pub pages: Option<usize>,
    }

    impl PageRenderer for StubRenderer {
        fn render_pages(&self, data: &[u8], _dpi: u32) -> pdf::Result<Vec<Vec<u8>>> {
            let count = match self.pages {
                Some(n) => n,
                None => pdf::page_count(data)?,
            };
            Ok((0..count)
                .map(|i| {
                    let img = ImageBuffer::from_pixel(1, 1, Rgb([i as u8, 0, 0]));
                    let mut out = Vec::new();
                    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
                        .expect("encode page");
                    out
                })
                .collect())
        }
    }

    pub fn stub_normalizer() -> Normalizer {
        Normalizer::with_renderer(StubRenderer { pages: None }, &PdfConfig::default())
    }
}
