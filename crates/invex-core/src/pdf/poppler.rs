//! Page rasterization through poppler's `pdftoppm`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, trace};

use super::{PageRenderer, Result};
use crate::error::PdfError;

/// Renders pages by running `pdftoppm -png -r <dpi>` in a scratch directory.
#[derive(Debug, Clone)]
pub struct PopplerRenderer {
    program: PathBuf,
}

impl PopplerRenderer {
    /// Use a specific `pdftoppm` executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Whether the executable can be started.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-v")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn collect_pages(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
        let entries = std::fs::read_dir(dir).map_err(|e| PdfError::Render(e.to_string()))?;

        let mut pages: Vec<(u32, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter_map(|path| {
                let number = page_number(&path)?;
                Some((number, path))
            })
            .collect();

        // pdftoppm zero-pads to the width of the page count, so sort numerically
        pages.sort_by_key(|(number, _)| *number);
        Ok(pages)
    }
}

impl Default for PopplerRenderer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl PageRenderer for PopplerRenderer {
    fn render_pages(&self, data: &[u8], dpi: u32) -> Result<Vec<Vec<u8>>> {
        let scratch = tempfile::tempdir().map_err(|e| PdfError::Render(e.to_string()))?;
        let input = scratch.path().join("input.pdf");
        std::fs::write(&input, data).map_err(|e| PdfError::Render(e.to_string()))?;
        let prefix = scratch.path().join("page");

        debug!("Rendering PDF pages at {} DPI with {}", dpi, self.program.display());

        let output = Command::new(&self.program)
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg(&input)
            .arg(&prefix)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => PdfError::RendererMissing(self.program.display().to_string()),
                _ => PdfError::Render(e.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PdfError::Render(stderr.trim().to_string()));
        }

        let mut images = Vec::new();
        for (number, path) in Self::collect_pages(scratch.path())? {
            trace!("Reading rendered page {} from {}", number, path.display());
            let png = std::fs::read(&path).map_err(|e| PdfError::Render(e.to_string()))?;
            images.push(png);
        }

        Ok(images)
    }
}

/// Extract N from `page-N.png` / `page-0N.png`.
fn page_number(path: &Path) -> Option<u32> {
    if path.extension()? != "png" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix("page-")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::test_support::sample_pdf;

    #[test]
    fn test_page_number() {
        assert_eq!(page_number(Path::new("/tmp/x/page-1.png")), Some(1));
        assert_eq!(page_number(Path::new("/tmp/x/page-012.png")), Some(12));
        assert_eq!(page_number(Path::new("/tmp/x/input.pdf")), None);
        assert_eq!(page_number(Path::new("/tmp/x/page-a.png")), None);
    }

    #[test]
    fn test_missing_renderer() {
        let renderer = PopplerRenderer::new("/nonexistent/bin/pdftoppm");
        assert!(!renderer.is_available());
        assert!(matches!(
            renderer.render_pages(&sample_pdf(1), 72),
            Err(PdfError::RendererMissing(_))
        ));
    }

    #[test]
    fn test_renders_each_page_in_order() {
        let renderer = PopplerRenderer::default();
        if !renderer.is_available() {
            eprintln!("pdftoppm not installed, skipping");
            return;
        }

        let pages = renderer.render_pages(&sample_pdf(3), 36).unwrap();
        assert_eq!(pages.len(), 3);
        for png in &pages {
            assert_eq!(image::guess_format(png).unwrap(), image::ImageFormat::Png);
        }
    }
}
