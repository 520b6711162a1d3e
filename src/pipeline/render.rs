//! PDF access: page count, classifier rasterisation and page-range copy.
//!
//! All pdfium work sits behind the [`PdfBackend`] trait so the pipeline can be
//! driven by a stub in tests. The trait is synchronous; the async wrappers in
//! this module move each call onto `spawn_blocking` because pdfium keeps
//! thread-local state and is CPU-bound.
//!
//! Output sub-PDFs are produced by copying pages between documents, never by
//! re-rendering. Only the classifier path rasterises.

use crate::config::SortConfig;
use crate::error::SortError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How large classifier images are rendered.
///
/// A page is rasterised at `dpi` (72 points per inch), then scaled down if
/// its longest edge would exceed `max_pixels`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterSize {
    pub dpi: u32,
    pub max_pixels: u32,
}

impl RasterSize {
    pub fn from_config(config: &SortConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
        }
    }

    /// Pixel size for a page of `width_pt` × `height_pt` points.
    pub fn target(&self, width_pt: f32, height_pt: f32) -> (u32, u32) {
        let scale = self.dpi.max(1) as f32 / 72.0;
        let (w, h) = (width_pt.max(1.0) * scale, height_pt.max(1.0) * scale);
        let longest = w.max(h);
        let shrink = if longest > self.max_pixels as f32 {
            self.max_pixels as f32 / longest
        } else {
            1.0
        };
        (
            ((w * shrink).round() as u32).max(1),
            ((h * shrink).round() as u32).max(1),
        )
    }
}

/// Operations the sorter needs from a PDF engine. Page numbers are 1-based.
pub trait PdfBackend: Send + Sync {
    fn page_count(&self, pdf: &Path, password: Option<&str>) -> Result<usize, SortError>;

    /// Rasterise `pages` at `size`. Out-of-range page numbers are skipped.
    fn render_pages(
        &self,
        pdf: &Path,
        password: Option<&str>,
        size: RasterSize,
        pages: &[usize],
    ) -> Result<Vec<(usize, DynamicImage)>, SortError>;

    /// A standalone PDF holding pages `start..=end` of the source.
    fn extract_pages(
        &self,
        pdf: &Path,
        password: Option<&str>,
        start: usize,
        end: usize,
    ) -> Result<Vec<u8>, SortError>;
}

/// [`PdfBackend`] over the pdfium C library.
///
/// Binds to the library named by `PDFIUM_LIB_PATH` (a file, or a directory
/// holding the platform library), falling back to the system library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    library_path: Option<PathBuf>,
}

impl PdfiumBackend {
    pub fn new() -> Self {
        Self {
            library_path: std::env::var_os("PDFIUM_LIB_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Bind to an explicit library file or directory.
    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, SortError> {
        let bindings = match &self.library_path {
            Some(path) if path.is_dir() => Pdfium::bind_to_library(
                Pdfium::pdfium_platform_library_name_at_path(path),
            ),
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| SortError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, SortError> {
    pdfium.load_pdf_from_file(pdf, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.to_ascii_lowercase().contains("password") {
            if password.is_some() {
                SortError::WrongPassword {
                    path: pdf.to_path_buf(),
                }
            } else {
                SortError::PasswordRequired {
                    path: pdf.to_path_buf(),
                }
            }
        } else {
            SortError::CorruptPdf {
                path: pdf.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

fn page_index(page: usize) -> Result<PdfPageIndex, SortError> {
    page.checked_sub(1)
        .and_then(|i| PdfPageIndex::try_from(i).ok())
        .ok_or_else(|| SortError::Internal(format!("page number {page} out of pdfium range")))
}

impl PdfBackend for PdfiumBackend {
    fn page_count(&self, pdf: &Path, password: Option<&str>) -> Result<usize, SortError> {
        let pdfium = self.bind()?;
        let document = open_document(&pdfium, pdf, password)?;
        Ok(document.pages().len() as usize)
    }

    fn render_pages(
        &self,
        pdf: &Path,
        password: Option<&str>,
        size: RasterSize,
        pages: &[usize],
    ) -> Result<Vec<(usize, DynamicImage)>, SortError> {
        let pdfium = self.bind()?;
        let document = open_document(&pdfium, pdf, password)?;
        let doc_pages = document.pages();
        let total = doc_pages.len() as usize;

        let mut results = Vec::with_capacity(pages.len());
        for &page in pages {
            if page == 0 || page > total {
                warn!("Skipping page {} (out of range, total={})", page, total);
                continue;
            }
            let rasterisation_failed = |e: PdfiumError| SortError::RasterisationFailed {
                page,
                detail: format!("{:?}", e),
            };
            let pdf_page = doc_pages
                .get(page_index(page)?)
                .map_err(rasterisation_failed)?;
            let (width, height) = size.target(pdf_page.width().value, pdf_page.height().value);
            let render_config = PdfRenderConfig::new()
                .set_target_width(width as i32)
                .set_maximum_height(height as i32);
            let bitmap = pdf_page
                .render_with_config(&render_config)
                .map_err(rasterisation_failed)?;
            let image = bitmap.as_image();
            debug!("Rendered page {} → {}x{} px", page, image.width(), image.height());
            results.push((page, image));
        }
        Ok(results)
    }

    fn extract_pages(
        &self,
        pdf: &Path,
        password: Option<&str>,
        start: usize,
        end: usize,
    ) -> Result<Vec<u8>, SortError> {
        let pdfium = self.bind()?;
        let source = open_document(&pdfium, pdf, password)?;
        let total = source.pages().len() as usize;
        if start == 0 || start > end || end > total {
            return Err(SortError::Internal(format!(
                "page range {start}-{end} outside document of {total} pages"
            )));
        }

        let copy_failed = |e: PdfiumError| SortError::CorruptPdf {
            path: pdf.to_path_buf(),
            detail: format!("copy of pages {start}-{end}: {:?}", e),
        };
        let mut target = pdfium.create_new_pdf().map_err(copy_failed)?;
        target
            .pages_mut()
            .copy_page_range_from_document(&source, page_index(start)?..=page_index(end)?, 0)
            .map_err(copy_failed)?;
        target.save_to_bytes().map_err(copy_failed)
    }
}

// ── Async wrappers ───────────────────────────────────────────────────────

fn task_panicked(what: &str, e: tokio::task::JoinError) -> SortError {
    SortError::Internal(format!("{what} task panicked: {e}"))
}

pub async fn page_count(
    backend: &Arc<dyn PdfBackend>,
    pdf: &Path,
    password: Option<&str>,
) -> Result<usize, SortError> {
    let backend = Arc::clone(backend);
    let path = pdf.to_path_buf();
    let pwd = password.map(str::to_string);
    let total = tokio::task::spawn_blocking(move || backend.page_count(&path, pwd.as_deref()))
        .await
        .map_err(|e| task_panicked("Page count", e))??;
    info!("PDF loaded: {} pages", total);
    Ok(total)
}

pub async fn render_pages(
    backend: &Arc<dyn PdfBackend>,
    pdf: &Path,
    password: Option<&str>,
    size: RasterSize,
    pages: &[usize],
) -> Result<Vec<(usize, DynamicImage)>, SortError> {
    let backend = Arc::clone(backend);
    let path = pdf.to_path_buf();
    let pwd = password.map(str::to_string);
    let pages = pages.to_vec();
    tokio::task::spawn_blocking(move || backend.render_pages(&path, pwd.as_deref(), size, &pages))
    .await
    .map_err(|e| task_panicked("Render", e))?
}

pub async fn extract_pages(
    backend: &Arc<dyn PdfBackend>,
    pdf: &Path,
    password: Option<&str>,
    start: usize,
    end: usize,
) -> Result<Vec<u8>, SortError> {
    let backend = Arc::clone(backend);
    let path = pdf.to_path_buf();
    let pwd = password.map(str::to_string);
    tokio::task::spawn_blocking(move || backend.extract_pages(&path, pwd.as_deref(), start, end))
        .await
        .map_err(|e| task_panicked("Page copy", e))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_index_is_zero_based() {
        assert_eq!(page_index(1).unwrap(), 0);
        assert_eq!(page_index(12).unwrap(), 11);
        assert!(page_index(0).is_err());
    }

    #[test]
    fn raster_size_follows_dpi_until_capped() {
        // A4 portrait: 595 × 842 pt.
        let at_150 = RasterSize {
            dpi: 150,
            max_pixels: 4000,
        };
        assert_eq!(at_150.target(595.0, 842.0), (1240, 1754));

        let at_72 = RasterSize {
            dpi: 72,
            max_pixels: 4000,
        };
        assert_eq!(at_72.target(595.0, 842.0), (595, 842));

        let capped = RasterSize {
            dpi: 300,
            max_pixels: 1600,
        };
        let (w, h) = capped.target(595.0, 842.0);
        assert_eq!(h, 1600);
        assert_eq!(w, 1131);
    }

    #[test]
    fn raster_size_from_config() {
        let config = SortConfig::builder()
            .dpi(120)
            .max_rendered_pixels(900)
            .build()
            .unwrap();
        assert_eq!(
            RasterSize::from_config(&config),
            RasterSize {
                dpi: 120,
                max_pixels: 900
            }
        );
    }

    #[test]
    fn explicit_library_path_is_kept() {
        let backend = PdfiumBackend::with_library("/opt/pdfium/lib");
        assert_eq!(backend.library_path.as_deref(), Some(Path::new("/opt/pdfium/lib")));
    }

    #[test]
    fn binding_to_missing_library_is_an_error() {
        let backend = PdfiumBackend::with_library("/nonexistent/libpdfium.so");
        let err = backend
            .page_count(Path::new("/nonexistent.pdf"), None)
            .unwrap_err();
        assert!(matches!(err, SortError::PdfiumBindingFailed(_)));
    }
}
