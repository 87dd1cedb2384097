//! pdfium-backed implementation of the document-backend contract.
//!
//! A bound [`Pdfium`] is neither `Send` nor `Sync`, and every document it
//! opens borrows it. [`PdfiumBackend`] therefore only remembers where the
//! library lives; each `open` binds on the calling (blocking) thread and
//! drops the binding when the visitor returns.
//!
//! Table geometry comes from path objects: each path's straight-line
//! subpaths are turned into ruling edges, descending into form XObjects,
//! and handed to [`lattice::find_tables`] together with the page's
//! positioned characters.

use super::backend::{DocumentBackend, PageSource};
use super::debug;
use super::lattice::{self, BBox, Edge, TextChar};
use crate::config::TableSettings;
use crate::error::ExtractError;
use crate::output::{DocumentInfo, Grid};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Document backend over a pdfium shared library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    library_path: Option<PathBuf>,
}

impl PdfiumBackend {
    /// Locate pdfium and check that it binds.
    ///
    /// Uses `PDFIUM_LIB_PATH` when set, otherwise the system library search path.
    pub fn bind() -> Result<Self, ExtractError> {
        let backend = match std::env::var("PDFIUM_LIB_PATH") {
            Ok(path) if !path.is_empty() => Self::with_library_path(path),
            _ => Self::default(),
        };
        backend.bindings()?;
        Ok(backend)
    }

    /// Backend for the pdfium library at `path`. Binding is deferred to `open`.
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    fn bindings(&self) -> Result<Box<dyn PdfiumLibraryBindings>, ExtractError> {
        match &self.library_path {
            Some(path) => {
                debug!("Binding pdfium from {}", path.display());
                Pdfium::bind_to_library(path)
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| ExtractError::PdfiumBindingFailed(e.to_string()))
    }

    fn pdfium(&self) -> Result<Pdfium, ExtractError> {
        Ok(Pdfium::new(self.bindings()?))
    }

/// Render one page with its detected rulings and cells drawn on top.
    ///
    /// `page_index` is 0-based. Returns PNG bytes.
    pub fn render_table_debug(
        &self,
        path: &Path,
        password: Option<&str>,
        page_index: usize,
        settings: &TableSettings,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractError> {
        let pdfium = self.pdfium()?;
        let document = load(&pdfium, path, password)?;
        let pages = document.pages();
        let total = pages.len() as usize;
        if page_index >= total {
            return Err(ExtractError::PageOutOfRange {
                page: page_index + 1,
                total,
            });
        }

        let render_failed = |detail: String| ExtractError::RenderFailed {
            page: page_index + 1,
            detail,
        };

        let page = pages
            .get(page_index as u16)
            .map_err(|e| render_failed(format!("{:?}", e)))?;
        let width_pts = page.width().value;
        let target_width = (width_pts * dpi as f32 / 72.0).round().max(1.0) as i32;
        let render_config = PdfRenderConfig::new().set_target_width(target_width);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| render_failed(format!("{:?}", e)))?;
        let image = bitmap.as_image();

        let (edges, chars) = page_geometry(&page).map_err(render_failed)?;
        let finding = lattice::find_tables(&edges, &chars, settings);
        debug!(
            "Debug render page {}: {} edges, {} cells, {} tables",
            page_index + 1,
            finding.edges.len(),
            finding.cells.len(),
            finding.tables.len()
        );

        let scale = image.width() as f32 / width_pts;
        let overlay = debug::overlay(image, &finding, scale);
        debug::encode_png(&overlay).map_err(|e| render_failed(e.to_string()))
    }
}

impl DocumentBackend for PdfiumBackend {
    fn open(
        &self,
        path: &Path,
        password: Option<&str>,
        visit: &mut dyn FnMut(&dyn PageSource),
    ) -> Result<(), ExtractError> {
        let pdfium = self.pdfium()?;
        let document = load(&pdfium, path, password)?;
        info!("PDF loaded: {} pages", document.pages().len());
        visit(&PdfiumPageSource { document });
        Ok(())
    }
}

fn load<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, ExtractError> {
    pdfium.load_pdf_from_file(path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                ExtractError::WrongPassword
            } else {
                ExtractError::PasswordRequired
            }
        } else {
            ExtractError::CorruptPdf { detail: err_str }
        }
    })
}

struct PdfiumPageSource<'a> {
    document: PdfDocument<'a>,
}

impl PdfiumPageSource<'_> {
    fn page(&self, index: usize) -> Result<PdfPage<'_>, String> {
        let idx = u16::try_from(index)
            .map_err(|_| format!("page index {index} exceeds the pdfium page limit"))?;
        self.document
            .pages()
            .get(idx)
            .map_err(|e| format!("{:?}", e))
    }
}

impl PageSource for PdfiumPageSource<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_text(&self, index: usize) -> Result<Option<String>, String> {
        let page = self.page(index)?;
        let text = page.text().map_err(|e| format!("{:?}", e))?.all();
        Ok(if text.is_empty() { None } else { Some(text) })
    }

    fn page_tables(&self, index: usize, settings: &TableSettings) -> Result<Vec<Grid>, String> {
        let page = self.page(index)?;
        let (edges, chars) = page_geometry(&page)?;
        let finding = lattice::find_tables(&edges, &chars, settings);
        debug!(
            "Page {}: {} edges, {} cells, {} raw tables",
            index + 1,
            finding.edges.len(),
            finding.cells.len(),
            finding.tables.len()
        );
        Ok(finding.tables)
    }

    fn info(&self) -> DocumentInfo {
        let metadata = self.document.metadata();
        let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
            metadata.get(tag).and_then(|t| {
                let v = t.value().to_string();
                if v.is_empty() {
                    None
                } else {
                    Some(v)
                }
            })
        };

        DocumentInfo {
            page_count: self.page_count(),
            title: get_meta(PdfDocumentMetadataTagType::Title),
            author: get_meta(PdfDocumentMetadataTagType::Author),
            subject: get_meta(PdfDocumentMetadataTagType::Subject),
            creator: get_meta(PdfDocumentMetadataTagType::Creator),
            producer: get_meta(PdfDocumentMetadataTagType::Producer),
            pdf_version: Some(format!("{:?}", self.document.version())),
        }
    }
}

/// Ruling edges and positioned characters of a page, in top-left coordinates.
fn page_geometry(page: &PdfPage<'_>) -> Result<(Vec<Edge>, Vec<TextChar>), String> {
    let height = page.height().value;
    let flip = |left: f32, top: f32, right: f32, bottom: f32| {
        BBox::new(left, height - top, right, height - bottom)
    };

    let mut edges = Vec::new();
    for object in page.objects().iter() {
        collect_edges(&object, Affine::IDENTITY, height, &mut edges)?;
    }

    let text = page.text().map_err(|e| format!("{:?}", e))?;
    let chars = text
        .chars()
        .iter()
        .filter_map(|c| {
            let ch = c.unicode_char()?;
            let b = c.loose_bounds().ok()?;
            Some(TextChar {
                ch,
                bbox: flip(b.left().value, b.top().value, b.right().value, b.bottom().value),
            })
        })
        .collect();

    Ok((edges, chars))
}

/// Append the ruling edges drawn by `object`.
///
/// Path segments come back in the coordinate space of the object's parent;
/// `to_page` carries the matrices of the enclosing form XObjects.
fn collect_edges(
    object: &PdfPageObject<'_>,
    to_page: Affine,
    height: f32,
    edges: &mut Vec<Edge>,
) -> Result<(), String> {
    if let Some(form) = object.as_x_object_form_object() {
        let matrix = form.matrix().map_err(|e| format!("{:?}", e))?;
        let inner = Affine::from_matrix(&matrix).then(to_page);
        for index in 0..form.len() {
            let child = form.get(index).map_err(|e| format!("{:?}", e))?;
            collect_edges(&child, inner, height, edges)?;
        }
        return Ok(());
    }

    let Some(path) = object.as_path_object() else {
        return Ok(());
    };
    let to_top_left = |x: PdfPoints, y: PdfPoints| {
        let (x, y) = to_page.apply(x.value, y.value);
        (x, height - y)
    };

    let segments = path.segments();
    if segments.len() == 0 {
        let b = object.bounds().map_err(|e| format!("{:?}", e))?;
        let (x0, top) = to_top_left(b.left(), b.top());
        let (x1, bottom) = to_top_left(b.right(), b.bottom());
        edges.extend(lattice::edges_from_rect(BBox::new(x0, top, x1, bottom)));
        return Ok(());
    }

    let mut subpath: Vec<(f32, f32)> = Vec::new();
    let mut start = None;
    for segment in segments.iter() {
        let point = to_top_left(segment.x(), segment.y());
        match segment.segment_type() {
            PdfPathSegmentType::LineTo => subpath.push(point),
            kind => {
                edges.extend(lattice::edges_from_path(&subpath));
                subpath.clear();
                subpath.push(point);
                if matches!(kind, PdfPathSegmentType::MoveTo) {
                    start = Some(point);
                }
            }
        }
        if segment.is_close() {
            if let Some(first) = start {
                subpath.push(first);
            }
        }
    }
    edges.extend(lattice::edges_from_path(&subpath));
    Ok(())
}

/// 2D affine transform in PDF matrix order: `x' = a·x + c·y + e`, `y' = b·x + d·y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Affine([f32; 6]);

impl Affine {
    const IDENTITY: Affine = Affine([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn from_matrix(m: &PdfMatrix) -> Self {
        Affine([m.a(), m.b(), m.c(), m.d(), m.e(), m.f()])
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    /// `self` followed by `outer`.
    fn then(self, outer: Affine) -> Affine {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = outer.0;
        Affine([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn backend_can_be_shared_across_threads() {
        assert_send_sync::<PdfiumBackend>();
        assert_send_sync::<std::sync::Arc<dyn DocumentBackend>>();
    }

    #[test]
    fn binding_happens_on_open() {
        let backend = PdfiumBackend::with_library_path("/nonexistent/libpdfium.so");
        let mut visited = false;
        let err = backend
            .open(Path::new("manifest.pdf"), None, &mut |_| visited = true)
            .unwrap_err();
        assert!(matches!(err, ExtractError::PdfiumBindingFailed(_)));
        assert!(!visited);
    }

    #[test]
    fn form_matrix_is_applied_before_the_page() {
        // Form scaled by 2, placed at (100, 50) on the page.
        let form = Affine([2.0, 0.0, 0.0, 2.0, 100.0, 50.0]);
        assert_eq!(form.apply(10.0, 5.0), (120.0, 60.0));

        let nested = Affine([1.0, 0.0, 0.0, 1.0, 3.0, 4.0]).then(form);
        assert_eq!(nested.apply(0.0, 0.0), (106.0, 58.0));
        assert_eq!(Affine::IDENTITY.then(form), form);
    }
}
