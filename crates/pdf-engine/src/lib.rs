use image::{ImageBuffer, Rgba};
use lopdf::{Document, Object, ObjectId};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod vector;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// US Letter, used when a page carries no readable MediaBox.
pub const FALLBACK_PAGE_SIZE: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

const MEDIA_BOX_DEPTH_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    /// Size of this page in display pixels when rendered at `scale`.
    pub fn viewport(self, scale: f32) -> Viewport {
        Viewport { width_px: self.width_pt * scale, height_px: self.height_pt * scale }
    }
}

/// A page's MediaBox corners in user space, normalized so `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl MediaBox {
    pub fn size(self) -> PageSize {
        PageSize { width_pt: self.x1 - self.x0, height_pt: self.y1 - self.y0 }
    }
}

impl From<PageSize> for MediaBox {
    fn from(size: PageSize) -> Self {
        Self { x0: 0.0, y0: 0.0, x1: size.width_pt, y1: size.height_pt }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width_px: f32,
    pub height_px: f32,
}

impl Viewport {
    pub fn pixel_dimensions(self) -> (u32, u32) {
        (self.width_px.round().max(1.0) as u32, self.height_px.round().max(1.0) as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_index: 0, scale: 1.5 }
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Accept files carrying an `/Encrypt` dictionary instead of rejecting them.
    pub ignore_encryption: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { ignore_encryption: true }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("encrypted PDFs are not supported without ignore_encryption")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    NoPages,
}

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("invalid render scale {0}")]
    InvalidScale(f32),
    #[error("backend error: {0}")]
    Backend(String),
}

/// A loaded source document.
///
/// Holds the original bytes for the document's whole lifetime. Anything that edits the
/// document derives a fresh `lopdf::Document` from these bytes via [`Self::fresh_document`],
/// so the source is never mutated and clones are cheap.
#[derive(Clone)]
pub struct DocumentHandle {
    bytes: Arc<[u8]>,
    page_sizes: Arc<[PageSize]>,
}

impl fmt::Debug for DocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("len", &self.bytes.len())
            .field("page_count", &self.page_sizes.len())
            .finish()
    }
}

impl DocumentHandle {
    pub fn open(source: OpenSource, options: LoadOptions) -> Result<Self, LoadError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        Self::load(bytes, options)
    }

    pub fn load(bytes: Vec<u8>, options: LoadOptions) -> Result<Self, LoadError> {
        if !options.ignore_encryption
            && bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt")
        {
            return Err(LoadError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(&bytes)?;
        let page_sizes = parse_sizes(&doc);

        if page_sizes.is_empty() {
            return Err(LoadError::NoPages);
        }

        tracing::info!(bytes = bytes.len(), pages = page_sizes.len(), "loaded PDF document");

        Ok(Self { bytes: Arc::from(bytes), page_sizes: Arc::from(page_sizes) })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    pub fn page_sizes(&self) -> &[PageSize] {
        &self.page_sizes
    }

    pub fn page_size(&self, page_index: u32) -> Result<PageSize, RasterError> {
        self.page_sizes.get(page_index as usize).copied().ok_or(RasterError::PageOutOfRange {
            page: page_index,
            page_count: self.page_count(),
        })
    }

    /// Parses a new, independent editable document from the retained bytes.
    pub fn fresh_document(&self) -> Result<Document, LoadError> {
        Ok(Document::load_mem(&self.bytes)?)
    }
}

fn parse_sizes(doc: &Document) -> Vec<PageSize> {
    doc.get_pages().into_values().map(|page_id| page_size_of(doc, page_id)).collect()
}

/// Resolves a page's size from its MediaBox, walking up the page tree for inherited boxes.
pub fn page_size_of(doc: &Document, page_id: ObjectId) -> PageSize {
    media_box_of(doc, page_id).size()
}

/// The page's MediaBox, inherited from the page tree when the page has none.
pub fn media_box_of(doc: &Document, page_id: ObjectId) -> MediaBox {
    media_box(doc, page_id, MEDIA_BOX_DEPTH_LIMIT).unwrap_or(MediaBox::from(FALLBACK_PAGE_SIZE))
}

fn media_box(doc: &Document, node_id: ObjectId, depth: usize) -> Option<MediaBox> {
    if depth == 0 {
        return None;
    }

    let dict = doc.get_dictionary(node_id).ok()?;

    if let Ok(object) = dict.get(b"MediaBox") {
        let array = match object {
            Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok()?,
            other => other.as_array().ok()?,
        };

        if array.len() == 4 {
            let x0 = array[0].as_float().ok()?;
            let y0 = array[1].as_float().ok()?;
            let x1 = array[2].as_float().ok()?;
            let y1 = array[3].as_float().ok()?;
            return Some(MediaBox {
                x0: x0.min(x1),
                y0: y0.min(y1),
                x1: x0.max(x1),
                y1: y0.max(y1),
            });
        }
    }

    let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
    media_box(doc, parent, depth - 1)
}

/// Turns one page of a document into pixels.
///
/// Implementations must not share mutable state between calls, so rendering two pages
/// concurrently is safe.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(
        &self,
        document: &DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, RasterError>;
}

fn checked_viewport(document: &DocumentHandle, request: RenderRequest) -> Result<Viewport, RasterError> {
    if !request.scale.is_finite() || request.scale <= 0.0 {
        return Err(RasterError::InvalidScale(request.scale));
    }

    Ok(document.page_size(request.page_index)?.viewport(request.scale))
}

/// Pure-Rust backend: lopdf parses the page, tiny-skia paints it.
///
/// Draws path content (fills, strokes and clipping, including inside form XObjects) on a
/// white page. Text and images are not drawn; the `pdfium` backend renders them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfRasterizer;

impl LopdfRasterizer {
    pub fn new() -> Self {
        Self
    }
}

impl PageRasterizer for LopdfRasterizer {
    fn rasterize(
        &self,
        document: &DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, RasterError> {
        let (width, height) = checked_viewport(document, request)?.pixel_dimensions();

        let doc = document.fresh_document().map_err(|err| RasterError::Backend(err.to_string()))?;
        let page_id = doc.get_pages().get(&(request.page_index + 1)).copied().ok_or(
            RasterError::PageOutOfRange { page: request.page_index, page_count: document.page_count() },
        )?;
        let media = media_box_of(&doc, page_id);

        let image = vector::rasterize_page(&doc, page_id, media, request.scale, width, height)?;

        tracing::debug!(page = request.page_index, width, height, "rasterized page");

        Ok(image)
    }
}

#[cfg(feature = "pdfium")]
pub mod pdfium_backend {
    use super::*;
    use pdfium_render::prelude::*;

    pub struct PdfiumRasterizer {
        pdfium: Pdfium,
    }

    impl PdfiumRasterizer {
        pub fn from_system_library() -> Result<Self, RasterError> {
            let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|err| {
                    RasterError::Backend(format!("failed to bind pdfium library: {err}"))
                })?;

            Ok(Self { pdfium: Pdfium::new(bindings) })
        }
    }

    impl PageRasterizer for PdfiumRasterizer {
        fn rasterize(
            &self,
            document: &DocumentHandle,
            request: RenderRequest,
        ) -> Result<RgbaImage, RasterError> {
            let (width, height) = checked_viewport(document, request)?.pixel_dimensions();

            let pdf = self
                .pdfium
                .load_pdf_from_byte_slice(document.bytes(), None)
                .map_err(|err| RasterError::Backend(err.to_string()))?;
            let page = pdf
                .pages()
                .get(request.page_index as u16)
                .map_err(|err| RasterError::Backend(err.to_string()))?;

            let config = PdfRenderConfig::new()
                .set_target_width(width as i32)
                .set_target_height(height as i32);
            let bitmap =
                page.render_with_config(&config).map_err(|err| RasterError::Backend(err.to_string()))?;

            RgbaImage::from_raw(bitmap.width() as u32, bitmap.height() as u32, bitmap.as_rgba_bytes())
                .ok_or_else(|| RasterError::Backend("pdfium returned a short bitmap".to_owned()))
        }
    }
}

/// The best backend available in this build.
///
/// With the `pdfium` feature this binds pdfium and falls back to [`LopdfRasterizer`] when
/// the library cannot be loaded.
pub fn default_rasterizer() -> Arc<dyn PageRasterizer> {
    #[cfg(feature = "pdfium")]
    {
        match pdfium_backend::PdfiumRasterizer::from_system_library() {
            Ok(rasterizer) => return Arc::new(rasterizer),
            Err(err) => {
                tracing::warn!(error = %err, "pdfium unavailable, falling back to the lopdf rasterizer");
            }
        }
    }

    Arc::new(LopdfRasterizer::new())
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{pdf_with_content, pdf_with_pages};

    fn fixture(sizes: &[(i64, i64)], inherit_first: bool) -> Vec<u8> {
        pdf_with_pages(sizes, inherit_first).expect("fixture should serialize")
    }

    #[test]
    fn loads_pdf_and_reads_page_sizes() {
        let handle = DocumentHandle::load(
            fixture(&[(612, 792), (842, 595)], false),
            LoadOptions::default(),
        )
        .expect("load should succeed");

        assert_eq!(handle.page_count(), 2);
        assert_eq!(handle.page_size(1).expect("page 1"), PageSize { width_pt: 842.0, height_pt: 595.0 });
    }

    #[test]
    fn inherited_media_box_is_resolved() {
        let handle =
            DocumentHandle::load(fixture(&[(300, 400)], true), LoadOptions::default())
                .expect("load should succeed");

        assert_eq!(handle.page_size(0).expect("page 0"), PageSize { width_pt: 300.0, height_pt: 400.0 });
    }

    #[test]
    fn malformed_bytes_fail_to_load() {
        let err = DocumentHandle::load(b"not a pdf".to_vec(), LoadOptions::default())
            .expect_err("garbage should not load");

        assert!(matches!(err, LoadError::Parse(_)));
    }

    #[test]
    fn encrypted_marker_is_rejected_unless_ignored() {
        let mut bytes = fixture(&[(612, 792)], false);
        bytes.extend_from_slice(b"\n% /Encrypt\n");

        let err = DocumentHandle::load(bytes, LoadOptions { ignore_encryption: false })
            .expect_err("encrypted marker should be rejected");
        assert!(matches!(err, LoadError::EncryptedUnsupported));
    }

    #[test]
    fn viewport_scales_page_size() {
        let viewport = PageSize { width_pt: 612.0, height_pt: 792.0 }.viewport(1.5);
        assert_eq!(viewport, Viewport { width_px: 918.0, height_px: 1188.0 });
        assert_eq!(viewport.pixel_dimensions(), (918, 1188));
    }

    #[test]
    fn rasterizer_matches_viewport_and_checks_range() {
        let handle = DocumentHandle::load(fixture(&[(612, 792)], false), LoadOptions::default())
            .expect("load should succeed");
        let rasterizer = LopdfRasterizer::new();

        let image = rasterizer
            .rasterize(&handle, RenderRequest { page_index: 0, scale: 1.5 })
            .expect("render should succeed");
        assert_eq!(image.dimensions(), (918, 1188));

        let err = rasterizer
            .rasterize(&handle, RenderRequest { page_index: 3, scale: 1.5 })
            .expect_err("page 3 does not exist");
        assert!(matches!(err, RasterError::PageOutOfRange { page: 3, page_count: 1 }));
    }

    #[test]
    fn media_box_origin_is_kept() {
        let doc = Document::load_mem(&fixture(&[(300, 400)], true)).expect("fixture parses");
        let page_id = doc.get_pages()[&1];

        assert_eq!(media_box_of(&doc, page_id), MediaBox { x0: 0.0, y0: 0.0, x1: 300.0, y1: 400.0 });
    }

    #[test]
    fn default_rasterizer_draws_page_content() {
        let bytes = pdf_with_content((612, 792), b"0 0 0 rg 0 0 612 792 re f")
            .expect("fixture should serialize");
        let handle = DocumentHandle::load(bytes, LoadOptions::default()).expect("load should succeed");

        let image = default_rasterizer()
            .rasterize(&handle, RenderRequest { page_index: 0, scale: 1.0 })
            .expect("render should succeed");

        assert_eq!(image.dimensions(), (612, 792));
        assert_eq!(image.get_pixel(306, 396).0, [0, 0, 0, 255]);
    }

    #[cfg(feature = "pdfium")]
    #[test]
    fn pdfium_backend_draws_page_content() {
        let rasterizer = match pdfium_backend::PdfiumRasterizer::from_system_library() {
            Ok(rasterizer) => rasterizer,
            Err(err) => {
                eprintln!("skipping: {err}");
                return;
            }
        };
        let bytes = pdf_with_content((612, 792), b"0 0 0 rg 0 0 612 792 re f")
            .expect("fixture should serialize");
        let handle = DocumentHandle::load(bytes, LoadOptions::default()).expect("load should succeed");

        let image = rasterizer
            .rasterize(&handle, RenderRequest { page_index: 0, scale: 1.0 })
            .expect("render should succeed");

        assert_eq!(image.dimensions(), (612, 792));
        assert_eq!(image.get_pixel(306, 396).0, [0, 0, 0, 255]);
    }

    #[test]
    fn fresh_documents_are_independent() {
        let handle = DocumentHandle::load(fixture(&[(612, 792)], false), LoadOptions::default())
            .expect("load should succeed");
        let before = handle.bytes().to_vec();

        let mut doc = handle.fresh_document().expect("fresh document");
        doc.objects.clear();

        let again = handle.fresh_document().expect("second fresh document");
        assert_eq!(again.get_pages().len(), 1);
        assert_eq!(handle.bytes(), before.as_slice());
    }
}
