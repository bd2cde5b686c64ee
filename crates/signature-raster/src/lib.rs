//! Signature and annotation rasterization.
//!
//! Turns freehand ink, typed signatures and plain annotation text into transparent PNG
//! images. Text is rendered at a fixed multiple of its target size so the image stays
//! smooth after the compositor scales it into page space.

pub mod color;
pub mod ink;
pub mod text;

pub use color::InkColor;
pub use ink::{render_ink, InkCanvas, InkStroke};
pub use text::{render_plain, render_typed, TextStyle};

/// Render-size multiplier applied to text before encoding.
pub const DEFAULT_OVERSAMPLE: u32 = 4;

/// CSS points to CSS pixels.
pub const PT_TO_PX: f32 = 1.333;

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("nothing to render")]
    EmptyInput,
    #[error("invalid canvas size {width}x{height}")]
    Canvas { width: u32, height: u32 },
    #[error("font error: {0}")]
    Font(String),
    #[error("font has no glyphs for '{0}'")]
    MissingGlyphs(String),
    #[error("invalid color '{0}'")]
    Color(String),
    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

/// An encoded PNG with its pixel dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl SignatureImage {
    pub(crate) fn from_pixmap(pixmap: &tiny_skia::Pixmap) -> Result<Self, RasterError> {
        let png = pixmap.encode_png().map_err(|err| RasterError::Encode(err.to_string()))?;

        Ok(Self { png, width: pixmap.width(), height: pixmap.height() })
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

pub(crate) fn new_pixmap(width: u32, height: u32) -> Result<tiny_skia::Pixmap, RasterError> {
    tiny_skia::Pixmap::new(width, height).ok_or(RasterError::Canvas { width, height })
}
