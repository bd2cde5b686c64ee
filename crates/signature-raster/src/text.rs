use crate::{new_pixmap, InkColor, RasterError, SignatureImage, DEFAULT_OVERSAMPLE, PT_TO_PX};
use tiny_skia::{FillRule, PathBuilder, Pixmap, Transform};
use ttf_parser::{Face, GlyphId, OutlineBuilder};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub font_size_pt: f32,
    pub ink: InkColor,
    pub oversample: u32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self { font_size_pt: 12.0, ink: InkColor::BLACK, oversample: DEFAULT_OVERSAMPLE }
    }
}

impl TextStyle {
    pub fn font_px(&self) -> f32 {
        self.font_size_pt * PT_TO_PX * self.oversample.max(1) as f32
    }
}

/// Horizontal padding (per side, before oversampling) and height factor of a text canvas.
#[derive(Debug, Clone, Copy)]
struct TextLayout {
    padding: f32,
    height_factor: f32,
}

const TYPED_LAYOUT: TextLayout = TextLayout { padding: 20.0, height_factor: 1.8 };
const PLAIN_LAYOUT: TextLayout = TextLayout { padding: 5.0, height_factor: 1.5 };

/// Typed signature in a caller-chosen (usually script) font.
pub fn render_typed(
    text: &str,
    font_data: &[u8],
    style: TextStyle,
) -> Result<SignatureImage, RasterError> {
    render_line(text, font_data, style, TYPED_LAYOUT)
}

/// Annotation text in a plain, readable font.
pub fn render_plain(
    text: &str,
    font_data: &[u8],
    style: TextStyle,
) -> Result<SignatureImage, RasterError> {
    render_line(text, font_data, style, PLAIN_LAYOUT)
}

struct PathConverter(PathBuilder);

impl OutlineBuilder for PathConverter {
    fn move_to(&mut self, x: f32, y: f32) {
        self.0.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.0.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.0.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.0.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.0.close();
    }
}

fn glyphs_for(face: &Face<'_>, text: &str) -> Vec<GlyphId> {
    text.chars().map(|ch| face.glyph_index(ch).unwrap_or(GlyphId(0))).collect()
}

fn advance_units(face: &Face<'_>, glyphs: &[GlyphId]) -> f32 {
    glyphs.iter().map(|glyph| face.glyph_hor_advance(*glyph).unwrap_or(0) as f32).sum()
}

fn render_line(
    text: &str,
    font_data: &[u8],
    style: TextStyle,
    layout: TextLayout,
) -> Result<SignatureImage, RasterError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(RasterError::EmptyInput);
    }

    let face = Face::parse(font_data, 0).map_err(|err| RasterError::Font(err.to_string()))?;
    let units_per_em = face.units_per_em() as f32;
    if units_per_em <= 0.0 {
        return Err(RasterError::Font("font reports zero units per em".to_owned()));
    }

    let oversample = style.oversample.max(1) as f32;
    let font_px = style.font_px();
    let scale = font_px / units_per_em;
    let glyphs = glyphs_for(&face, text);
    if glyphs.iter().all(|glyph| *glyph == GlyphId(0)) {
        return Err(RasterError::MissingGlyphs(text.to_owned()));
    }

    let text_width = advance_units(&face, &glyphs) * scale;
    let padding = layout.padding * oversample;
    let width = (text_width + 2.0 * padding).ceil() as u32;
    let height = (font_px * layout.height_factor).ceil() as u32;

    let mut pixmap = new_pixmap(width, height)?;

    // Vertically centre the em box, like a canvas "middle" baseline.
    let em_center = (face.ascender() as f32 + face.descender() as f32) / 2.0 * scale;
    let baseline = height as f32 / 2.0 + em_center;

    draw_glyphs(&mut pixmap, &face, &glyphs, padding, baseline, scale, style.ink);

    tracing::debug!(chars = text.chars().count(), width, height, "rendered text image");

    SignatureImage::from_pixmap(&pixmap)
}

fn draw_glyphs(
    pixmap: &mut Pixmap,
    face: &Face<'_>,
    glyphs: &[GlyphId],
    start_x: f32,
    baseline: f32,
    scale: f32,
    ink: InkColor,
) {
    let paint = ink.to_paint();
    let mut pen_x = start_x;

    for glyph in glyphs {
        let mut converter = PathConverter(PathBuilder::new());
        if face.outline_glyph(*glyph, &mut converter).is_some() {
            if let Some(path) = converter.0.finish() {
                // Font units are y-up; the pixmap is y-down.
                let transform = Transform::from_row(scale, 0.0, 0.0, -scale, pen_x, baseline);
                pixmap.fill_path(&path, &paint, FillRule::Winding, transform, None);
            }
        }

        pen_x += face.glyph_hor_advance(*glyph).unwrap_or(0) as f32 * scale;
    }
}
