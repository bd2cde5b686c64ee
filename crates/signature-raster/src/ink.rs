use crate::{new_pixmap, InkColor, RasterError, SignatureImage};
use tiny_skia::{LineCap, LineJoin, PathBuilder, Stroke, Transform};

/// One pen-down..pen-up polyline in logical canvas pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct InkStroke {
    pub points: Vec<(f32, f32)>,
    pub width: f32,
}

impl InkStroke {
    pub fn new(points: Vec<(f32, f32)>, width: f32) -> Self {
        Self { points, width }
    }
}

/// Signature pad surface: logical size plus the device pixel ratio it was captured at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InkCanvas {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
}

impl InkCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, pixel_ratio: 1.0 }
    }

    pub fn with_pixel_ratio(mut self, ratio: f32) -> Self {
        self.pixel_ratio = ratio.max(1.0);
        self
    }

    fn device_size(&self) -> (u32, u32) {
        (
            (self.width as f32 * self.pixel_ratio).round() as u32,
            (self.height as f32 * self.pixel_ratio).round() as u32,
        )
    }
}

/// Renders freehand strokes onto a transparent canvas.
///
/// A stroke with a single point is drawn as a dot of the pen width.
pub fn render_ink(
    strokes: &[InkStroke],
    canvas: InkCanvas,
    ink: InkColor,
) -> Result<SignatureImage, RasterError> {
    if strokes.iter().all(|stroke| stroke.points.is_empty()) {
        return Err(RasterError::EmptyInput);
    }

    let (width, height) = canvas.device_size();
    let mut pixmap = new_pixmap(width, height)?;
    let paint = ink.to_paint();
    let transform = Transform::from_scale(canvas.pixel_ratio, canvas.pixel_ratio);

    for stroke in strokes {
        let pen = stroke.width.max(0.5);

        match stroke.points.as_slice() {
            [] => {}
            [(x, y)] => {
                if let Some(dot) = PathBuilder::from_circle(*x, *y, pen / 2.0) {
                    pixmap.fill_path(&dot, &paint, tiny_skia::FillRule::Winding, transform, None);
                }
            }
            [(x0, y0), rest @ ..] => {
                let mut builder = PathBuilder::new();
                builder.move_to(*x0, *y0);
                for (x, y) in rest {
                    builder.line_to(*x, *y);
                }

                let Some(path) = builder.finish() else {
                    continue;
                };

                let style = Stroke {
                    width: pen,
                    line_cap: LineCap::Round,
                    line_join: LineJoin::Round,
                    ..Stroke::default()
                };
                pixmap.stroke_path(&path, &paint, &style, transform, None);
            }
        }
    }

    tracing::debug!(strokes = strokes.len(), width, height, "rendered ink signature");

    SignatureImage::from_pixmap(&pixmap)
}
