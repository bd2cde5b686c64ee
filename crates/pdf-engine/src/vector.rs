//! Vector rendering of page content streams with tiny-skia.
//!
//! Path construction and painting, clipping, colors and form XObjects are interpreted.
//! Text and image operators are skipped.

use crate::{MediaBox, RasterError, RgbaImage};
use image::Rgba;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tiny_skia::{
    Color, FillRule, LineCap, LineJoin, Mask, Paint, Path, PathBuilder, Pixmap, Stroke, Transform,
};

const FORM_DEPTH_LIMIT: usize = 8;
const RESOURCE_DEPTH_LIMIT: usize = 10;

#[derive(Clone)]
struct GraphicsState {
    transform: Transform,
    fill: Color,
    stroke: Color,
    line_width: f32,
    line_cap: LineCap,
    line_join: LineJoin,
    miter_limit: f32,
    clip: Option<Mask>,
}

impl GraphicsState {
    fn new(transform: Transform) -> Self {
        Self {
            transform,
            fill: Color::BLACK,
            stroke: Color::BLACK,
            line_width: 1.0,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            miter_limit: 10.0,
            clip: None,
        }
    }
}

struct Painter<'a> {
    doc: &'a Document,
    pixmap: Pixmap,
    state: GraphicsState,
    saved: Vec<GraphicsState>,
    path: PathBuilder,
    current_point: Option<(f32, f32)>,
    pending_clip: Option<FillRule>,
}

/// Paints one page onto a white canvas of `width`x`height` pixels.
pub(crate) fn rasterize_page(
    doc: &Document,
    page_id: ObjectId,
    media: MediaBox,
    scale: f32,
    width: u32,
    height: u32,
) -> Result<RgbaImage, RasterError> {
    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
        RasterError::Backend(format!("cannot allocate a {width}x{height} canvas"))
    })?;
    pixmap.fill(Color::WHITE);

    // PDF user space is y-up from the MediaBox origin; the canvas is y-down.
    let page_to_canvas =
        Transform::from_row(scale, 0.0, 0.0, -scale, -media.x0 * scale, media.y1 * scale);

    let mut painter = Painter {
        doc,
        pixmap,
        state: GraphicsState::new(page_to_canvas),
        saved: Vec::new(),
        path: PathBuilder::new(),
        current_point: None,
        pending_clip: None,
    };

    let resources = page_resources(doc, page_id);
    for stream_id in doc.get_page_contents(page_id) {
        if let Ok(stream) = doc.get_object(stream_id).and_then(Object::as_stream) {
            painter.run(&stream_content(stream), &resources, FORM_DEPTH_LIMIT);
        }
    }

    let mut image = RgbaImage::new(width, height);
    for (target, source) in image.pixels_mut().zip(painter.pixmap.pixels()) {
        let color = source.demultiply();
        *target = Rgba([color.red(), color.green(), color.blue(), color.alpha()]);
    }

    Ok(image)
}

impl Painter<'_> {
    fn run(&mut self, bytes: &[u8], resources: &Dictionary, depth: usize) {
        let content = match Content::decode(bytes) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(error = %err, "skipping undecodable content stream");
                return;
            }
        };

        for operation in &content.operations {
            self.apply(operation, resources, depth);
        }
    }

    fn apply(&mut self, operation: &Operation, resources: &Dictionary, depth: usize) {
        let numbers: Vec<f32> =
            operation.operands.iter().filter_map(|operand| operand.as_float().ok()).collect();

        match (operation.operator.as_str(), numbers.as_slice()) {
            ("q", _) => self.saved.push(self.state.clone()),
            ("Q", _) => {
                if let Some(state) = self.saved.pop() {
                    self.state = state;
                }
            }
            ("cm", &[a, b, c, d, e, f]) => {
                self.state.transform =
                    self.state.transform.pre_concat(Transform::from_row(a, b, c, d, e, f));
            }

            ("m", &[x, y]) => {
                self.path.move_to(x, y);
                self.current_point = Some((x, y));
            }
            ("l", &[x, y]) => {
                self.path.line_to(x, y);
                self.current_point = Some((x, y));
            }
            ("c", &[x1, y1, x2, y2, x3, y3]) => {
                self.path.cubic_to(x1, y1, x2, y2, x3, y3);
                self.current_point = Some((x3, y3));
            }
            ("v", &[x2, y2, x3, y3]) => {
                let (x1, y1) = self.current_point.unwrap_or((x2, y2));
                self.path.cubic_to(x1, y1, x2, y2, x3, y3);
                self.current_point = Some((x3, y3));
            }
            ("y", &[x1, y1, x3, y3]) => {
                self.path.cubic_to(x1, y1, x3, y3, x3, y3);
                self.current_point = Some((x3, y3));
            }
            ("h", _) => self.path.close(),
            ("re", &[x, y, w, h]) => {
                self.path.move_to(x, y);
                self.path.line_to(x + w, y);
                self.path.line_to(x + w, y + h);
                self.path.line_to(x, y + h);
                self.path.close();
                self.current_point = Some((x, y));
            }

            ("f" | "F", _) => self.paint(Some(FillRule::Winding), false),
            ("f*", _) => self.paint(Some(FillRule::EvenOdd), false),
            ("S", _) => self.paint(None, true),
            ("s", _) => {
                self.path.close();
                self.paint(None, true);
            }
            ("B", _) => self.paint(Some(FillRule::Winding), true),
            ("B*", _) => self.paint(Some(FillRule::EvenOdd), true),
            ("b", _) => {
                self.path.close();
                self.paint(Some(FillRule::Winding), true);
            }
            ("b*", _) => {
                self.path.close();
                self.paint(Some(FillRule::EvenOdd), true);
            }
            ("n", _) => self.paint(None, false),
            ("W", _) => self.pending_clip = Some(FillRule::Winding),
            ("W*", _) => self.pending_clip = Some(FillRule::EvenOdd),

            ("w", &[width]) => self.state.line_width = width.max(0.0),
            ("J", &[cap]) => {
                self.state.line_cap = match cap as i32 {
                    1 => LineCap::Round,
                    2 => LineCap::Square,
                    _ => LineCap::Butt,
                };
            }
            ("j", &[join]) => {
                self.state.line_join = match join as i32 {
                    1 => LineJoin::Round,
                    2 => LineJoin::Bevel,
                    _ => LineJoin::Miter,
                };
            }
            ("M", &[limit]) => self.state.miter_limit = limit.max(1.0),

            ("g" | "rg" | "k" | "sc" | "scn", components) => {
                if let Some(color) = color_from(components) {
                    self.state.fill = color;
                }
            }
            ("G" | "RG" | "K" | "SC" | "SCN", components) => {
                if let Some(color) = color_from(components) {
                    self.state.stroke = color;
                }
            }
            ("cs", _) => self.state.fill = Color::BLACK,
            ("CS", _) => self.state.stroke = Color::BLACK,

            ("Do", _) => {
                if let Some(Ok(name)) = operation.operands.first().map(Object::as_name) {
                    self.draw_form(name, resources, depth);
                }
            }
            _ => {}
        }
    }

    fn paint(&mut self, fill_rule: Option<FillRule>, stroke: bool) {
        let builder = std::mem::replace(&mut self.path, PathBuilder::new());
        let clip_rule = self.pending_clip.take();
        self.current_point = None;

        let Some(path) = builder.finish() else {
            return;
        };
        let transform = self.state.transform;

        if let Some(rule) = fill_rule {
            let paint = solid(self.state.fill);
            self.pixmap.fill_path(&path, &paint, rule, transform, self.state.clip.as_ref());
        }

        if stroke {
            let paint = solid(self.state.stroke);
            let style = Stroke {
                width: self.state.line_width,
                miter_limit: self.state.miter_limit,
                line_cap: self.state.line_cap,
                line_join: self.state.line_join,
                ..Stroke::default()
            };
            self.pixmap.stroke_path(&path, &paint, &style, transform, self.state.clip.as_ref());
        }

        // A clip set with W/W* applies to what is painted after this operator.
        if let Some(rule) = clip_rule {
            self.intersect_clip(&path, rule);
        }
    }

    fn intersect_clip(&mut self, path: &Path, rule: FillRule) {
        let transform = self.state.transform;
        if let Some(mask) = self.state.clip.as_mut() {
            mask.intersect_path(path, rule, true, transform);
            return;
        }

        if let Some(mut mask) = Mask::new(self.pixmap.width(), self.pixmap.height()) {
            mask.fill_path(path, rule, true, transform);
            self.state.clip = Some(mask);
        }
    }

    fn draw_form(&mut self, name: &[u8], resources: &Dictionary, depth: usize) {
        if depth == 0 {
            return;
        }

        let doc = self.doc;
        let Some(form) = resolved_dict(doc, resources.get(b"XObject").ok())
            .and_then(|xobjects| xobjects.get(name).ok())
            .and_then(|object| resolve(doc, object))
            .and_then(|object| object.as_stream().ok())
        else {
            return;
        };

        if form.dict.get(b"Subtype").and_then(Object::as_name).ok() != Some(b"Form".as_slice()) {
            return;
        }

        let matrix = form
            .dict
            .get(b"Matrix")
            .and_then(Object::as_array)
            .ok()
            .and_then(|values| {
                let values: Vec<f32> =
                    values.iter().filter_map(|value| value.as_float().ok()).collect();
                match values.as_slice() {
                    &[a, b, c, d, e, f] => Some(Transform::from_row(a, b, c, d, e, f)),
                    _ => None,
                }
            })
            .unwrap_or_default();
        let form_resources = resolved_dict(doc, form.dict.get(b"Resources").ok())
            .cloned()
            .unwrap_or_else(|| resources.clone());

        self.saved.push(self.state.clone());
        self.state.transform = self.state.transform.pre_concat(matrix);
        self.run(&stream_content(form), &form_resources, depth - 1);
        if let Some(state) = self.saved.pop() {
            self.state = state;
        }
    }
}

fn solid(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color);
    paint.anti_alias = true;
    paint
}

fn color_from(components: &[f32]) -> Option<Color> {
    match *components {
        [gray] => Some(rgb(gray, gray, gray)),
        [r, g, b] => Some(rgb(r, g, b)),
        [c, m, y, k] => {
            Some(rgb((1.0 - c) * (1.0 - k), (1.0 - m) * (1.0 - k), (1.0 - y) * (1.0 - k)))
        }
        _ => None,
    }
}

fn rgb(r: f32, g: f32, b: f32) -> Color {
    Color::from_rgba8(channel(r), channel(g), channel(b), 255)
}

fn channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn stream_content(stream: &Stream) -> Vec<u8> {
    stream.decompressed_content().unwrap_or_else(|_| stream.content.clone())
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    doc.dereference(object).ok().map(|(_, resolved)| resolved)
}

fn resolved_dict<'a>(doc: &'a Document, object: Option<&'a Object>) -> Option<&'a Dictionary> {
    resolve(doc, object?)?.as_dict().ok()
}

/// The page's resource dictionary, inherited from the page tree when absent.
fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut node_id = page_id;

    for _ in 0..RESOURCE_DEPTH_LIMIT {
        let Ok(node) = doc.get_dictionary(node_id) else {
            break;
        };

        if let Some(resources) = resolved_dict(doc, node.get(b"Resources").ok()) {
            return resources.clone();
        }

        match node.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent_id) => node_id = parent_id,
            Err(_) => break,
        }
    }

    Dictionary::new()
}
