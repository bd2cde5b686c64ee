//! Burns placements into PDF page content.
//!
//! Every call to [`composite`] parses the source bytes into a fresh `lopdf::Document`, so
//! the caller's bytes are never touched and repeated exports of the same input produce the
//! same output. Each placement's box is mapped from display pixels into the page's point
//! space with [`PlacementTransform`], then drawn on top of the existing content.

mod embed;
pub mod metrics;
mod page;
mod transform;

pub use embed::{embed_image, EmbedError, EmbeddedImage};
pub use page::FillColor;
pub use transform::PlacementTransform;

use doc_model::{PlacementId, PlacementPayload, PlacementRecord};
use lopdf::{Document, ObjectId};
use page::PageOverlay;
use pdf_engine::page_size_of;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum CompositeError {
    #[error("failed to load source PDF: {0}")]
    Load(#[source] lopdf::Error),
    #[error("placement {id} targets page {page}, but the document has {page_count} pages")]
    PageOutOfRange { id: PlacementId, page: u32, page_count: u32 },
    #[error("failed to embed placement {id}: {reason}")]
    Embed { id: PlacementId, reason: String },
    #[error("failed to serialize PDF: {0}")]
    Serialize(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeOptions {
    pub date_font_size: f32,
    /// Distance from the placement's bottom edge down to the date baseline, in points.
    pub date_offset: f32,
    pub date_color: FillColor,
    pub text_color: FillColor,
}

impl Default for CompositeOptions {
    fn default() -> Self {
        Self {
            date_font_size: 8.0,
            date_offset: 12.0,
            date_color: (0.0, 0.0, 0.7),
            text_color: (0.0, 0.0, 0.0),
        }
    }
}

struct Composer {
    doc: Document,
    pages: BTreeMap<u32, ObjectId>,
    overlays: BTreeMap<u32, PageOverlay>,
    font_id: Option<ObjectId>,
    options: CompositeOptions,
}

impl Composer {
    fn new(source: &[u8], options: CompositeOptions) -> Result<Self, CompositeError> {
        let doc = Document::load_mem(source).map_err(CompositeError::Load)?;
        let pages = doc.get_pages();

        Ok(Self { doc, pages, overlays: BTreeMap::new(), font_id: None, options })
    }

    fn helvetica(&mut self) -> ObjectId {
        *self.font_id.get_or_insert_with(|| page::add_helvetica(&mut self.doc))
    }

    fn place(&mut self, record: &PlacementRecord) -> Result<(), CompositeError> {
        let page_count = self.pages.len() as u32;
        let Some(page_id) = self.pages.get(&record.page_number).copied() else {
            return Err(CompositeError::PageOutOfRange {
                id: record.id,
                page: record.page_number,
                page_count,
            });
        };

        record
            .validate(page_count)
            .map_err(|err| CompositeError::Embed { id: record.id, reason: err.to_string() })?;

        let transform = PlacementTransform::compute(page_size_of(&self.doc, page_id), record);
        tracing::debug!(
            id = %record.id,
            page = record.page_number,
            x = transform.x,
            y = transform.y,
            width = transform.width,
            height = transform.height,
            "placing record"
        );

        let options = self.options;
        let font_id = match (&record.payload, &record.date_stamp) {
            (PlacementPayload::Text(_), _) | (_, Some(_)) => Some(self.helvetica()),
            _ => None,
        };

        let image_id = match &record.payload {
            PlacementPayload::Image(image) => Some(
                embed_image(&mut self.doc, image)
                    .map_err(|err| CompositeError::Embed { id: record.id, reason: err.to_string() })?
                    .id,
            ),
            PlacementPayload::Text(_) => None,
        };

        let doc = &self.doc;
        let overlay = self
            .overlays
            .entry(record.page_number)
            .or_insert_with(|| PageOverlay::new(doc, page_id));

        match (&record.payload, image_id, font_id) {
            (PlacementPayload::Image(_), Some(image_id), _) => {
                overlay.draw_image(image_id, &transform);
            }
            (PlacementPayload::Text(text), _, Some(font_id)) => {
                overlay.draw_text_payload(font_id, text, &transform, options.text_color);
            }
            _ => {}
        }

        if let (Some(date), Some(font_id)) = (&record.date_stamp, font_id) {
            overlay.draw_date_stamp(
                font_id,
                date,
                &transform,
                options.date_font_size,
                options.date_offset,
                options.date_color,
            );
        }

        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>, CompositeError> {
        for overlay in std::mem::take(&mut self.overlays).into_values() {
            if !overlay.is_empty() {
                overlay
                    .install(&mut self.doc)
                    .map_err(|err| CompositeError::Serialize(err.to_string()))?;
            }
        }

        let mut output = Vec::new();
        self.doc
            .save_to(&mut output)
            .map_err(|err| CompositeError::Serialize(err.to_string()))?;
        Ok(output)
    }
}

/// Draws `placements` in list order onto a fresh copy of `source` and serializes it.
///
/// Any failing placement aborts the whole export; no partial output is produced.
pub fn composite(
    source: &[u8],
    placements: &[PlacementRecord],
    options: &CompositeOptions,
) -> Result<Vec<u8>, CompositeError> {
    let mut composer = Composer::new(source, *options)?;

    for record in placements {
        composer.place(record)?;
    }

    let pages_touched = composer.overlays.len();
    let output = composer.finish()?;

    tracing::info!(
        placements = placements.len(),
        pages_touched,
        bytes = output.len(),
        "composited document"
    );

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{EncodedImage, PlacementKind, Position};
    use image::{ImageBuffer, ImageFormat, Rgba};
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object};
    use pdf_engine::test_support::pdf_with_pages;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> EncodedImage {
        let pixels = ImageBuffer::from_pixel(width, height, Rgba([0_u8, 0, 128, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(pixels)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("test png encodes");
        EncodedImage::new(bytes)
    }

    fn image_record(page_number: u32, x: f32, y: f32, width: f32, height: f32) -> PlacementRecord {
        PlacementRecord {
            id: PlacementId::new(),
            kind: PlacementKind::Drawing,
            payload: PlacementPayload::Image(png(4, 2)),
            page_number,
            position: Position::new(x, y),
            width,
            height,
            display_scale: 1.5,
            date_stamp: None,
        }
    }

    fn letter(pages: usize) -> Vec<u8> {
        pdf_with_pages(&vec![(612, 792); pages], false).expect("fixture should serialize")
    }

    fn page_operations(pdf: &[u8], page_number: u32) -> Vec<Operation> {
        let doc = Document::load_mem(pdf).expect("output parses");
        let page_id = doc.get_pages()[&page_number];
        let content = doc.get_page_content(page_id).expect("page content");
        Content::decode(&content).expect("content decodes").operations
    }

    fn floats(operation: &Operation) -> Vec<f32> {
        operation
            .operands
            .iter()
            .map(|operand| operand.as_float().expect("numeric operand"))
            .collect()
    }

    fn operands_of(operations: &[Operation], operator: &str) -> Vec<Vec<f32>> {
        operations.iter().filter(|op| op.operator == operator).map(floats).collect()
    }

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 0.01, "{actual:?} vs {expected:?}");
        }
    }

    #[test]
    fn drawn_box_round_trips_through_output() {
        let record = image_record(1, 100.0, 100.0, 200.0, 50.0);
        let output = composite(&letter(1), &[record], &CompositeOptions::default())
            .expect("composite succeeds");

        let matrices = operands_of(&page_operations(&output, 1), "cm");
        assert_eq!(matrices.len(), 1);
        assert_close(&matrices[0], &[133.333, 0.0, 0.0, 33.333, 66.667, 692.0]);
    }

    #[test]
    fn original_content_is_wrapped_and_overlay_follows() {
        let output = composite(
            &letter(1),
            &[image_record(1, 0.0, 0.0, 918.0, 1188.0)],
            &CompositeOptions::default(),
        )
        .expect("composite succeeds");

        let operators: Vec<_> =
            page_operations(&output, 1).into_iter().map(|op| op.operator).collect();
        assert_eq!(operators, ["q", "m", "Q", "q", "cm", "Do", "Q"]);
    }

    #[test]
    fn placements_keep_list_order_per_page() {
        let records = [
            image_record(1, 10.0, 10.0, 30.0, 30.0),
            image_record(2, 20.0, 20.0, 60.0, 60.0),
            image_record(1, 300.0, 300.0, 90.0, 90.0),
        ];
        let output = composite(&letter(2), &records, &CompositeOptions::default())
            .expect("composite succeeds");

        let first_page = operands_of(&page_operations(&output, 1), "cm");
        let widths: Vec<f32> = first_page.iter().map(|matrix| matrix[0]).collect();
        assert_close(&widths, &[20.0, 60.0]);

        let second_page = operands_of(&page_operations(&output, 2), "cm");
        assert_close(&second_page.iter().map(|m| m[0]).collect::<Vec<_>>(), &[40.0]);
    }

    #[test]
    fn export_is_repeatable_from_unchanged_source() {
        let source = letter(1);
        let records = [image_record(1, 50.0, 60.0, 120.0, 40.0)];

        let first = composite(&source, &records, &CompositeOptions::default()).expect("first");
        let second = composite(&source, &records, &CompositeOptions::default()).expect("second");

        assert_eq!(first, second);
        assert_eq!(source, letter(1));
        assert_eq!(operands_of(&page_operations(&first, 1), "cm").len(), 1);
    }

    #[test]
    fn date_stamp_is_centered_under_the_image() {
        let mut record = image_record(1, 100.0, 100.0, 200.0, 50.0);
        record.date_stamp = Some("1/5/2026".to_owned());

        let output = composite(&letter(1), &[record], &CompositeOptions::default())
            .expect("composite succeeds");
        let operations = page_operations(&output, 1);

        let origin = operands_of(&operations, "Td");
        assert_close(&origin[0], &[133.333 - 15.568, 680.0]);

        let color = operands_of(&operations, "rg");
        assert_close(&color[0], &[0.0, 0.0, 0.7]);

        let font_size = operations
            .iter()
            .find(|op| op.operator == "Tf")
            .and_then(|op| op.operands[1].as_float().ok())
            .expect("Tf present");
        assert_eq!(font_size, 8.0);
    }

    #[test]
    fn text_payload_uses_helvetica_sized_to_box() {
        let record = PlacementRecord {
            payload: PlacementPayload::Text("Approved".to_owned()),
            kind: PlacementKind::Annotation,
            ..image_record(1, 30.0, 30.0, 150.0, 36.0)
        };
        let output = composite(&letter(1), &[record], &CompositeOptions::default())
            .expect("composite succeeds");

        let operations = page_operations(&output, 1);
        let shown = operations.iter().find(|op| op.operator == "Tj").expect("Tj present");
        assert_eq!(shown.operands[0].as_str().expect("string operand"), b"Approved");

        let tf = operations.iter().find(|op| op.operator == "Tf").expect("Tf present");
        assert!((tf.operands[1].as_float().expect("size") - 16.0).abs() < 0.01);

        let doc = Document::load_mem(&output).expect("output parses");
        let page = doc.get_dictionary(doc.get_pages()[&1]).expect("page dict");
        let fonts = page
            .get(b"Resources")
            .and_then(Object::as_dict)
            .and_then(|resources| resources.get(b"Font"))
            .and_then(Object::as_dict)
            .expect("font resources");
        let (_, font_ref) = fonts.iter().next().expect("one font");
        let font = doc.get_dictionary(font_ref.as_reference().expect("ref")).expect("font dict");
        assert_eq!(font.get(b"BaseFont").and_then(Object::as_name).expect("base font"), b"Helvetica");
    }

    #[test]
    fn existing_resource_names_are_not_shadowed() {
        let mut doc = Document::load_mem(&letter(1)).expect("fixture loads");
        let page_id = doc.get_pages()[&1];
        let marker = doc.add_object(dictionary! { "Type" => "XObject", "Subtype" => "Form" });
        let resources = dictionary! {
            "XObject" => dictionary! { "SgImg0" => marker, "SgImg1" => marker },
        };
        doc.get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .expect("page dict")
            .set("Resources", resources);
        let mut source = Vec::new();
        doc.save_to(&mut source).expect("fixture saves");

        let records = [image_record(1, 0.0, 0.0, 50.0, 50.0)];
        let output =
            composite(&source, &records, &CompositeOptions::default()).expect("composite succeeds");

        let out = Document::load_mem(&output).expect("output parses");
        let page = out.get_dictionary(out.get_pages()[&1]).expect("page dict");
        let xobjects = page
            .get(b"Resources")
            .and_then(Object::as_dict)
            .and_then(|resources| resources.get(b"XObject"))
            .and_then(Object::as_dict)
            .expect("xobject resources");
        assert_eq!(xobjects.len(), 3);
        assert_eq!(xobjects.get(b"SgImg0").and_then(Object::as_reference).expect("kept"), marker);

        let drawn = page_operations(&output, 1)
            .into_iter()
            .find(|op| op.operator == "Do")
            .and_then(|op| op.operands[0].as_name().ok().map(<[u8]>::to_vec))
            .expect("Do present");
        assert_ne!(drawn, b"SgImg0".to_vec());
        assert_ne!(drawn, b"SgImg1".to_vec());
    }

    #[test]
    fn page_out_of_range_aborts_export() {
        let record = image_record(3, 0.0, 0.0, 10.0, 10.0);
        let id = record.id;

        let err = composite(&letter(2), &[record], &CompositeOptions::default())
            .expect_err("page 3 does not exist");
        assert!(matches!(
            err,
            CompositeError::PageOutOfRange { id: failed, page: 3, page_count: 2 } if failed == id
        ));
    }

    #[test]
    fn one_corrupt_payload_fails_the_whole_export() {
        let good = image_record(1, 0.0, 0.0, 10.0, 10.0);
        let bad = PlacementRecord {
            payload: PlacementPayload::Image(EncodedImage::new(b"not an image".to_vec())),
            ..image_record(1, 20.0, 20.0, 10.0, 10.0)
        };
        let bad_id = bad.id;

        let err = composite(&letter(1), &[good, bad], &CompositeOptions::default())
            .expect_err("corrupt payload aborts");
        assert!(matches!(err, CompositeError::Embed { id, .. } if id == bad_id));
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        let record = image_record(1, 0.0, 0.0, 0.0, 10.0);
        let err = composite(&letter(1), &[record], &CompositeOptions::default())
            .expect_err("zero width");
        assert!(matches!(err, CompositeError::Embed { .. }));
    }

    #[test]
    fn malformed_source_is_a_load_error() {
        let err = composite(b"%PDF-1.5 garbage", &[], &CompositeOptions::default())
            .expect_err("garbage source");
        assert!(matches!(err, CompositeError::Load(_)));
    }

    #[test]
    fn empty_placement_list_reserializes_unchanged_pages() {
        let output = composite(&letter(2), &[], &CompositeOptions::default()).expect("composite");
        let operators: Vec<_> =
            page_operations(&output, 2).into_iter().map(|op| op.operator).collect();
        assert_eq!(operators, ["m"]);
    }
}
