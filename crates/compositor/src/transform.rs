use doc_model::PlacementRecord;
use pdf_engine::PageSize;

/// Where a placement lands in PDF user space (points, origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementTransform {
    pub scale_x: f32,
    pub scale_y: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PlacementTransform {
    /// Maps a record's display-pixel box onto `page`.
    ///
    /// The viewport is the page rendered at the record's own display scale; the two axes
    /// are scaled independently and the y axis is flipped so `y` is the box's bottom edge.
    pub fn compute(page: PageSize, record: &PlacementRecord) -> Self {
        let viewport = page.viewport(record.display_scale);
        let scale_x = page.width_pt / viewport.width_px;
        let scale_y = page.height_pt / viewport.height_px;

        Self {
            scale_x,
            scale_y,
            x: record.position.x * scale_x,
            y: page.height_pt - record.position.y * scale_y - record.height * scale_y,
            width: record.width * scale_x,
            height: record.height * scale_y,
        }
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    /// `[a b c d e f]` operands of the `cm` that maps the unit square onto the box.
    pub fn image_matrix(&self) -> [f32; 6] {
        [self.width, 0.0, 0.0, self.height, self.x, self.y]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{EncodedImage, PlacementId, PlacementKind, PlacementPayload, Position};

    const LETTER: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

    fn record(x: f32, y: f32, width: f32, height: f32, display_scale: f32) -> PlacementRecord {
        PlacementRecord {
            id: PlacementId::new(),
            kind: PlacementKind::Image,
            payload: PlacementPayload::Image(EncodedImage::new(vec![0x89])),
            page_number: 1,
            position: Position::new(x, y),
            width,
            height,
            display_scale,
            date_stamp: None,
        }
    }

    fn assert_close(actual: f32, expected: f32) {
        assert!((actual - expected).abs() < 0.01, "expected {expected}, got {actual}");
    }

    #[test]
    fn letter_page_at_display_scale() {
        let transform = PlacementTransform::compute(LETTER, &record(100.0, 100.0, 200.0, 50.0, 1.5));

        assert_close(transform.x, 66.67);
        assert_close(transform.y, 692.0);
        assert_close(transform.width, 133.33);
        assert_close(transform.height, 33.33);
    }

    #[test]
    fn box_touching_viewport_bottom_lands_on_page_bottom() {
        let transform = PlacementTransform::compute(LETTER, &record(0.0, 1138.0, 100.0, 50.0, 1.5));
        assert_close(transform.y, 0.0);
    }

    #[test]
    fn full_viewport_box_covers_the_page() {
        let transform = PlacementTransform::compute(LETTER, &record(0.0, 0.0, 918.0, 1188.0, 1.5));

        assert_close(transform.x, 0.0);
        assert_close(transform.y, 0.0);
        assert_close(transform.width, 612.0);
        assert_close(transform.height, 792.0);
    }

    #[test]
    fn axes_scale_independently_and_follow_the_record_scale() {
        let landscape = PageSize { width_pt: 842.0, height_pt: 595.0 };
        let transform = PlacementTransform::compute(landscape, &record(20.0, 40.0, 100.0, 60.0, 2.0));

        assert_close(transform.scale_x, 0.5);
        assert_close(transform.scale_y, 0.5);
        assert_close(transform.x, 10.0);
        assert_close(transform.y, 595.0 - 20.0 - 30.0);
        assert_eq!(
            transform.image_matrix(),
            [transform.width, 0.0, 0.0, transform.height, transform.x, transform.y]
        );
    }
}
