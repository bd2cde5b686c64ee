//! Pointer gestures on the rendered page.
//!
//! A drag is either drawing a new placement box or moving an existing placement, never
//! both. Coordinates are display pixels relative to the page's top-left corner.

use doc_model::{PlacementBox, PlacementId, Position};

/// Boxes must be strictly larger than this on both axes to count as intentional.
pub const DEFAULT_MIN_BOX_PX: f32 = 5.0;

/// In-progress selection rectangle, normalized for any drag direction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SelectionBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl SelectionBox {
    pub fn spanning(start: Position, current: Position) -> Self {
        Self {
            x: start.x.min(current.x),
            y: start.y.min(current.y),
            width: (current.x - start.x).abs(),
            height: (current.y - start.y).abs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum GestureState {
    #[default]
    Idle,
    DrawingBox {
        start: Position,
        selection: SelectionBox,
    },
    MovingPlacement {
        id: PlacementId,
        /// Pointer position minus placement position at grab time.
        offset: Position,
        position: Position,
    },
}

#[derive(Debug, Clone)]
pub struct GestureController {
    placing: bool,
    state: GestureState,
    min_box_px: f32,
    last_box: Option<PlacementBox>,
}

impl Default for GestureController {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_BOX_PX)
    }
}

impl GestureController {
    pub fn new(min_box_px: f32) -> Self {
        Self { placing: false, state: GestureState::Idle, min_box_px, last_box: None }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn is_placing(&self) -> bool {
        self.placing
    }

    /// Toggles placing mode. A move already in progress is left alone.
    pub fn set_placing(&mut self, placing: bool) {
        self.placing = placing;

        if !placing && matches!(self.state, GestureState::DrawingBox { .. }) {
            self.state = GestureState::Idle;
        }
    }

    pub fn selection(&self) -> Option<SelectionBox> {
        match self.state {
            GestureState::DrawingBox { selection, .. } => Some(selection),
            _ => None,
        }
    }

    pub fn last_box(&self) -> Option<PlacementBox> {
        self.last_box
    }

    pub fn take_last_box(&mut self) -> Option<PlacementBox> {
        self.last_box.take()
    }

    pub fn begin_box(&mut self, pointer: Position) {
        if !self.placing || self.state != GestureState::Idle {
            return;
        }

        self.state = GestureState::DrawingBox {
            start: pointer,
            selection: SelectionBox { x: pointer.x, y: pointer.y, width: 0.0, height: 0.0 },
        };
    }

    pub fn update_box(&mut self, pointer: Position) -> Option<SelectionBox> {
        let GestureState::DrawingBox { start, selection } = &mut self.state else {
            return None;
        };

        *selection = SelectionBox::spanning(*start, pointer);
        Some(*selection)
    }

    /// Finishes the drag. Boxes at or under the minimum size are dropped silently.
    pub fn end_box(&mut self, page_number: u32) -> Option<PlacementBox> {
        let state = std::mem::take(&mut self.state);
        let GestureState::DrawingBox { selection, .. } = state else {
            self.state = state;
            return None;
        };

        if selection.width > self.min_box_px && selection.height > self.min_box_px {
            let finished = PlacementBox {
                page_number,
                position: Position::new(selection.x, selection.y),
                width: selection.width,
                height: selection.height,
            };
            self.last_box = Some(finished);
            tracing::debug!(?finished, "selection box finalized");
            Some(finished)
        } else {
            tracing::debug!(?selection, "selection box below minimum size, discarded");
            None
        }
    }

    pub fn cancel_box(&mut self) {
        if matches!(self.state, GestureState::DrawingBox { .. }) {
            self.state = GestureState::Idle;
        }
    }

    /// Grabs a placement. Ignored while placing or while another drag is active.
    pub fn begin_move(&mut self, pointer: Position, id: PlacementId, position: Position) -> bool {
        if self.placing || self.state != GestureState::Idle {
            return false;
        }

        self.state =
            GestureState::MovingPlacement { id, offset: pointer.offset_from(position), position };
        true
    }

    pub fn update_move(&mut self, pointer: Position) -> Option<(PlacementId, Position)> {
        let GestureState::MovingPlacement { id, offset, position } = &mut self.state else {
            return None;
        };

        *position = pointer.offset_from(*offset);
        Some((*id, *position))
    }

    pub fn end_move(&mut self) -> Option<(PlacementId, Position)> {
        let state = std::mem::take(&mut self.state);
        match state {
            GestureState::MovingPlacement { id, position, .. } => Some((id, position)),
            other => {
                self.state = other;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placing() -> GestureController {
        let mut gestures = GestureController::default();
        gestures.set_placing(true);
        gestures
    }

    fn drag(gestures: &mut GestureController, from: (f32, f32), to: (f32, f32)) -> Option<PlacementBox> {
        gestures.begin_box(Position::new(from.0, from.1));
        gestures.update_box(Position::new(to.0, to.1));
        gestures.end_box(1)
    }

    #[test]
    fn box_is_normalized_for_any_drag_direction() {
        let mut gestures = placing();
        gestures.begin_box(Position::new(50.0, 80.0));
        let selection = gestures.update_box(Position::new(10.0, 20.0)).expect("drawing");

        assert_eq!(selection, SelectionBox { x: 10.0, y: 20.0, width: 40.0, height: 60.0 });
    }

    #[test]
    fn minimum_size_boundary_is_exclusive() {
        let mut gestures = placing();
        assert_eq!(drag(&mut gestures, (10.0, 10.0), (15.0, 15.0)), None);
        assert_eq!(gestures.state(), GestureState::Idle);
        assert_eq!(gestures.last_box(), None);

        let accepted = drag(&mut gestures, (10.0, 10.0), (16.0, 16.0)).expect("6x6 is accepted");
        assert_eq!(accepted.width, 6.0);
        assert_eq!(accepted.height, 6.0);
        assert_eq!(gestures.last_box(), Some(accepted));
    }

    #[test]
    fn thin_boxes_are_discarded_even_if_long() {
        let mut gestures = placing();
        assert_eq!(drag(&mut gestures, (0.0, 0.0), (300.0, 4.0)), None);
    }

    #[test]
    fn begin_box_is_ignored_outside_placing_mode() {
        let mut gestures = GestureController::default();
        gestures.begin_box(Position::new(1.0, 1.0));

        assert_eq!(gestures.state(), GestureState::Idle);
        assert_eq!(gestures.update_box(Position::new(50.0, 50.0)), None);
        assert_eq!(gestures.end_box(1), None);
    }

    #[test]
    fn move_keeps_grab_point_under_pointer() {
        let mut gestures = GestureController::default();
        let id = PlacementId::new();

        assert!(gestures.begin_move(Position::new(110.0, 120.0), id, Position::new(100.0, 100.0)));
        let (moved_id, position) =
            gestures.update_move(Position::new(210.0, 320.0)).expect("moving");

        assert_eq!(moved_id, id);
        assert_eq!(position, Position::new(200.0, 300.0));
        assert_eq!(gestures.end_move(), Some((id, Position::new(200.0, 300.0))));
        assert_eq!(gestures.state(), GestureState::Idle);
    }

    #[test]
    fn placing_mode_blocks_moves_but_not_existing_ones() {
        let mut gestures = placing();
        assert!(!gestures.begin_move(Position::default(), PlacementId::new(), Position::default()));

        gestures.set_placing(false);
        let id = PlacementId::new();
        assert!(gestures.begin_move(Position::new(5.0, 5.0), id, Position::default()));

        gestures.set_placing(true);
        gestures.begin_box(Position::new(0.0, 0.0));
        assert!(matches!(gestures.state(), GestureState::MovingPlacement { .. }));
        assert_eq!(gestures.end_box(1), None);
        assert!(gestures.end_move().is_some());
    }

    #[test]
    fn cancel_discards_selection() {
        let mut gestures = placing();
        gestures.begin_box(Position::new(0.0, 0.0));
        gestures.update_box(Position::new(100.0, 100.0));
        gestures.cancel_box();

        assert_eq!(gestures.selection(), None);
        assert_eq!(gestures.end_box(1), None);
    }
}
