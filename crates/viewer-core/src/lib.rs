//! Render and placement coordination for the page on screen.
//!
//! [`PlacementCoordinator`] owns the current page number, the displayed page bitmap and the
//! pointer gesture state. Placement records themselves live in `doc_model::PlacementStore`;
//! the coordinator only produces the boxes and moves that feed it.

pub mod gesture;
pub mod render;

pub use gesture::{GestureController, GestureState, SelectionBox, DEFAULT_MIN_BOX_PX};
pub use render::{
    encode_png, render_page_blocking, RenderOutcome, RenderSlot, RenderTicket, RenderedPage,
    DEFAULT_RENDER_TIMEOUT,
};

use doc_model::{PlacementBox, PlacementId, Position, DEFAULT_DISPLAY_SCALE};
use pdf_engine::{DocumentHandle, PageRasterizer, RasterError};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("no document is loaded")]
    NoDocument,
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("invalid render scale {0}")]
    InvalidScale(f32),
    #[error("render backend error: {0}")]
    Backend(String),
    #[error("render timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to encode rendered page: {0}")]
    Encode(String),
}

impl From<RasterError> for RenderError {
    fn from(value: RasterError) -> Self {
        match value {
            // The engine counts pages from zero.
            RasterError::PageOutOfRange { page, page_count } => {
                Self::PageOutOfRange { page: page + 1, page_count }
            }
            RasterError::InvalidScale(scale) => Self::InvalidScale(scale),
            RasterError::Backend(message) => Self::Backend(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorConfig {
    pub display_scale: f32,
    pub min_box_px: f32,
    pub render_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            display_scale: DEFAULT_DISPLAY_SCALE,
            min_box_px: DEFAULT_MIN_BOX_PX,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
        }
    }
}

#[derive(Debug)]
pub struct PlacementCoordinator {
    config: CoordinatorConfig,
    page_count: u32,
    current_page: u32,
    renders: RenderSlot,
    gestures: GestureController,
}

impl Default for PlacementCoordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

impl PlacementCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            page_count: 0,
            current_page: 0,
            renders: RenderSlot::new(),
            gestures: GestureController::new(config.min_box_px),
        }
    }

    pub fn config(&self) -> CoordinatorConfig {
        self.config
    }

    pub fn display_scale(&self) -> f32 {
        self.config.display_scale
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// 1-based; zero while no document is attached.
    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn has_document(&self) -> bool {
        self.page_count > 0
    }

    /// Resets all view state for a newly loaded document and shows its first page.
    pub fn attach(&mut self, page_count: u32) {
        self.page_count = page_count;
        self.current_page = if page_count > 0 { 1 } else { 0 };
        self.renders.invalidate();
        self.gestures = GestureController::new(self.config.min_box_px);
    }

    pub fn detach(&mut self) {
        self.attach(0);
    }

    /// Makes `page_number` the current page and issues a ticket for rendering it.
    pub fn request_page(&mut self, page_number: u32) -> Result<RenderTicket, RenderError> {
        if !self.has_document() {
            return Err(RenderError::NoDocument);
        }
        if page_number == 0 || page_number > self.page_count {
            return Err(RenderError::PageOutOfRange { page: page_number, page_count: self.page_count });
        }

        if page_number != self.current_page {
            self.gestures.cancel_box();
        }
        self.current_page = page_number;

        let ticket = self.renders.begin(page_number);
        tracing::debug!(page = page_number, generation = ticket.generation, "page render requested");
        Ok(ticket)
    }

    pub fn complete_render(
        &mut self,
        ticket: RenderTicket,
        result: Result<RenderedPage, RenderError>,
    ) -> Result<RenderOutcome, RenderError> {
        self.renders.complete(ticket, result)
    }

    /// The bitmap for the current page, once its render has landed.
    pub fn rendered_page_image(&self) -> Option<&RenderedPage> {
        self.renders.current().filter(|page| page.page_number == self.current_page)
    }

    pub fn in_flight(&self) -> Option<RenderTicket> {
        self.renders.in_flight()
    }

    /// Requests and renders `page_number` synchronously with the configured timeout.
    pub fn render_page(
        &mut self,
        rasterizer: Arc<dyn PageRasterizer>,
        document: &DocumentHandle,
        page_number: u32,
    ) -> Result<RenderOutcome, RenderError> {
        let ticket = self.request_page(page_number)?;
        let result = render_page_blocking(
            rasterizer,
            document.clone(),
            page_number,
            self.config.display_scale,
            self.config.render_timeout,
        );
        self.complete_render(ticket, result)
    }

    pub fn gesture_state(&self) -> GestureState {
        self.gestures.state()
    }

    pub fn is_placing(&self) -> bool {
        self.gestures.is_placing()
    }

    pub fn set_placing(&mut self, placing: bool) {
        self.gestures.set_placing(placing);
    }

    pub fn begin_box(&mut self, pointer: Position) {
        if self.has_document() {
            self.gestures.begin_box(pointer);
        }
    }

    pub fn update_box(&mut self, pointer: Position) -> Option<SelectionBox> {
        self.gestures.update_box(pointer)
    }

    /// Finalizes the selection on the current page. Returns `None` for boxes too small
    /// to keep.
    pub fn end_box(&mut self) -> Option<PlacementBox> {
        self.gestures.end_box(self.current_page)
    }

    pub fn cancel_box(&mut self) {
        self.gestures.cancel_box();
    }

    pub fn selection(&self) -> Option<SelectionBox> {
        self.gestures.selection()
    }

    pub fn last_box(&self) -> Option<PlacementBox> {
        self.gestures.last_box()
    }

    pub fn take_last_box(&mut self) -> Option<PlacementBox> {
        self.gestures.take_last_box()
    }

    pub fn begin_move(&mut self, pointer: Position, id: PlacementId, position: Position) -> bool {
        self.gestures.begin_move(pointer, id, position)
    }

    pub fn update_move(&mut self, pointer: Position) -> Option<(PlacementId, Position)> {
        self.gestures.update_move(pointer)
    }

    pub fn end_move(&mut self) -> Option<(PlacementId, Position)> {
        self.gestures.end_move()
    }
}
