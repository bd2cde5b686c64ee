use crate::config::{ConfigError, SignerConfig};
use crate::export_gate::ExportGate;
use compositor::CompositeError;
use doc_model::{
    date_stamp_today, fit_to_box, EncodedImage, ModelError, PlacementAction, PlacementBox,
    PlacementId, PlacementKind, PlacementPayload, PlacementRecord, PlacementSnapshot,
    PlacementStore, Position,
};
use pdf_engine::{default_rasterizer, DocumentHandle, LoadError, OpenSource, PageRasterizer};
use signature_raster::{render_plain, render_typed, InkColor, SignatureImage};
use std::sync::Arc;
use viewer_core::{
    GestureState, PlacementCoordinator, RenderError, RenderOutcome, RenderedPage, SelectionBox,
};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no document is loaded")]
    NoDocument,
    #[error("an export is already in progress")]
    ExportInProgress,
    #[error("no finished selection box to place into")]
    NoPendingBox,
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Composite(#[from] CompositeError),
    #[error(transparent)]
    Raster(#[from] signature_raster::RasterError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One open document with its placements and view state.
pub struct SigningSession {
    config: SignerConfig,
    rasterizer: Arc<dyn PageRasterizer>,
    document: Option<DocumentHandle>,
    placements: PlacementStore,
    coordinator: PlacementCoordinator,
    export_gate: ExportGate,
}

impl std::fmt::Debug for SigningSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningSession")
            .field("config", &self.config)
            .field("document", &self.document)
            .field("placements", &self.placements.len())
            .field("current_page", &self.coordinator.current_page())
            .finish()
    }
}

impl SigningSession {
    pub fn new(config: SignerConfig) -> Result<Self, SessionError> {
        Self::with_rasterizer(config, default_rasterizer())
    }

    pub fn with_rasterizer(
        config: SignerConfig,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        Ok(Self {
            coordinator: PlacementCoordinator::new(config.coordinator_config()),
            config,
            rasterizer,
            document: None,
            placements: PlacementStore::default(),
            export_gate: ExportGate::new(),
        })
    }

    pub fn config(&self) -> &SignerConfig {
        &self.config
    }

    pub fn document(&self) -> Option<&DocumentHandle> {
        self.document.as_ref()
    }

    pub fn page_count(&self) -> u32 {
        self.document.as_ref().map_or(0, DocumentHandle::page_count)
    }

    pub fn current_page(&self) -> u32 {
        self.coordinator.current_page()
    }

    pub fn export_gate(&self) -> &ExportGate {
        &self.export_gate
    }

    /// Replaces the open document and drops every placement. On failure the previous
    /// document stays open.
    pub fn load_document(&mut self, bytes: Vec<u8>) -> Result<u32, SessionError> {
        self.open(OpenSource::Bytes(bytes))
    }

    pub fn open(&mut self, source: impl Into<OpenSource>) -> Result<u32, SessionError> {
        let document = DocumentHandle::open(source.into(), self.config.load_options())?;
        let page_count = document.page_count();

        self.placements.reset(page_count);
        self.coordinator.attach(page_count);
        self.document = Some(document);

        tracing::info!(page_count, "document opened");
        Ok(page_count)
    }

    fn require_document(&self) -> Result<&DocumentHandle, SessionError> {
        self.document.as_ref().ok_or(SessionError::NoDocument)
    }

    /// Renders `page_number` (1-based) and makes it the current page.
    pub fn navigate(&mut self, page_number: u32) -> Result<RenderOutcome, SessionError> {
        let document = self.document.as_ref().ok_or(SessionError::NoDocument)?;
        let outcome =
            self.coordinator.render_page(Arc::clone(&self.rasterizer), document, page_number)?;
        Ok(outcome)
    }

    pub fn next_page(&mut self) -> Result<RenderOutcome, SessionError> {
        let target = (self.current_page() + 1).min(self.page_count());
        self.navigate(target)
    }

    pub fn previous_page(&mut self) -> Result<RenderOutcome, SessionError> {
        let target = self.current_page().saturating_sub(1).max(1);
        self.navigate(target)
    }

    pub fn rendered_page_image(&self) -> Option<&RenderedPage> {
        self.coordinator.rendered_page_image()
    }

    pub fn gesture_state(&self) -> GestureState {
        self.coordinator.gesture_state()
    }

    pub fn set_placing(&mut self, placing: bool) {
        self.coordinator.set_placing(placing);
    }

    pub fn is_placing(&self) -> bool {
        self.coordinator.is_placing()
    }

    pub fn begin_box(&mut self, pointer: Position) {
        self.coordinator.begin_box(pointer);
    }

    pub fn update_box(&mut self, pointer: Position) -> Option<SelectionBox> {
        self.coordinator.update_box(pointer)
    }

    pub fn end_box(&mut self) -> Option<PlacementBox> {
        self.coordinator.end_box()
    }

    pub fn cancel_box(&mut self) {
        self.coordinator.cancel_box();
    }

    pub fn pending_box(&self) -> Option<PlacementBox> {
        self.coordinator.last_box()
    }

    /// Grabs the placement `id` at `pointer`. Returns `false` if it does not exist or the
    /// gesture is not allowed right now.
    pub fn begin_move(&mut self, pointer: Position, id: PlacementId) -> bool {
        let Some(record) = self.placements.get(id) else {
            return false;
        };
        self.coordinator.begin_move(pointer, id, record.position)
    }

    /// Live position of the placement being dragged; the store is updated on release.
    pub fn update_move(&mut self, pointer: Position) -> Option<(PlacementId, Position)> {
        self.coordinator.update_move(pointer)
    }

    pub fn end_move(&mut self) -> Result<Option<PlacementId>, SessionError> {
        let Some((id, position)) = self.coordinator.end_move() else {
            return Ok(None);
        };
        self.move_placement(id, position)?;
        Ok(Some(id))
    }

    /// Pairs the last finished selection box with a payload and adds the placement.
    ///
    /// `image_size` is the payload's pixel size, used to fit it into the box; without it
    /// the payload fills the box exactly.
    pub fn place_payload(
        &mut self,
        kind: PlacementKind,
        payload: PlacementPayload,
        image_size: Option<(u32, u32)>,
        with_date: bool,
    ) -> Result<PlacementId, SessionError> {
        self.require_document()?;
        let drawn = self.coordinator.last_box().ok_or(SessionError::NoPendingBox)?;

        let fitted = match image_size {
            Some((width, height)) => fit_to_box(kind, &drawn, width, height),
            None => drawn,
        };

        let record = PlacementRecord {
            id: PlacementId::new(),
            kind,
            payload,
            page_number: fitted.page_number,
            position: fitted.position,
            width: fitted.width,
            height: fitted.height,
            display_scale: self.config.display_scale,
            date_stamp: with_date.then(date_stamp_today),
        };

        let id = self.add_placement(record)?;
        self.coordinator.take_last_box();
        self.coordinator.set_placing(false);
        Ok(id)
    }

    /// Places a generated signature or annotation image into the last selection box.
    pub fn place_image(
        &mut self,
        kind: PlacementKind,
        image: SignatureImage,
        with_date: bool,
    ) -> Result<PlacementId, SessionError> {
        let size = (image.width, image.height);
        let payload = PlacementPayload::Image(EncodedImage::new(image.png));
        self.place_payload(kind, payload, Some(size), with_date)
    }

    /// Renders `text` in the caller's script font and places it as a typed signature.
    pub fn place_typed_signature(
        &mut self,
        text: &str,
        font_data: &[u8],
        font_size_pt: f32,
        ink: InkColor,
        with_date: bool,
    ) -> Result<PlacementId, SessionError> {
        let image = render_typed(text, font_data, self.config.text_style(font_size_pt, ink))?;
        self.place_image(PlacementKind::Text, image, with_date)
    }

    /// Renders a short annotation line and places it centered in the last box.
    pub fn place_annotation(
        &mut self,
        text: &str,
        font_data: &[u8],
        font_size_pt: f32,
        ink: InkColor,
    ) -> Result<PlacementId, SessionError> {
        let image = render_plain(text, font_data, self.config.text_style(font_size_pt, ink))?;
        self.place_image(PlacementKind::Annotation, image, false)
    }

    pub fn add_placement(&mut self, record: PlacementRecord) -> Result<PlacementId, SessionError> {
        self.require_document()?;
        let id = record.id;
        self.placements.apply(PlacementAction::Add(record))?;
        tracing::debug!(%id, version = self.placements.version(), "placement added");
        Ok(id)
    }

    pub fn remove_placement(&mut self, id: PlacementId) -> Result<(), SessionError> {
        self.placements.apply(PlacementAction::Remove { id })?;
        Ok(())
    }

    pub fn move_placement(&mut self, id: PlacementId, position: Position) -> Result<(), SessionError> {
        self.placements.apply(PlacementAction::Move { id, position })?;
        Ok(())
    }

    pub fn clear_placements(&mut self) {
        // Clearing cannot fail.
        let _ = self.placements.apply(PlacementAction::Clear);
    }

    pub fn placements(&self) -> &[PlacementRecord] {
        self.placements.records()
    }

    pub fn placement_snapshot(&self) -> PlacementSnapshot {
        self.placements.snapshot()
    }

    /// Produces the signed PDF. Neither the source document nor the placement list
    /// is modified.
    pub fn export(&self) -> Result<Vec<u8>, SessionError> {
        let _permit = self.export_gate.try_acquire().ok_or(SessionError::ExportInProgress)?;
        let document = self.require_document()?;
        let snapshot = self.placements.snapshot();

        tracing::info!(placements = snapshot.len(), version = snapshot.version, "export started");

        let output = compositor::composite(
            document.bytes(),
            &snapshot.records,
            &self.config.composite_options(),
        )?;
        Ok(output)
    }
}
