//! PDF Signer Core Library
//!
//! Ties the document model, page rendering, placement gestures and the compositor
//! into one signing session.

pub mod config;
pub mod export_gate;
pub mod session;

pub use config::{ConfigError, SignerConfig};
pub use export_gate::{ExportGate, ExportPermit};
pub use session::{SessionError, SigningSession};

pub use compositor::{composite, CompositeError, CompositeOptions};
pub use doc_model::{
    EncodedImage, PlacementBox, PlacementDraft, PlacementId, PlacementKind, PlacementPayload,
    PlacementRecord, PlacementSnapshot, Position,
};
pub use pdf_engine::{DocumentHandle, PageRasterizer, PageSize};
pub use signature_raster::{InkColor, SignatureImage};
pub use viewer_core::{GestureState, RenderError, RenderOutcome, RenderedPage, SelectionBox};
