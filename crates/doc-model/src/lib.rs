use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Display scale used by the page view when nothing else is configured.
pub const DEFAULT_DISPLAY_SCALE: f32 = 1.5;

/// Fixed display height of plain-text annotations, in display pixels.
pub const ANNOTATION_HEIGHT_PX: f32 = 24.0;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ModelError {
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("placement size must be positive, got {width}x{height}")]
    InvalidSize { width: f32, height: f32 },
    #[error("invalid position ({x}, {y})")]
    InvalidPosition { x: f32, y: f32 },
    #[error("display scale must be positive, got {0}")]
    InvalidScale(f32),
    #[error("unknown placement {0}")]
    UnknownPlacement(PlacementId),
    #[error("invalid payload: {0}")]
    Payload(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset_from(self, other: Position) -> Position {
        Position { x: self.x - other.x, y: self.y - other.y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlacementId(pub uuid::Uuid);

impl PlacementId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for PlacementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlacementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementKind {
    /// Uploaded image file.
    Image,
    /// Freehand ink from the signature pad.
    Drawing,
    /// Typed signature rendered in a script font.
    Text,
    /// Short plain-text annotation.
    Annotation,
}

/// Encoded raster bytes (PNG or JPEG) as produced by the signature pad or an upload.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Accepts `data:<mime>;base64,<data>` URLs as well as bare base64.
    pub fn from_data_url(value: &str) -> Result<Self, ModelError> {
        let encoded = match value.strip_prefix("data:") {
            Some(rest) => {
                let (header, data) = rest
                    .split_once(',')
                    .ok_or_else(|| ModelError::Payload("data URL without ','".to_owned()))?;
                if !header.ends_with(";base64") {
                    return Err(ModelError::Payload(format!(
                        "unsupported data URL encoding: {header}"
                    )));
                }
                data
            }
            None => value,
        };

        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|err| ModelError::Payload(format!("invalid base64: {err}")))?;

        if bytes.is_empty() {
            return Err(ModelError::Payload("empty image payload".to_owned()));
        }

        Ok(Self { bytes })
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), STANDARD.encode(&self.bytes))
    }

    pub fn mime_type(&self) -> &'static str {
        if self.bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            "image/jpeg"
        } else {
            "image/png"
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime", &self.mime_type())
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Serialize for EncodedImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_url())
    }
}

impl<'de> Deserialize<'de> for EncodedImage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_data_url(&value).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementPayload {
    Image(EncodedImage),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRecord {
    pub id: PlacementId,
    pub kind: PlacementKind,
    pub payload: PlacementPayload,
    /// 1-based page number.
    pub page_number: u32,
    pub position: Position,
    pub width: f32,
    pub height: f32,
    /// Display scale the page was rendered at when this placement was captured.
    pub display_scale: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_stamp: Option<String>,
}

impl PlacementRecord {
    pub fn validate(&self, page_count: u32) -> Result<(), ModelError> {
        if self.page_number == 0 || self.page_number > page_count {
            return Err(ModelError::PageOutOfRange { page: self.page_number, page_count });
        }

        if !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
        {
            return Err(ModelError::InvalidSize { width: self.width, height: self.height });
        }

        if !(self.position.x.is_finite() && self.position.y.is_finite()) {
            return Err(ModelError::InvalidPosition { x: self.position.x, y: self.position.y });
        }

        if !self.display_scale.is_finite() || self.display_scale <= 0.0 {
            return Err(ModelError::InvalidScale(self.display_scale));
        }

        Ok(())
    }

    pub fn bounds(&self) -> PlacementBox {
        PlacementBox {
            page_number: self.page_number,
            position: self.position,
            width: self.width,
            height: self.height,
        }
    }
}

/// Placement record as supplied by an outside caller (e.g. a JSON file), where the id
/// and capture scale may be left out.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlacementDraft {
    #[serde(default)]
    pub id: Option<PlacementId>,
    pub kind: PlacementKind,
    pub payload: PlacementPayload,
    pub page_number: u32,
    pub position: Position,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub display_scale: Option<f32>,
    #[serde(default)]
    pub date_stamp: Option<String>,
}

impl PlacementDraft {
    pub fn into_record(self, default_scale: f32) -> PlacementRecord {
        PlacementRecord {
            id: self.id.unwrap_or_default(),
            kind: self.kind,
            payload: self.payload,
            page_number: self.page_number,
            position: self.position,
            width: self.width,
            height: self.height,
            display_scale: self.display_scale.unwrap_or(default_scale),
            date_stamp: self.date_stamp,
        }
    }
}

/// A finalized selection rectangle in display-pixel space of one page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementBox {
    pub page_number: u32,
    pub position: Position,
    pub width: f32,
    pub height: f32,
}

/// Sizes a payload of `image_width`x`image_height` pixels into a drawn box.
///
/// Annotations get a fixed line height centered in the box, typed signatures keep the
/// box height and their own aspect ratio, drawings and uploads fill the box.
pub fn fit_to_box(
    kind: PlacementKind,
    drawn: &PlacementBox,
    image_width: u32,
    image_height: u32,
) -> PlacementBox {
    let aspect = if image_width > 0 && image_height > 0 {
        image_width as f32 / image_height as f32
    } else {
        drawn.width / drawn.height.max(f32::EPSILON)
    };

    match kind {
        PlacementKind::Annotation => {
            let height = ANNOTATION_HEIGHT_PX;
            let width = height * aspect;
            PlacementBox {
                page_number: drawn.page_number,
                position: Position {
                    x: drawn.position.x + drawn.width / 2.0 - width / 2.0,
                    y: drawn.position.y + drawn.height / 2.0 - height / 2.0,
                },
                width,
                height,
            }
        }
        PlacementKind::Text => PlacementBox {
            page_number: drawn.page_number,
            position: drawn.position,
            width: drawn.height * aspect,
            height: drawn.height,
        },
        PlacementKind::Image | PlacementKind::Drawing => *drawn,
    }
}

/// Today's date in the short `month/day/year` form used for stamps.
pub fn date_stamp_today() -> String {
    chrono::Local::now().format("%-m/%-d/%Y").to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlacementAction {
    Add(PlacementRecord),
    Remove { id: PlacementId },
    Move { id: PlacementId, position: Position },
    Clear,
}

/// Immutable view of the placement list at one version.
#[derive(Debug, Clone)]
pub struct PlacementSnapshot {
    pub version: u64,
    pub records: Arc<Vec<PlacementRecord>>,
}

impl PlacementSnapshot {
    pub fn iter(&self) -> impl Iterator<Item = &PlacementRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Ordered, copy-on-write placement list.
///
/// Every mutation swaps in a new list and bumps `version`, so snapshots taken earlier
/// keep seeing the list they were taken from.
#[derive(Debug, Clone, Default)]
pub struct PlacementStore {
    records: Arc<Vec<PlacementRecord>>,
    version: u64,
    page_count: u32,
}

impl PlacementStore {
    pub fn new(page_count: u32) -> Self {
        Self { records: Arc::new(Vec::new()), version: 0, page_count }
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Drops every placement and rebinds the store to a new document.
    pub fn reset(&mut self, page_count: u32) {
        self.page_count = page_count;
        self.commit(Vec::new());
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn records(&self) -> &[PlacementRecord] {
        &self.records
    }

    pub fn get(&self, id: PlacementId) -> Option<&PlacementRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn snapshot(&self) -> PlacementSnapshot {
        PlacementSnapshot { version: self.version, records: Arc::clone(&self.records) }
    }

    pub fn apply(&mut self, action: PlacementAction) -> Result<(), ModelError> {
        match action {
            PlacementAction::Add(record) => {
                record.validate(self.page_count)?;
                let mut next = self.records.as_ref().clone();
                next.push(record);
                self.commit(next);
            }
            PlacementAction::Remove { id } => {
                let index = self.index_of(id)?;
                let mut next = self.records.as_ref().clone();
                next.remove(index);
                self.commit(next);
            }
            PlacementAction::Move { id, position } => {
                if !(position.x.is_finite() && position.y.is_finite()) {
                    return Err(ModelError::InvalidPosition { x: position.x, y: position.y });
                }
                let index = self.index_of(id)?;
                let mut next = self.records.as_ref().clone();
                next[index].position = position;
                self.commit(next);
            }
            PlacementAction::Clear => self.commit(Vec::new()),
        }

        Ok(())
    }

    fn index_of(&self, id: PlacementId) -> Result<usize, ModelError> {
        self.records
            .iter()
            .position(|record| record.id == id)
            .ok_or(ModelError::UnknownPlacement(id))
    }

    fn commit(&mut self, records: Vec<PlacementRecord>) {
        self.records = Arc::new(records);
        self.version += 1;
    }
}
