use crate::metrics::{encode_win_ansi, text_width, CAP_HEIGHT};
use crate::transform::PlacementTransform;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashSet;

const RESOURCE_DEPTH_LIMIT: usize = 10;

/// RGB fill in the 0..=1 range.
pub type FillColor = (f32, f32, f32);

/// Operators and resources queued for one page, drawn on top of its existing content.
#[derive(Debug)]
pub(crate) struct PageOverlay {
    page_id: ObjectId,
    taken_names: HashSet<Vec<u8>>,
    images: Vec<(Vec<u8>, ObjectId)>,
    font: Option<(Vec<u8>, ObjectId)>,
    operations: Vec<Operation>,
}

impl PageOverlay {
    pub(crate) fn new(doc: &Document, page_id: ObjectId) -> Self {
        let resources = inherited_resources(doc, page_id);
        let mut taken_names = HashSet::new();

        for category in [b"XObject".as_slice(), b"Font".as_slice()] {
            if let Some(entries) = resolved_dict(doc, resources.get(category).ok()) {
                taken_names.extend(entries.iter().map(|(name, _)| name.clone()));
            }
        }

        Self { page_id, taken_names, images: Vec::new(), font: None, operations: Vec::new() }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    fn unused_name(&mut self, prefix: &str) -> Vec<u8> {
        let mut counter = self.taken_names.len();
        loop {
            let candidate = format!("{prefix}{counter}").into_bytes();
            if self.taken_names.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }

    fn font_name(&mut self, font_id: ObjectId) -> Vec<u8> {
        if let Some((name, _)) = &self.font {
            return name.clone();
        }

        let name = self.unused_name("SgHelv");
        self.font = Some((name.clone(), font_id));
        name
    }

    /// `q w 0 0 h x y cm /Name Do Q`
    pub(crate) fn draw_image(&mut self, image_id: ObjectId, transform: &PlacementTransform) {
        let name = self.unused_name("SgImg");
        self.images.push((name.clone(), image_id));

        let matrix = transform.image_matrix().into_iter().map(Object::from).collect();
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new("cm", matrix),
            Operation::new("Do", vec![Object::Name(name)]),
            Operation::new("Q", vec![]),
        ]);
    }

    pub(crate) fn draw_text(
        &mut self,
        font_id: ObjectId,
        text: &str,
        font_size: f32,
        origin: (f32, f32),
        color: FillColor,
    ) {
        let font = self.font_name(font_id);
        let (r, g, b) = color;

        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(font), font_size.into()]),
            Operation::new("rg", vec![r.into(), g.into(), b.into()]),
            Operation::new("Td", vec![origin.0.into(), origin.1.into()]),
            Operation::new("Tj", vec![Object::string_literal(encode_win_ansi(text))]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    /// Date line centered under the placement, `offset` points below its bottom edge.
    pub(crate) fn draw_date_stamp(
        &mut self,
        font_id: ObjectId,
        date: &str,
        transform: &PlacementTransform,
        font_size: f32,
        offset: f32,
        color: FillColor,
    ) {
        let x = transform.center_x() - text_width(date, font_size) / 2.0;
        let y = transform.y - offset;
        self.draw_text(font_id, date, font_size, (x, y), color);
    }

    /// Raw text filling the box height, left-aligned and vertically centered.
    pub(crate) fn draw_text_payload(
        &mut self,
        font_id: ObjectId,
        text: &str,
        transform: &PlacementTransform,
        color: FillColor,
    ) {
        let font_size = transform.height / 1.5;
        let baseline = transform.y + (transform.height - font_size * CAP_HEIGHT) / 2.0;
        self.draw_text(font_id, text, font_size, (transform.x, baseline), color);
    }

    /// Writes the queued overlay into the document.
    ///
    /// Existing page content is wrapped in `q`/`Q` so the overlay starts from the default
    /// graphics state.
    pub(crate) fn install(self, doc: &mut Document) -> Result<(), lopdf::Error> {
        let mut resources = inherited_resources(doc, self.page_id);
        if !self.images.is_empty() {
            merge_entries(doc, &mut resources, b"XObject", &self.images);
        }
        if let Some(font) = &self.font {
            merge_entries(doc, &mut resources, b"Font", std::slice::from_ref(font));
        }

        let mut operations = Vec::with_capacity(self.operations.len() + 1);
        operations.push(Operation::new("Q", vec![]));
        operations.extend(self.operations);
        // Separates the overlay from the last token of the existing content.
        let mut overlay = b"\n".to_vec();
        overlay.extend(Content { operations }.encode()?);

        let existing = existing_contents(doc, self.page_id)?
            .into_iter()
            .map(|object| match object {
                Object::Stream(stream) => Object::Reference(doc.add_object(stream)),
                other => other,
            })
            .collect::<Vec<_>>();
        let prefix_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
        let overlay_id = doc.add_object(Stream::new(dictionary! {}, overlay));

        let mut contents = Vec::with_capacity(existing.len() + 2);
        contents.push(Object::Reference(prefix_id));
        contents.extend(existing);
        contents.push(Object::Reference(overlay_id));

        let page = doc.get_object_mut(self.page_id)?.as_dict_mut()?;
        page.set("Contents", Object::Array(contents));
        page.set("Resources", Object::Dictionary(resources));
        Ok(())
    }
}

/// Adds Helvetica as a simple Type1 font object.
pub(crate) fn add_helvetica(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    })
}

fn resolved_dict<'a>(doc: &'a Document, object: Option<&'a Object>) -> Option<&'a Dictionary> {
    match object? {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        _ => None,
    }
}

/// The page's resource dictionary, following `/Parent` when the page has none of its own.
fn inherited_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
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

fn merge_entries(
    doc: &Document,
    resources: &mut Dictionary,
    category: &[u8],
    entries: &[(Vec<u8>, ObjectId)],
) {
    let mut merged = resolved_dict(doc, resources.get(category).ok())
        .cloned()
        .unwrap_or_else(Dictionary::new);
    for (name, id) in entries {
        merged.set(name.clone(), Object::Reference(*id));
    }
    resources.set(category.to_vec(), Object::Dictionary(merged));
}

fn existing_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, lopdf::Error> {
    let page = doc.get_dictionary(page_id)?;

    Ok(match page.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(Object::Reference(id)) => match doc.get_object(*id)? {
            Object::Array(items) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Stream(stream)) => vec![Object::Stream(stream.clone())],
        _ => Vec::new(),
    })
}
