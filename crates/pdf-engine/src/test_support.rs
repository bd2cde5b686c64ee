//! Minimal PDF builders shared by the workspace's tests.

use lopdf::{dictionary, Document, Object, Stream};

/// Builds a PDF whose pages have the given sizes in points.
///
/// When `inherit_first` is set the first page carries no MediaBox of its own and picks up
/// the one on the page tree root.
pub fn pdf_with_pages(sizes: &[(i64, i64)], inherit_first: bool) -> std::io::Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::new();

    for (index, (width, height)) in sizes.iter().enumerate() {
        let content_id = doc.add_object(Stream::new(dictionary! {}, b"0 0 m".to_vec()));
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        };
        if !(inherit_first && index == 0) {
            page.set("MediaBox", vec![0.into(), 0.into(), (*width).into(), (*height).into()]);
        }
        kids.push(doc.add_object(page).into());
    }

    let (width, height) = sizes.first().copied().unwrap_or((612, 792));
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => sizes.len() as i64,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

/// A single US Letter page.
pub fn letter_pdf() -> std::io::Result<Vec<u8>> {
    pdf_with_pages(&[(612, 792)], false)
}

/// One page of the given size whose content stream is `content`.
pub fn pdf_with_content((width, height): (i64, i64), content: &[u8]) -> std::io::Result<Vec<u8>> {
    single_page((width, height), content.to_vec(), |_| dictionary! {})
}

/// One page that draws form XObject `/Fm0` built from `form_content` with `matrix`.
pub fn pdf_with_form(
    (width, height): (i64, i64),
    form_content: &[u8],
    matrix: [f32; 6],
) -> std::io::Result<Vec<u8>> {
    let form_content = form_content.to_vec();
    single_page((width, height), b"/Fm0 Do".to_vec(), move |doc| {
        let form_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), width.into(), height.into()],
                "Matrix" => matrix.iter().map(|value| Object::Real(*value)).collect::<Vec<_>>(),
            },
            form_content,
        ));
        dictionary! { "XObject" => dictionary! { "Fm0" => form_id } }
    })
}

fn single_page(
    (width, height): (i64, i64),
    content: Vec<u8>,
    resources: impl FnOnce(&mut Document) -> lopdf::Dictionary,
) -> std::io::Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let resources = resources(&mut doc);
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1_i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}
