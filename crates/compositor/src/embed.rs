use doc_model::EncodedImage;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{ColorType, ImageFormat};
use lopdf::{dictionary, Document, ObjectId, Stream};
use std::io::Write;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("image payload is empty")]
    Empty,
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed to compress image data: {0}")]
    Compress(#[from] std::io::Error),
}

/// An image XObject added to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub id: ObjectId,
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Adds `image` to `doc` as an image XObject.
///
/// Opaque JPEGs are stored as-is with `DCTDecode`. Everything else is decoded and
/// stored as deflated RGB, with the alpha channel split out into a grayscale soft mask
/// when any pixel is not fully opaque.
pub fn embed_image(doc: &mut Document, image: &EncodedImage) -> Result<EmbeddedImage, EmbedError> {
    if image.is_empty() {
        return Err(EmbedError::Empty);
    }

    let format = image::guess_format(image.bytes())?;
    let decoded = image::load_from_memory_with_format(image.bytes(), format)?;
    let (width, height) = (decoded.width(), decoded.height());

    if format == ImageFormat::Jpeg && decoded.color() == ColorType::Rgb8 {
        let id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "Filter" => "DCTDecode",
            },
            image.bytes().to_vec(),
        ));
        return Ok(EmbeddedImage { id, width, height, has_alpha: false });
    }

    let rgba = decoded.into_rgba8();
    let pixel_count = (width as usize) * (height as usize);
    let mut rgb = Vec::with_capacity(pixel_count * 3);
    let mut alpha = Vec::with_capacity(pixel_count);

    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }

    let has_alpha = alpha.iter().any(|value| *value != u8::MAX);

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8_i64,
        "Filter" => "FlateDecode",
    };

    if has_alpha {
        let mask_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8_i64,
                "Filter" => "FlateDecode",
            },
            deflate(&alpha)?,
        ));
        dict.set("SMask", mask_id);
    }

    let id = doc.add_object(Stream::new(dict, deflate(&rgb)?));
    Ok(EmbeddedImage { id, width, height, has_alpha })
}
