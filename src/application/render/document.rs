//! Single-page PDF packaging of a JPEG capture.
//!
//! The JPEG stream is embedded unchanged as a `DCTDecode` image XObject and
//! drawn centered on the page. Documents carry no timestamps or identifiers,
//! so identical captures produce identical bytes.

use bytes::Bytes;
use lopdf::{
    Document, Object, Stream,
    content::{Content, Operation},
    dictionary,
};

use super::types::ResourceError;
use crate::domain::params::RenderSize;

/// JPEG quality requested for captures destined for a document.
pub const DOCUMENT_JPEG_QUALITY: u8 = 92;

const IMAGE_NAME: &[u8] = b"Im0";

/// Page and image placement in PDF points (1 px = 1 pt).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub page_width: f32,
    pub page_height: f32,
    pub image_x: f32,
    pub image_y: f32,
    pub image_width: f32,
    pub image_height: f32,
}

impl PageGeometry {
    /// Page size is the requested size when both dimensions were given,
    /// otherwise the image's intrinsic size.
    pub fn compute(requested: RenderSize, image_width: u32, image_height: u32) -> Self {
        let image_width = image_width as f32;
        let image_height = image_height as f32;
        let (page_width, page_height) = match requested.both() {
            Some((width, height)) => (width as f32, height as f32),
            None => (image_width, image_height),
        };

        Self {
            page_width,
            page_height,
            image_x: (page_width - image_width) / 2.0,
            image_y: (page_height - image_height) / 2.0,
            image_width,
            image_height,
        }
    }
}

pub fn package_jpeg(
    jpeg: &[u8],
    pixel_width: u32,
    pixel_height: u32,
    geometry: &PageGeometry,
) -> Result<Bytes, ResourceError> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(pixel_width),
            "Height" => i64::from(pixel_height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
            "Filter" => "DCTDecode",
        },
        jpeg.to_vec(),
    )
    .with_compression(false);
    let image_id = doc.add_object(image);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(geometry.image_width),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(geometry.image_height),
                    Object::Real(geometry.image_x),
                    Object::Real(geometry.image_y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(IMAGE_NAME.to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content
        .encode()
        .map_err(|err| ResourceError::document(format!("content stream: {err}")))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(geometry.page_width),
            Object::Real(geometry.page_height),
        ],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => image_id,
            },
        },
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1_i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|err| ResourceError::document(format!("serialize: {err}")))?;
    Ok(Bytes::from(out))
}
