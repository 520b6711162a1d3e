//! Image encoding: rendered page → base64 PNG `ImageData` for the classifier.
//!
//! Bundles are black-and-white scans, so pages are reduced to 8-bit grey
//! before PNG encoding. That keeps a batch of eight pages well under provider
//! request limits without losing the form codes the classifier needs.

use crate::error::SortError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode one rendered page for a vision request.
pub fn encode_page(page: usize, img: &DynamicImage) -> Result<ImageData, SortError> {
    let grey = DynamicImage::ImageLuma8(img.to_luma8());
    let mut buf = Vec::new();
    grey.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| SortError::RasterisationFailed {
            page,
            detail: format!("PNG encoding failed: {e}"),
        })?;

    let b64 = STANDARD.encode(&buf);
    debug!("Page {}: encoded {} bytes base64", page, b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encodes_as_grey_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(12, 8, Rgba([200, 10, 10, 255])));
        let data = encode_page(1, &img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");

        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        let back = image::load_from_memory(&decoded).expect("valid png");
        assert_eq!((back.width(), back.height()), (12, 8));
        assert!(matches!(back, DynamicImage::ImageLuma8(_)));
    }
}
