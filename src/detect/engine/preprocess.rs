use image::{DynamicImage, GenericImageView, GrayImage};

use crate::detect::DetectError;

pub(super) fn decode_image(image_bytes: &[u8]) -> Result<DynamicImage, DetectError> {
    let image = image::load_from_memory(image_bytes)?;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(DetectError::EmptyImage { width, height });
    }
    Ok(image)
}

/// Flattens transparency onto white and converts to BT.601 luma.
pub(super) fn to_intensity(image: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(gray) = image {
        return gray.clone();
    }

    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut luma = GrayImage::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let r = r as f32 * alpha + 255.0 * (1.0 - alpha);
        let g = g as f32 * alpha + 255.0 * (1.0 - alpha);
        let b = b as f32 * alpha + 255.0 * (1.0 - alpha);
        let value = (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8;
        luma.put_pixel(x, y, image::Luma([value]));
    }

    luma
}
