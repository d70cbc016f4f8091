//! Sticker conversion: any decodable image to a 512x512 WebP.

use companion_core::error::CompanionError;
use image::{imageops, imageops::FilterType, DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;

/// Side length WhatsApp requires for stickers.
pub(super) const STICKER_SIZE: u32 = 512;

/// Fit the image inside a transparent square canvas and encode it as WebP.
pub(super) fn to_sticker(image: &[u8]) -> Result<Vec<u8>, CompanionError> {
    let decoded = image::load_from_memory(image)
        .map_err(|e| CompanionError::Channel(format!("sticker decode failed: {e}")))?;
    let fitted = decoded
        .resize(STICKER_SIZE, STICKER_SIZE, FilterType::Triangle)
        .to_rgba8();

    let mut canvas = RgbaImage::new(STICKER_SIZE, STICKER_SIZE);
    let x = (STICKER_SIZE - fitted.width()) / 2;
    let y = (STICKER_SIZE - fitted.height()) / 2;
    imageops::overlay(&mut canvas, &fitted, i64::from(x), i64::from(y));

    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut buf, ImageFormat::WebP)
        .map_err(|e| CompanionError::Channel(format!("sticker encode failed: {e}")))?;
    Ok(buf.into_inner())
}
