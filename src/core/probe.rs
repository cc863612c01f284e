use crate::common::Result;
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use std::fs;
use std::path::Path;

/// Decode the uploaded probe, scale it to the recognizer's working size and
/// write it as JPEG to `dest`.
pub fn write_probe(bytes: &[u8], width: u32, height: u32, dest: &Path) -> Result<()> {
    let img = image::load_from_memory(bytes)?;
    let img = img.resize_exact(width, height, FilterType::Triangle);

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    // JPEG has no alpha channel
    DynamicImage::ImageRgb8(img.to_rgb8()).save_with_format(dest, ImageFormat::Jpeg)?;
    Ok(())
}
