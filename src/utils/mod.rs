use image::{RgbImage, imageops::FilterType};
use log::warn;

pub const CHANNELS: usize = 3;

/// Converts an RGB image into planar `[C, H, W]` values normalized to `[-1, 1]`.
pub fn rgb_to_chw(image: &RgbImage) -> Vec<f32> {
    let plane = (image.width() * image.height()) as usize;
    let mut data = vec![0.0f32; CHANNELS * plane];
    for (index, pixel) in image.pixels().enumerate() {
        for channel in 0..CHANNELS {
            data[channel * plane + index] = (pixel[channel] as f32 / 127.5) - 1.0;
        }
    }
    data
}

/// Reverses [`rgb_to_chw`]. Returns `None` when the length does not match `height * width`.
pub fn chw_to_rgb(data: &[f32], height: usize, width: usize) -> Option<RgbImage> {
    let plane = height * width;
    let expected_len = CHANNELS * plane;
    if data.len() != expected_len {
        warn!(
            "Mismatched data length. Expected {}, got {}.",
            expected_len,
            data.len()
        );
        return None;
    }

    let mut raw_pixels = Vec::with_capacity(expected_len);
    for index in 0..plane {
        for channel in 0..CHANNELS {
            // Reversing the normalization: (val + 1.0) * 127.5
            let denormalized = (data[channel * plane + index] + 1.0) * 127.5;
            raw_pixels.push(denormalized.round().clamp(0.0, 255.0) as u8);
        }
    }

    RgbImage::from_raw(width as u32, height as u32, raw_pixels)
}

/// Loads an image from disk as RGB, resized to a `size`x`size` square.
pub fn load_square_rgb(path: &std::path::Path, size: u32) -> image::ImageResult<RgbImage> {
    let image = image::open(path)?.to_rgb8();
    if image.dimensions() == (size, size) {
        return Ok(image);
    }
    Ok(image::imageops::resize(
        &image,
        size,
        size,
        FilterType::Triangle,
    ))
}

/// Places images left to right on a single strip. All images must share a height.
pub fn hstack(images: &[RgbImage]) -> Option<RgbImage> {
    let height = images.first()?.height();
    if images.iter().any(|image| image.height() != height) {
        return None;
    }
    let width = images.iter().map(RgbImage::width).sum();
    let mut strip = RgbImage::new(width, height);
    let mut offset = 0i64;
    for image in images {
        image::imageops::replace(&mut strip, image, offset, 0);
        offset += image.width() as i64;
    }
    Some(strip)
}
