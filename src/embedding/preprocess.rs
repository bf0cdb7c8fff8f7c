//! Image decoding and pixel-tensor preparation.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

/// Square input raster of the CLIP vision tower.
pub const CLIP_INPUT_SIZE: u32 = 224;

pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Decode uploaded bytes into an image. Any format the `image` crate can sniff
/// is accepted; everything downstream works on RGB.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    anyhow::ensure!(!bytes.is_empty(), "image payload is empty");
    image::load_from_memory(bytes).context("could not decode image")
}

/// Resize straight to `size`×`size` (no crop, aspect ratio not preserved) and
/// lay the channels out as a normalized NCHW tensor with batch size 1.
pub fn normalized_nchw(
    image: &DynamicImage,
    size: u32,
    mean: [f32; 3],
    std: [f32; 3],
    filter: FilterType,
) -> Array4<f32> {
    let rgb = image::imageops::resize(&image.to_rgb8(), size, size, filter);
    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel.0[c] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (value - mean[c]) / std[c];
        }
    }

    tensor
}

/// CLIP `pixel_values` for one image.
pub fn clip_pixel_values(image: &DynamicImage) -> Array4<f32> {
    normalized_nchw(image, CLIP_INPUT_SIZE, CLIP_MEAN, CLIP_STD, FilterType::Triangle)
}
