//! Catalog-style background removal.
//!
//! A U²-Net salient-object model predicts a foreground mask; the cut-out is
//! sharpened, given a little extra contrast, softened at the edge, and
//! composited centred on a white canvas before JPEG encoding.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use ort::session::Session;
use ort::value::Tensor;

use crate::config::BackgroundConfig;
use crate::embedding::{clip, preprocess};

/// Square input raster of U²-Net.
pub const MASK_INPUT_SIZE: u32 = 320;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

pub struct BackgroundRemover {
    session: Mutex<Session>,
    padding: u32,
    jpeg_quality: u8,
}

// Safety: the session is only reached through the Mutex.
unsafe impl Send for BackgroundRemover {}
unsafe impl Sync for BackgroundRemover {}

impl BackgroundRemover {
    pub fn new(config: &BackgroundConfig, model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join(&config.model_file);
        anyhow::ensure!(
            model_path.exists(),
            "{} not found. Run `lustre model download` first.",
            model_path.display()
        );
        let session = clip::load_session(&model_path, 1)?;
        Ok(Self {
            session: Mutex::new(session),
            padding: config.padding,
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
        })
    }

    /// Foreground alpha mask at the source image's size.
    pub fn alpha_mask(&self, image: &DynamicImage) -> Result<GrayImage> {
        let pixels = preprocess::normalized_nchw(
            image,
            MASK_INPUT_SIZE,
            IMAGENET_MEAN,
            IMAGENET_STD,
            FilterType::Lanczos3,
        );
        let shape: Vec<i64> = pixels.shape().iter().map(|&d| d as i64).collect();
        let flat: Vec<f32> = pixels.iter().copied().collect();
        let input = Tensor::from_array((shape, flat.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("mask session lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input])?;

        // First output is the fused saliency map, [1, 1, 320, 320]
        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("failed to extract saliency map")?;
        let mask = mask_from_saliency(data, MASK_INPUT_SIZE)?;

        Ok(imageops::resize(
            &mask,
            image.width(),
            image.height(),
            FilterType::Lanczos3,
        ))
    }

    /// Full pipeline: mask, enhance, composite, encode. Returns JPEG bytes.
    pub fn remove_background(&self, image: &DynamicImage) -> Result<Vec<u8>> {
        let mask = self.alpha_mask(image)?;

        let rgb = imageops::unsharpen(&image.to_rgb8(), 1.5, 3);
        let rgb = imageops::contrast(&rgb, 10.0);
        let alpha = imageops::blur(&mask, 0.5);

        let canvas = composite_on_white(&rgb, &alpha, self.padding)?;
        let canvas = imageops::unsharpen(&canvas, 0.5, 2);

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality)
            .encode_image(&canvas)
            .context("failed to encode JPEG")?;

        tracing::debug!(
            width = canvas.width(),
            height = canvas.height(),
            bytes = jpeg.len(),
            "background removed"
        );
        Ok(jpeg)
    }
}

/// Min-max scale a `side`×`side` saliency map into an 8-bit mask. A flat map
/// carries no foreground signal and keeps the whole image.
pub fn mask_from_saliency(data: &[f32], side: u32) -> Result<GrayImage> {
    let expected = (side * side) as usize;
    anyhow::ensure!(
        data.len() >= expected,
        "saliency map has {} values, expected {expected}",
        data.len()
    );
    let data = &data[..expected];

    let (min, max) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;

    Ok(GrayImage::from_fn(side, side, |x, y| {
        if range <= f32::EPSILON {
            return Luma([255]);
        }
        let v = (data[(y * side + x) as usize] - min) / range;
        Luma([(v * 255.0).round().clamp(0.0, 255.0) as u8])
    }))
}

/// Blend `rgb` over white using `alpha`, centred with `padding` pixels of white
/// on every side.
pub fn composite_on_white(rgb: &RgbImage, alpha: &GrayImage, padding: u32) -> Result<RgbImage> {
    anyhow::ensure!(
        rgb.dimensions() == alpha.dimensions(),
        "mask is {:?} but image is {:?}",
        alpha.dimensions(),
        rgb.dimensions()
    );

    let (w, h) = rgb.dimensions();
    let mut canvas = RgbImage::from_pixel(w + 2 * padding, h + 2 * padding, Rgb([255, 255, 255]));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let a = alpha.get_pixel(x, y).0[0] as f32 / 255.0;
        let blended = pixel
            .0
            .map(|c| (c as f32 * a + 255.0 * (1.0 - a)).round() as u8);
        canvas.put_pixel(x + padding, y + padding, Rgb(blended));
    }

    Ok(canvas)
}
