//! Image <-> tensor conversions shared by training batches and inference.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};

/// Resize to `(height, width)` with bilinear filtering.
pub fn resize_rgb(image: &RgbImage, image_shape: (usize, usize)) -> RgbImage {
    let (height, width) = image_shape;
    if image.dimensions() == (width as u32, height as u32) {
        return image.clone();
    }
    imageops::resize(image, width as u32, height as u32, FilterType::Triangle)
}

/// CHW layout, normalized to [0, 1].
pub fn rgb_to_chw(image: &RgbImage) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let mut buf = Vec::with_capacity((width * height * 3) as usize);
    for c in 0..3 {
        for y in 0..height {
            for x in 0..width {
                buf.push(image.get_pixel(x, y)[c] as f32 / 255.0);
            }
        }
    }
    buf
}

/// Single image as a `[1, 3, height, width]` tensor.
pub fn image_tensor<B: Backend>(image: &RgbImage, device: &B::Device) -> Tensor<B, 4> {
    let (width, height) = image.dimensions();
    Tensor::<B, 4>::from_data(
        TensorData::new(rgb_to_chw(image), [1, 3, height as usize, width as usize]),
        device,
    )
}

/// `*.png` files directly under `dir`, sorted by name.
pub fn png_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("png") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
