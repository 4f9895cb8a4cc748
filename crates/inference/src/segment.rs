use crate::error::{InferenceError, InferenceResult};
use crate::preprocess::{image_tensor, resize_rgb};
use burn::tensor::activation::softmax;
use burn::tensor::backend::Backend;
use image::RgbImage;
use models::Fcn8s;

/// Class index scored as road; index 0 is background.
pub const ROAD_CLASS: usize = 1;
pub const ROAD_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct RoadMask {
    width: u32,
    height: u32,
    road: Vec<bool>,
}

impl RoadMask {
    /// Threshold row-major road probabilities.
    pub fn from_probabilities(probs: &[f32], width: u32, height: u32, threshold: f32) -> Self {
        Self {
            width,
            height,
            road: probs.iter().map(|p| *p > threshold).collect(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_road(&self, x: u32, y: u32) -> bool {
        self.road
            .get((y * self.width + x) as usize)
            .copied()
            .unwrap_or(false)
    }

    pub fn road_pixels(&self) -> usize {
        self.road.iter().filter(|r| **r).count()
    }
}

#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Input resized to the network resolution.
    pub image: RgbImage,
    pub mask: RoadMask,
}

/// Road softmax probability per pixel (row-major) for an image already at network resolution.
pub fn road_probabilities<B: Backend>(
    model: &Fcn8s<B>,
    image: &RgbImage,
    device: &B::Device,
) -> InferenceResult<Vec<f32>> {
    let logits = model.forward(image_tensor::<B>(image, device), 1.0)?;
    let [batch, classes, height, width] = logits.dims();
    if classes <= ROAD_CLASS {
        return Err(InferenceError::ClassCount {
            found: classes,
            road_class: ROAD_CLASS,
        });
    }
    softmax(logits, 1)
        .slice([0..batch, ROAD_CLASS..ROAD_CLASS + 1, 0..height, 0..width])
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| InferenceError::TensorData(format!("{e:?}")))
}

pub fn segment_image<B: Backend>(
    model: &Fcn8s<B>,
    image: &RgbImage,
    image_shape: (usize, usize),
    device: &B::Device,
) -> InferenceResult<Segmentation> {
    let image = resize_rgb(image, image_shape);
    let probs = road_probabilities(model, &image, device)?;
    let (width, height) = image.dimensions();
    let mask = RoadMask::from_probabilities(&probs, width, height, ROAD_THRESHOLD);
    Ok(Segmentation { image, mask })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_thresholds_strictly_above_half() {
        let mask = RoadMask::from_probabilities(&[0.2, 0.5, 0.51, 0.9], 2, 2, ROAD_THRESHOLD);
        assert!(!mask.is_road(0, 0));
        assert!(!mask.is_road(1, 0));
        assert!(mask.is_road(0, 1));
        assert!(mask.is_road(1, 1));
        assert_eq!(mask.road_pixels(), 2);
        assert!(!mask.is_road(5, 5));
    }
}
