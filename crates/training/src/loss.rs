//! Pixel-wise softmax cross-entropy over flattened logits.

use burn::tensor::activation::log_softmax;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::error::{TrainError, TrainResult};

/// Outputs of [`cross_entropy_loss`].
#[derive(Debug, Clone)]
pub struct LossOutput<B: Backend> {
    /// `[batch * height * width, num_classes]`, one row per pixel.
    pub logits: Tensor<B, 2>,
    /// Cross-entropy per pixel, `[batch * height * width]`.
    pub per_pixel: Tensor<B, 1>,
    /// Mean over all pixels, shape `[1]`.
    pub loss: Tensor<B, 1>,
}

/// `[batch, classes, height, width]` -> `[batch * height * width, classes]`,
/// rows ordered batch-major then row-major over the image.
pub fn flatten_pixels<B: Backend>(tensor: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch, classes, height, width] = tensor.dims();
    tensor
        .permute([0, 2, 3, 1])
        .reshape([batch * height * width, classes])
}

/// Row-wise `-sum(labels * log_softmax(logits))`.
pub fn softmax_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    labels: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let [rows, _] = logits.dims();
    (labels * log_softmax(logits, 1))
        .sum_dim(1)
        .reshape([rows])
        .neg()
}

pub fn cross_entropy_loss<B: Backend>(
    logits: Tensor<B, 4>,
    labels: Tensor<B, 4>,
    num_classes: usize,
) -> TrainResult<LossOutput<B>> {
    let logit_dims = logits.dims();
    let label_dims = labels.dims();
    if logit_dims != label_dims {
        return Err(TrainError::ShapeMismatch {
            left_name: "logits",
            left: logit_dims.to_vec(),
            right_name: "labels",
            right: label_dims.to_vec(),
        });
    }
    if logit_dims[1] != num_classes {
        return Err(TrainError::ClassCount {
            expected: num_classes,
            found: logit_dims[1],
        });
    }

    let logits = flatten_pixels(logits);
    let per_pixel = softmax_cross_entropy(logits.clone(), flatten_pixels(labels));
    let loss = per_pixel.clone().mean();
    Ok(LossOutput {
        logits,
        per_pixel,
        loss,
    })
}

/// Host copy of a single-element tensor. NaN if the readback fails.
pub fn scalar_value<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor
        .into_data()
        .to_vec::<f32>()
        .ok()
        .and_then(|values| values.first().copied())
        .unwrap_or(f32::NAN)
}
