//! FCN-8s decoder: 1x1 class projections, transposed-conv upsampling and two
//! additive skip connections back to full input resolution.

use crate::backbone::{BackboneConfig, FeatureMaps};
use crate::error::{ModelError, ModelResult};
use burn::module::{Module, Param};
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{Initializer, PaddingConfig2d};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

pub const SKIP_UPSAMPLE_KERNEL: usize = 4;
pub const SKIP_UPSAMPLE_STRIDE: usize = 2;
pub const OUTPUT_UPSAMPLE_KERNEL: usize = 16;
pub const OUTPUT_UPSAMPLE_STRIDE: usize = 8;
/// 2 * 2 * 8: undoes the full backbone downsampling.
pub const DECODER_SCALE: usize =
    SKIP_UPSAMPLE_STRIDE * SKIP_UPSAMPLE_STRIDE * OUTPUT_UPSAMPLE_STRIDE;

#[derive(Debug, Clone)]
pub struct FcnDecoderConfig {
    pub num_classes: usize,
    pub layer3_channels: usize,
    pub layer4_channels: usize,
    pub layer7_channels: usize,
    /// Stddev of the random-normal kernel initializer.
    pub init_std: f64,
    /// L2 penalty scale applied to every decoder kernel.
    pub l2_scale: f64,
}

impl Default for FcnDecoderConfig {
    fn default() -> Self {
        Self::for_backbone(&BackboneConfig::default(), 2)
    }
}

impl FcnDecoderConfig {
    pub fn for_backbone(backbone: &BackboneConfig, num_classes: usize) -> Self {
        Self {
            num_classes,
            layer3_channels: backbone.layer3_channels(),
            layer4_channels: backbone.layer4_channels(),
            layer7_channels: backbone.layer7_channels(),
            init_std: 0.01,
            l2_scale: 1e-5,
        }
    }

    pub fn with_init_std(mut self, init_std: f64) -> Self {
        self.init_std = init_std;
        self
    }

    pub fn with_l2_scale(mut self, l2_scale: f64) -> Self {
        self.l2_scale = l2_scale;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> FcnDecoder<B> {
        FcnDecoder::new(self.clone(), device)
    }
}

#[derive(Debug, Module)]
pub struct FcnDecoder<B: Backend> {
    layer7_proj: Conv2d<B>,
    layer7_up: ConvTranspose2d<B>,
    layer4_proj: Conv2d<B>,
    skip4_up: ConvTranspose2d<B>,
    layer3_proj: Conv2d<B>,
    output_up: ConvTranspose2d<B>,
    num_classes: usize,
    l2_scale: f64,
}

impl<B: Backend> FcnDecoder<B> {
    pub fn new(cfg: FcnDecoderConfig, device: &B::Device) -> Self {
        let classes = cfg.num_classes;
        let std = cfg.init_std;
        Self {
            layer7_proj: projection(cfg.layer7_channels, classes, std, device),
            layer7_up: upsample(
                classes,
                SKIP_UPSAMPLE_KERNEL,
                SKIP_UPSAMPLE_STRIDE,
                std,
                device,
            ),
            layer4_proj: projection(cfg.layer4_channels, classes, std, device),
            skip4_up: upsample(
                classes,
                SKIP_UPSAMPLE_KERNEL,
                SKIP_UPSAMPLE_STRIDE,
                std,
                device,
            ),
            layer3_proj: projection(cfg.layer3_channels, classes, std, device),
            output_up: upsample(
                classes,
                OUTPUT_UPSAMPLE_KERNEL,
                OUTPUT_UPSAMPLE_STRIDE,
                std,
                device,
            ),
            num_classes: classes,
            l2_scale: cfg.l2_scale,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Per-pixel class scores `[batch, num_classes, height, width]`, with the
    /// `layer7` spatial dims scaled by [`DECODER_SCALE`].
    pub fn forward(&self, features: FeatureMaps<B>) -> ModelResult<Tensor<B, 4>> {
        let FeatureMaps {
            layer3,
            layer4,
            layer7,
        } = features;

        let stage1 = self.layer7_up.forward(self.layer7_proj.forward(layer7));
        let skip_a = skip_merge(
            "layer4 skip connection",
            stage1,
            self.layer4_proj.forward(layer4),
        )?;

        let stage2 = self.skip4_up.forward(skip_a);
        let skip_b = skip_merge(
            "layer3 skip connection",
            stage2,
            self.layer3_proj.forward(layer3),
        )?;

        Ok(self.output_up.forward(skip_b))
    }

    /// `l2_scale * sum(w^2) / 2` over all decoder kernels (biases excluded).
    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        let sums = vec![
            squared_sum(self.layer7_proj.weight.val()),
            squared_sum(self.layer7_up.weight.val()),
            squared_sum(self.layer4_proj.weight.val()),
            squared_sum(self.skip4_up.weight.val()),
            squared_sum(self.layer3_proj.weight.val()),
            squared_sum(self.output_up.weight.val()),
        ];
        Tensor::cat(sums, 0).sum().mul_scalar(self.l2_scale / 2.0)
    }
}

fn squared_sum<B: Backend>(weight: Tensor<B, 4>) -> Tensor<B, 1> {
    (weight.clone() * weight).sum()
}

fn skip_merge<B: Backend>(
    context: &'static str,
    decoder: Tensor<B, 4>,
    encoder: Tensor<B, 4>,
) -> ModelResult<Tensor<B, 4>> {
    let left = decoder.dims();
    let right = encoder.dims();
    if left != right {
        return Err(ModelError::ShapeMismatch {
            context,
            left: left.to_vec(),
            right: right.to_vec(),
        });
    }
    Ok(decoder + encoder)
}

fn projection<B: Backend>(
    in_channels: usize,
    num_classes: usize,
    std: f64,
    device: &B::Device,
) -> Conv2d<B> {
    let mut conv = Conv2dConfig::new([in_channels, num_classes], [1, 1])
        .with_padding(PaddingConfig2d::Valid)
        .with_initializer(Initializer::Normal { mean: 0.0, std })
        .init(device);
    conv.bias = zero_bias(conv.bias);
    conv
}

fn upsample<B: Backend>(
    num_classes: usize,
    kernel: usize,
    stride: usize,
    std: f64,
    device: &B::Device,
) -> ConvTranspose2d<B> {
    let (padding, padding_out) = same_transpose_padding(kernel, stride);
    let mut deconv = ConvTranspose2dConfig::new([num_classes, num_classes], [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding([padding, padding])
        .with_padding_out([padding_out, padding_out])
        .with_initializer(Initializer::Normal { mean: 0.0, std })
        .init(device);
    deconv.bias = zero_bias(deconv.bias);
    deconv
}

/// The initializer fills biases too; decoder biases start at zero.
fn zero_bias<B: Backend>(bias: Option<Param<Tensor<B, 1>>>) -> Option<Param<Tensor<B, 1>>> {
    bias.map(|b| Param::from_tensor(b.val().zeros_like()))
}

/// Padding and output padding so a transposed conv yields exactly `input * stride`.
pub fn same_transpose_padding(kernel: usize, stride: usize) -> (usize, usize) {
    let overlap = kernel.saturating_sub(stride);
    let padding = overlap.div_ceil(2);
    (padding, 2 * padding - overlap)
}

/// Output size of a transposed conv with the paddings from [`same_transpose_padding`].
pub fn transposed_output_size(input: usize, kernel: usize, stride: usize) -> usize {
    let (padding, padding_out) = same_transpose_padding(kernel, stride);
    (input - 1) * stride + kernel + padding_out - 2 * padding
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_padding_restores_stride_multiple() {
        assert_eq!(same_transpose_padding(4, 2), (1, 0));
        assert_eq!(same_transpose_padding(16, 8), (4, 0));
        assert_eq!(same_transpose_padding(3, 2), (1, 1));
        for input in [1usize, 5, 18, 36] {
            assert_eq!(transposed_output_size(input, 4, 2), input * 2);
            assert_eq!(transposed_output_size(input, 16, 8), input * 8);
            assert_eq!(transposed_output_size(input, 3, 2), input * 2);
        }
    }

    #[test]
    fn decoder_biases_start_at_zero() {
        let device = Default::default();
        let decoder = FcnDecoderConfig::for_backbone(
            &BackboneConfig {
                in_channels: 3,
                block_channels: [2, 4, 8, 8, 8],
                fc_channels: 16,
            },
            2,
        )
        .init::<burn_ndarray::NdArray<f32>>(&device);

        let biases = [
            decoder.layer7_proj.bias.as_ref(),
            decoder.layer4_proj.bias.as_ref(),
            decoder.layer3_proj.bias.as_ref(),
            decoder.layer7_up.bias.as_ref(),
            decoder.skip4_up.bias.as_ref(),
            decoder.output_up.bias.as_ref(),
        ];
        for bias in biases {
            let values = bias.unwrap().val().into_data().to_vec::<f32>().unwrap();
            assert_eq!(values, vec![0.0, 0.0]);
        }
        let kernel = decoder.layer7_proj.weight.val().into_data().to_vec::<f32>().unwrap();
        assert!(kernel.iter().any(|w| *w != 0.0));
    }

    #[test]
    fn decoder_scale_matches_backbone_stride() {
        assert_eq!(DECODER_SCALE, crate::backbone::BACKBONE_STRIDE);
    }
}
