//! VGG16 encoder reused as the FCN backbone.
//!
//! The fully-connected layers of the classifier are expressed as convolutions
//! (`fc6` as 7x7, `fc7` as 1x1) so the network accepts arbitrary input sizes.
//! Three activations are exposed to the decoder:
//! - `layer3`: pool3 output, stride 8
//! - `layer4`: pool4 output, stride 16
//! - `layer7`: fc7 output (after ReLU + dropout), stride 32

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};
use serde::{Deserialize, Serialize};

/// Number of 3x3 convolutions in each VGG16 block.
const CONVS_PER_BLOCK: [usize; 5] = [2, 2, 3, 3, 3];

/// Total downsampling between the input image and `layer7`.
pub const BACKBONE_STRIDE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackboneConfig {
    pub in_channels: usize,
    /// Output channels of conv blocks 1..=5.
    pub block_channels: [usize; 5],
    /// Width of the fc6/fc7 convolutions.
    pub fc_channels: usize,
}

impl Default for BackboneConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            block_channels: [64, 128, 256, 512, 512],
            fc_channels: 4096,
        }
    }
}

impl BackboneConfig {
    pub fn layer3_channels(&self) -> usize {
        self.block_channels[2]
    }

    pub fn layer4_channels(&self) -> usize {
        self.block_channels[3]
    }

    pub fn layer7_channels(&self) -> usize {
        self.fc_channels
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg16Backbone<B> {
        Vgg16Backbone::new(self, device)
    }
}

#[derive(Debug, Module)]
pub struct ConvBlock<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    fn new(in_channels: usize, out_channels: usize, depth: usize, device: &B::Device) -> Self {
        let mut convs = Vec::with_capacity(depth);
        let mut channels = in_channels;
        for _ in 0..depth {
            convs.push(
                Conv2dConfig::new([channels, out_channels], [3, 3])
                    .with_padding(PaddingConfig2d::Same)
                    .init(device),
            );
            channels = out_channels;
        }
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        Self { convs, pool }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input;
        for conv in &self.convs {
            x = relu(conv.forward(x));
        }
        self.pool.forward(x)
    }
}

/// Activations handed from the encoder to the decoder, `[batch, channels, height, width]`.
#[derive(Debug, Clone)]
pub struct FeatureMaps<B: Backend> {
    pub layer3: Tensor<B, 4>,
    pub layer4: Tensor<B, 4>,
    pub layer7: Tensor<B, 4>,
}

#[derive(Debug, Module)]
pub struct Vgg16Backbone<B: Backend> {
    block1: ConvBlock<B>,
    block2: ConvBlock<B>,
    block3: ConvBlock<B>,
    block4: ConvBlock<B>,
    block5: ConvBlock<B>,
    fc6: Conv2d<B>,
    fc7: Conv2d<B>,
}

impl<B: Backend> Vgg16Backbone<B> {
    pub fn new(cfg: &BackboneConfig, device: &B::Device) -> Self {
        let [c1, c2, c3, c4, c5] = cfg.block_channels;
        let [d1, d2, d3, d4, d5] = CONVS_PER_BLOCK;
        Self {
            block1: ConvBlock::new(cfg.in_channels, c1, d1, device),
            block2: ConvBlock::new(c1, c2, d2, device),
            block3: ConvBlock::new(c2, c3, d3, device),
            block4: ConvBlock::new(c3, c4, d4, device),
            block5: ConvBlock::new(c4, c5, d5, device),
            fc6: Conv2dConfig::new([c5, cfg.fc_channels], [7, 7])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            fc7: Conv2dConfig::new([cfg.fc_channels, cfg.fc_channels], [1, 1])
                .with_padding(PaddingConfig2d::Valid)
                .init(device),
        }
    }

    /// Run the encoder. `keep_prob` is bound per call: the training loop
    /// passes its configured constant, inference passes 1.0.
    pub fn forward(&self, image: Tensor<B, 4>, keep_prob: f64) -> FeatureMaps<B> {
        let x = self.block1.forward(image);
        let x = self.block2.forward(x);
        let layer3 = self.block3.forward(x);
        let layer4 = self.block4.forward(layer3.clone());
        let x = self.block5.forward(layer4.clone());
        let x = keep_prob_dropout(relu(self.fc6.forward(x)), keep_prob);
        let layer7 = keep_prob_dropout(relu(self.fc7.forward(x)), keep_prob);
        FeatureMaps {
            layer3,
            layer4,
            layer7,
        }
    }
}

/// Inverted dropout parameterized by keep probability; identity when `keep_prob >= 1`.
pub fn keep_prob_dropout<B: Backend, const D: usize>(
    input: Tensor<B, D>,
    keep_prob: f64,
) -> Tensor<B, D> {
    if keep_prob >= 1.0 {
        return input;
    }
    let mask = Tensor::<B, D>::random(
        input.shape(),
        Distribution::Bernoulli(keep_prob),
        &input.device(),
    );
    (input * mask).div_scalar(keep_prob)
}
