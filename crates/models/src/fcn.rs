use crate::backbone::{Vgg16Backbone, BACKBONE_STRIDE};
use crate::decoder::{FcnDecoder, FcnDecoderConfig};
use crate::error::{ModelError, ModelResult};
use crate::manifest::LoadedBackbone;
use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Backbone + decoder, trained end to end.
#[derive(Debug, Module)]
pub struct Fcn8s<B: Backend> {
    backbone: Vgg16Backbone<B>,
    decoder: FcnDecoder<B>,
}

impl<B: Backend> Fcn8s<B> {
    pub fn new(backbone: Vgg16Backbone<B>, decoder: FcnDecoder<B>) -> Self {
        Self { backbone, decoder }
    }

    /// Attach a freshly initialized decoder to a restored backbone. The decoder
    /// input widths must agree with the backbone's declared feature maps.
    pub fn from_backbone(
        loaded: LoadedBackbone<B>,
        decoder: FcnDecoderConfig,
        device: &B::Device,
    ) -> ModelResult<Self> {
        let cfg = &loaded.manifest.config;
        let expected = [
            cfg.layer3_channels(),
            cfg.layer4_channels(),
            cfg.layer7_channels(),
        ];
        let requested = [
            decoder.layer3_channels,
            decoder.layer4_channels,
            decoder.layer7_channels,
        ];
        if expected != requested {
            return Err(ModelError::ShapeMismatch {
                context: "decoder input channels",
                left: requested.to_vec(),
                right: expected.to_vec(),
            });
        }
        Ok(Self::new(loaded.model, decoder.init(device)))
    }

    pub fn num_classes(&self) -> usize {
        self.decoder.num_classes()
    }

    /// Logits `[batch, num_classes, height, width]` matching the input image size.
    pub fn forward(&self, images: Tensor<B, 4>, keep_prob: f64) -> ModelResult<Tensor<B, 4>> {
        let [_, _, height, width] = images.dims();
        if height % BACKBONE_STRIDE != 0 || width % BACKBONE_STRIDE != 0 {
            return Err(ModelError::InputResolution {
                height,
                width,
                multiple: BACKBONE_STRIDE,
            });
        }
        let features = self.backbone.forward(images, keep_prob);
        self.decoder.forward(features)
    }

    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        self.decoder.l2_penalty()
    }
}
