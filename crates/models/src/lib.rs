//! Burn modules for FCN-8s road segmentation.
//!
//! This crate defines the network pieces used by training and inference:
//! - `Vgg16Backbone`: pretrained VGG16 encoder exposing pool3, pool4 and fc7 activations.
//! - `FcnDecoder`: 1x1 projections, transposed-conv upsampling and two skip connections.
//! - `Fcn8s`: the assembled network.
//!
//! Backbones are restored from a directory holding a JSON manifest and a Burn
//! record; see [`manifest`] for the tensor-name contract.

pub mod backbone;
pub mod decoder;
pub mod error;
pub mod fcn;
pub mod manifest;

pub use backbone::{BackboneConfig, FeatureMaps, Vgg16Backbone, BACKBONE_STRIDE};
pub use decoder::{FcnDecoder, FcnDecoderConfig, DECODER_SCALE};
pub use error::{ModelError, ModelResult};
pub use fcn::Fcn8s;
pub use manifest::{
    export_backbone, load_backbone, BackboneEndpoints, BackboneManifest, LoadedBackbone,
    TensorSpec,
};

pub mod prelude {
    pub use super::{
        load_backbone, BackboneConfig, Fcn8s, FcnDecoder, FcnDecoderConfig, FeatureMaps,
        ModelError, Vgg16Backbone,
    };
}
