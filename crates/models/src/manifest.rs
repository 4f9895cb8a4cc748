//! Backbone export/restore contract.
//!
//! A backbone directory holds `manifest.json` plus a Burn record with the
//! weights. The manifest names the five tensors the decoder and training loop
//! bind to; the names are a versioned schema shared by the exporter and the
//! loader, and every one is checked on restore.

use crate::backbone::{BackboneConfig, Vgg16Backbone};
use crate::error::{ModelError, ModelResult};
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;
pub const BACKBONE_TAG: &str = "vgg16";
pub const DEFAULT_WEIGHTS: &str = "variables/vgg16.bin";

pub const IMAGE_INPUT: &str = "image_input";
pub const KEEP_PROB: &str = "keep_prob";
pub const LAYER3_OUT: &str = "layer3_out";
pub const LAYER4_OUT: &str = "layer4_out";
pub const LAYER7_OUT: &str = "layer7_out";

/// Named, shaped slot in the backbone interface. `None` dims are bound at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub name: String,
    pub dims: Vec<Option<usize>>,
}

impl TensorSpec {
    pub fn new(name: &str, dims: Vec<Option<usize>>) -> Self {
        Self {
            name: name.to_string(),
            dims,
        }
    }

    pub fn scalar(name: &str) -> Self {
        Self::new(name, Vec::new())
    }

    /// `[batch, channels, height, width]` with only the channel count fixed.
    pub fn feature_map(name: &str, channels: usize) -> Self {
        Self::new(name, vec![None, Some(channels), None, None])
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }
}

/// The five tensors a restored backbone exposes, in binding order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackboneEndpoints {
    pub image_input: TensorSpec,
    pub keep_prob: TensorSpec,
    pub layer3_out: TensorSpec,
    pub layer4_out: TensorSpec,
    pub layer7_out: TensorSpec,
}

impl BackboneEndpoints {
    pub fn for_config(cfg: &BackboneConfig) -> Self {
        Self {
            image_input: TensorSpec::feature_map(IMAGE_INPUT, cfg.in_channels),
            keep_prob: TensorSpec::scalar(KEEP_PROB),
            layer3_out: TensorSpec::feature_map(LAYER3_OUT, cfg.layer3_channels()),
            layer4_out: TensorSpec::feature_map(LAYER4_OUT, cfg.layer4_channels()),
            layer7_out: TensorSpec::feature_map(LAYER7_OUT, cfg.layer7_channels()),
        }
    }

    pub fn as_array(&self) -> [&TensorSpec; 5] {
        [
            &self.image_input,
            &self.keep_prob,
            &self.layer3_out,
            &self.layer4_out,
            &self.layer7_out,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackboneManifest {
    pub schema_version: u32,
    pub tag: String,
    /// Weights record path, relative to the backbone directory.
    pub weights: String,
    pub config: BackboneConfig,
    pub tensors: Vec<TensorSpec>,
}

impl BackboneManifest {
    pub fn new(config: BackboneConfig) -> Self {
        let tensors = BackboneEndpoints::for_config(&config)
            .as_array()
            .into_iter()
            .cloned()
            .collect();
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            tag: BACKBONE_TAG.to_string(),
            weights: DEFAULT_WEIGHTS.to_string(),
            config,
            tensors,
        }
    }

    pub fn read(dir: &Path) -> ModelResult<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(ModelError::MissingModelFile { path });
        }
        let raw = fs::read(&path).map_err(|source| ModelError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| ModelError::Manifest { path, source })
    }

    pub fn write(&self, dir: &Path) -> ModelResult<()> {
        fs::create_dir_all(dir).map_err(|source| ModelError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_vec_pretty(self).map_err(|source| ModelError::Manifest {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|source| ModelError::Io { path, source })
    }

    /// Resolve the expected endpoints against the declared tensors.
    pub fn endpoints(&self) -> ModelResult<BackboneEndpoints> {
        if self.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(ModelError::SchemaVersion {
                expected: MANIFEST_SCHEMA_VERSION,
                found: self.schema_version,
            });
        }
        if self.tag != BACKBONE_TAG {
            return Err(ModelError::TagMismatch {
                expected: BACKBONE_TAG.to_string(),
                found: self.tag.clone(),
            });
        }
        let expected = BackboneEndpoints::for_config(&self.config);
        for spec in expected.as_array() {
            let declared = self.lookup(&spec.name)?;
            if declared.dims != spec.dims {
                return Err(ModelError::EndpointShape {
                    name: spec.name.clone(),
                    expected: spec.dims.clone(),
                    found: declared.dims.clone(),
                });
            }
        }
        Ok(expected)
    }

    pub fn weights_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.weights)
    }

    fn lookup(&self, name: &str) -> ModelResult<&TensorSpec> {
        self.tensors
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ModelError::TensorNameMismatch {
                expected: name.to_string(),
                available: self.tensors.iter().map(|t| t.name.clone()).collect(),
            })
    }
}

#[derive(Debug)]
pub struct LoadedBackbone<B: Backend> {
    pub model: Vgg16Backbone<B>,
    pub endpoints: BackboneEndpoints,
    pub manifest: BackboneManifest,
}

/// Restore a pretrained backbone from `path` (a directory with `manifest.json`
/// and the weights record).
pub fn load_backbone<B: Backend, P: AsRef<Path>>(
    path: P,
    device: &B::Device,
) -> ModelResult<LoadedBackbone<B>> {
    let dir = path.as_ref();
    if !dir.is_dir() {
        return Err(ModelError::MissingModelFile {
            path: dir.to_path_buf(),
        });
    }
    let manifest = BackboneManifest::read(dir)?;
    let endpoints = manifest.endpoints()?;
    let weights = manifest.weights_path(dir);
    if !weights.is_file() {
        return Err(ModelError::MissingModelFile { path: weights });
    }

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let model = manifest
        .config
        .init::<B>(device)
        .load_file(weights.clone(), &recorder, device)
        .map_err(|e| ModelError::Record {
            path: weights.clone(),
            message: e.to_string(),
        })?;
    log::info!(
        "restored {} backbone from {} ({} parameters)",
        manifest.tag,
        dir.display(),
        model.num_params()
    );

    Ok(LoadedBackbone {
        model,
        endpoints,
        manifest,
    })
}

/// Write `model` and its manifest into `path`, using the canonical tensor names.
pub fn export_backbone<B: Backend, P: AsRef<Path>>(
    model: &Vgg16Backbone<B>,
    config: &BackboneConfig,
    path: P,
) -> ModelResult<BackboneManifest> {
    let dir = path.as_ref();
    let manifest = BackboneManifest::new(config.clone());
    let weights = manifest.weights_path(dir);
    if let Some(parent) = weights.parent() {
        fs::create_dir_all(parent).map_err(|source| ModelError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(weights.clone(), &recorder)
        .map_err(|e| ModelError::Record {
            path: weights,
            message: e.to_string(),
        })?;
    manifest.write(dir)?;
    Ok(manifest)
}
