use std::path::{Path, PathBuf};

use models::{BackboneConfig, FcnDecoderConfig, BACKBONE_STRIDE};
use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};
use crate::hardware::BackendKind;
use crate::train::TrainHyperParams;

pub const DEFAULT_CONFIG_NAME: &str = "fcn-road.toml";
pub const CONFIG_ENV: &str = "FCN_CONFIG";

pub const LEARNING_RATE: f64 = 1e-4;
pub const KEEP_PROB: f64 = 0.8;
pub const BATCH_SIZE: usize = 8;
pub const EPOCHS: usize = 30;
pub const NUM_CLASSES: usize = 2;
/// (height, width) every training and test image is resized to.
pub const IMAGE_SHAPE: (usize, usize) = (160, 576);

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub learning_rate: f64,
    pub keep_prob: f64,
    pub batch_size: usize,
    pub epochs: usize,
    pub num_classes: usize,
    pub image_shape: (usize, usize),
    pub data_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub init_std: f64,
    pub l2_scale: f64,
    pub seed: Option<u64>,
    pub backend: BackendKind,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            learning_rate: LEARNING_RATE,
            keep_prob: KEEP_PROB,
            batch_size: BATCH_SIZE,
            epochs: EPOCHS,
            num_classes: NUM_CLASSES,
            image_shape: IMAGE_SHAPE,
            data_dir: PathBuf::from("./data"),
            runs_dir: PathBuf::from("./runs"),
            init_std: 0.01,
            l2_scale: 1e-5,
            seed: None,
            backend: if cfg!(feature = "backend-wgpu") {
                BackendKind::Wgpu
            } else {
                BackendKind::NdArray
            },
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RunConfigFile {
    data_dir: Option<String>,
    runs_dir: Option<String>,
    seed: Option<u64>,
    backend: Option<BackendKind>,
    training: Option<TrainingSection>,
    decoder: Option<DecoderSection>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TrainingSection {
    learning_rate: Option<f64>,
    keep_prob: Option<f64>,
    batch_size: Option<usize>,
    epochs: Option<usize>,
    num_classes: Option<usize>,
    image_height: Option<usize>,
    image_width: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DecoderSection {
    init_std: Option<f64>,
    l2_scale: Option<f64>,
}

impl RunConfig {
    /// Defaults, overlaid with `$FCN_CONFIG` or `./fcn-road.toml` when present.
    pub fn load() -> ConfigResult<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_path(Path::new(&path));
        }
        let default_path = Path::new(DEFAULT_CONFIG_NAME);
        if default_path.exists() {
            return Self::from_path(default_path);
        }
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::Missing {
                path: path.to_path_buf(),
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    pub fn from_toml_str(raw: &str, origin: &Path) -> ConfigResult<Self> {
        let file: RunConfigFile = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: RunConfigFile) -> Self {
        let mut cfg = Self::default();
        if let Some(dir) = file.data_dir {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = file.runs_dir {
            cfg.runs_dir = PathBuf::from(dir);
        }
        cfg.seed = file.seed.or(cfg.seed);
        cfg.backend = file.backend.unwrap_or(cfg.backend);

        let training = file.training.unwrap_or_default();
        cfg.learning_rate = training.learning_rate.unwrap_or(cfg.learning_rate);
        cfg.keep_prob = training.keep_prob.unwrap_or(cfg.keep_prob);
        cfg.batch_size = training.batch_size.unwrap_or(cfg.batch_size);
        cfg.epochs = training.epochs.unwrap_or(cfg.epochs);
        cfg.num_classes = training.num_classes.unwrap_or(cfg.num_classes);
        cfg.image_shape = (
            training.image_height.unwrap_or(cfg.image_shape.0),
            training.image_width.unwrap_or(cfg.image_shape.1),
        );

        let decoder = file.decoder.unwrap_or_default();
        cfg.init_std = decoder.init_std.unwrap_or(cfg.init_std);
        cfg.l2_scale = decoder.l2_scale.unwrap_or(cfg.l2_scale);
        cfg
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.epochs == 0 {
            return invalid("epochs must be at least 1".into());
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1".into());
        }
        if self.num_classes != NUM_CLASSES {
            return invalid(format!(
                "num_classes must be {NUM_CLASSES} (road/background labels), got {}",
                self.num_classes
            ));
        }
        if !(self.keep_prob > 0.0 && self.keep_prob <= 1.0) {
            return invalid(format!("keep_prob must be in (0, 1], got {}", self.keep_prob));
        }
        if !(self.learning_rate > 0.0) {
            return invalid(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            ));
        }
        if !(self.init_std > 0.0) || !(self.l2_scale >= 0.0) {
            return invalid("decoder init_std must be positive and l2_scale non-negative".into());
        }
        let (height, width) = self.image_shape;
        if height == 0
            || width == 0
            || height % BACKBONE_STRIDE != 0
            || width % BACKBONE_STRIDE != 0
        {
            return invalid(format!(
                "image_shape {height}x{width} must be a non-zero multiple of {BACKBONE_STRIDE}"
            ));
        }
        Ok(())
    }

    pub fn vgg_dir(&self) -> PathBuf {
        self.data_dir.join("vgg")
    }

    pub fn training_dir(&self) -> PathBuf {
        self.data_dir.join("data_road/training")
    }

    pub fn testing_dir(&self) -> PathBuf {
        self.data_dir.join("data_road/testing")
    }

    pub fn hyper_params(&self) -> TrainHyperParams {
        TrainHyperParams {
            epochs: self.epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            keep_prob: self.keep_prob,
            num_classes: self.num_classes,
        }
    }

    pub fn decoder_config(&self, backbone: &BackboneConfig) -> FcnDecoderConfig {
        FcnDecoderConfig::for_backbone(backbone, self.num_classes)
            .with_init_std(self.init_std)
            .with_l2_scale(self.l2_scale)
    }
}
