//! Error types for training, batching and configuration.

use models::ModelError;
use std::path::PathBuf;
use thiserror::Error;

pub type TrainResult<T> = Result<T, TrainError>;
pub type DatasetResult<T> = Result<T, DatasetError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("shape mismatch: {left_name} {left:?} vs {right_name} {right:?}")]
    ShapeMismatch {
        left_name: &'static str,
        left: Vec<usize>,
        right_name: &'static str,
        right: Vec<usize>,
    },
    #[error("expected {expected} classes on the class axis, found {found}")]
    ClassCount { expected: usize, found: usize },
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset directory missing: {path}")]
    MissingDirectory { path: PathBuf },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no ground-truth label for image {image}")]
    MissingLabel { image: PathBuf },
    #[error("no training images under {path}")]
    Empty { path: PathBuf },
    #[error("road labels encode 2 classes, {found} requested")]
    UnsupportedClasses { found: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file missing: {path}")]
    Missing { path: PathBuf },
    #[error("io error reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}
