use models::ModelError;
use std::path::PathBuf;
use thiserror::Error;

pub type InferenceResult<T> = Result<T, InferenceError>;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("test image directory missing: {path}")]
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
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("model produces {found} classes; road class index {road_class} is out of range")]
    ClassCount { found: usize, road_class: usize },
    #[error("could not read tensor data: {0}")]
    TensorData(String),
}
