//! Error types for backbone restore and network assembly.

use std::path::PathBuf;
use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("pretrained model file missing: {path}")]
    MissingModelFile { path: PathBuf },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("backbone manifest parse error at {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported backbone manifest schema version {found} (this build reads {expected})")]
    SchemaVersion { expected: u32, found: u32 },
    #[error("backbone tag mismatch: expected {expected:?}, manifest declares {found:?}")]
    TagMismatch { expected: String, found: String },
    #[error("backbone tensor {expected:?} not found in restored model (available: {available:?})")]
    TensorNameMismatch {
        expected: String,
        available: Vec<String>,
    },
    #[error("backbone tensor {name:?} declares dims {found:?}, expected {expected:?}")]
    EndpointShape {
        name: String,
        expected: Vec<Option<usize>>,
        found: Vec<Option<usize>>,
    },
    #[error("record error at {path}: {message}")]
    Record { path: PathBuf, message: String },
    #[error("shape mismatch at {context}: {left:?} vs {right:?}")]
    ShapeMismatch {
        context: &'static str,
        left: Vec<usize>,
        right: Vec<usize>,
    },
    #[error("input resolution {height}x{width} is not a multiple of {multiple}")]
    InputResolution {
        height: usize,
        width: usize,
        multiple: usize,
    },
}
