#![recursion_limit = "256"]

//! FCN-8s road segmentation training: per-pixel cross-entropy, Adam
//! updates, the epoch loop and KITTI road batches.

pub mod config;
pub mod dataset;
pub mod error;
pub mod hardware;
pub mod loss;
pub mod optim;
pub mod train;
pub mod util;

pub use config::RunConfig;
pub use dataset::{require_dataset, KittiRoadDataset, RoadSample};
pub use error::{ConfigError, DatasetError, TrainError, TrainResult};
pub use hardware::{
    detect_hardware, detect_with, AdapterQuery, AdapterSummary, BackendKind, HardwareStatus,
};
pub use loss::{cross_entropy_loss, flatten_pixels, LossOutput};
pub use optim::{build_train_op, segmentation_objective, StepOutput, TrainOp};
pub use train::{
    train_nn, BatchSource, EpochReport, InMemoryBatches, SegmentationBatch, TrainHyperParams,
};
pub use util::{run, run_with, RunSummary};

/// Backend alias for training (NdArray by default; WGPU if enabled).
/// Runs without a hardware adapter fall back to [`CpuBackend`].
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

pub type CpuBackend = burn_ndarray::NdArray<f32>;
