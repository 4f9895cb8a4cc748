use std::path::PathBuf;

use anyhow::Context;
use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use burn::tensor::backend::Backend;
use inference::save_inference_samples;
use models::{load_backbone, Fcn8s};

use crate::config::RunConfig;
use crate::dataset::{require_dataset, KittiRoadDataset};
use crate::hardware::{
    detect_hardware, report_hardware, validate_backend_choice, BackendKind, HardwareStatus,
};
use crate::optim::build_train_op;
use crate::train::{train_nn, EpochReport};
use crate::{CpuBackend, TrainBackend};

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub epochs: Vec<EpochReport>,
    /// Directory holding the inference overlays of this run.
    pub output_dir: PathBuf,
    pub hardware: HardwareStatus,
}

/// Train with the compiled-in defaults (plus any TOML overlay) and export
/// inference samples.
pub fn run() -> anyhow::Result<RunSummary> {
    let config = RunConfig::load().context("failed to load run configuration")?;
    run_with(&config)
}

pub fn run_with(config: &RunConfig) -> anyhow::Result<RunSummary> {
    config.validate().context("invalid run configuration")?;
    validate_backend_choice(config.backend)?;

    let hardware = detect_hardware();
    report_hardware(&hardware);

    let training_dir = config.training_dir();
    require_dataset(&training_dir)
        .with_context(|| format!("training data not found at {}", training_dir.display()))?;

    if hardware.accelerated && config.backend == BackendKind::Wgpu {
        train_and_export::<TrainBackend>(config, hardware)
    } else {
        train_and_export::<CpuBackend>(config, hardware)
    }
}

fn train_and_export<B: Backend>(
    config: &RunConfig,
    hardware: HardwareStatus,
) -> anyhow::Result<RunSummary> {
    let device = B::Device::default();
    let vgg_dir = config.vgg_dir();
    let loaded = load_backbone::<Autodiff<B>, _>(&vgg_dir, &device)
        .with_context(|| format!("failed to restore backbone from {}", vgg_dir.display()))?;
    let decoder = config.decoder_config(&loaded.manifest.config);
    let model = Fcn8s::from_backbone(loaded, decoder, &device)?;
    let mut train_op = build_train_op::<Autodiff<B>, Fcn8s<Autodiff<B>>>(config.learning_rate);

    let mut dataset = KittiRoadDataset::new(
        &config.training_dir(),
        config.image_shape,
        config.num_classes,
        config.seed,
    )?;
    log::info!(
        "training for {} epochs, batch size {}, learning rate {}, keep prob {}",
        config.epochs,
        config.batch_size,
        config.learning_rate,
        config.keep_prob
    );
    let (model, epochs) = train_nn(
        model,
        &mut train_op,
        &mut dataset,
        &config.hyper_params(),
        &device,
    )?;

    let model = model.valid();
    let output_dir = save_inference_samples::<B>(
        &config.runs_dir,
        &config.testing_dir(),
        &model,
        config.image_shape,
        &device,
    )
    .context("failed to export inference samples")?;
    log::info!("inference samples written to {}", output_dir.display());

    Ok(RunSummary {
        epochs,
        output_dir,
        hardware,
    })
}
