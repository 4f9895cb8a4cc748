use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use training::{run_with, RunConfig};

#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Train an FCN-8s road segmenter on KITTI and export inference overlays"
)]
struct Args {
    /// TOML file overriding the built-in hyperparameters and paths.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => RunConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RunConfig::load().context("failed to load run configuration")?,
    };
    let summary = run_with(&config)?;
    if let Some(last) = summary.epochs.last() {
        log::info!("finished: {last}");
    }
    Ok(())
}
