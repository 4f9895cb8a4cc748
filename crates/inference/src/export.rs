use crate::error::{InferenceError, InferenceResult};
use crate::overlay::overlay_mask;
use crate::preprocess::png_files;
use crate::segment::segment_image;
use burn::tensor::backend::Backend;
use models::Fcn8s;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Segment every `image_2/*.png` under `test_dir` and write road overlays into
/// a fresh timestamped directory below `runs_dir`. Returns that directory.
pub fn save_inference_samples<B: Backend>(
    runs_dir: &Path,
    test_dir: &Path,
    model: &Fcn8s<B>,
    image_shape: (usize, usize),
    device: &B::Device,
) -> InferenceResult<PathBuf> {
    let image_dir = test_dir.join("image_2");
    if !image_dir.is_dir() {
        return Err(InferenceError::MissingDirectory { path: image_dir });
    }
    let inputs = png_files(&image_dir).map_err(|source| InferenceError::Io {
        path: image_dir.clone(),
        source,
    })?;

    let output_dir = runs_dir.join(run_stamp());
    fs::create_dir_all(&output_dir).map_err(|source| InferenceError::Io {
        path: output_dir.clone(),
        source,
    })?;
    log::info!(
        "saving {} inference samples to {}",
        inputs.len(),
        output_dir.display()
    );

    for path in inputs {
        let image = image::open(&path)
            .map_err(|source| InferenceError::Image {
                path: path.clone(),
                source,
            })?
            .to_rgb8();
        let segmentation = segment_image(model, &image, image_shape, device)?;
        let overlay = overlay_mask(&segmentation.image, &segmentation.mask);

        let Some(name) = path.file_name() else {
            continue;
        };
        let out_path = output_dir.join(name);
        overlay
            .save(&out_path)
            .map_err(|source| InferenceError::Image {
                path: out_path.clone(),
                source,
            })?;
        log::debug!(
            "{}: {} road pixels",
            out_path.display(),
            segmentation.mask.road_pixels()
        );
    }

    Ok(output_dir)
}

fn run_stamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:06}", now.as_secs(), now.subsec_micros())
}
