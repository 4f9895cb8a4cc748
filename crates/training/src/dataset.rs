//! KITTI road training set: `image_2/*.png` paired with `gt_image_2/*_road_*.png`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use inference::preprocess::{png_files, resize_rgb, rgb_to_chw};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{DatasetError, DatasetResult, TrainError, TrainResult};
use crate::train::{BatchSource, BatchStream, SegmentationBatch};

/// Label color of non-road pixels in the ground-truth images.
pub const BACKGROUND_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const IMAGE_DIR: &str = "image_2";
pub const LABEL_DIR: &str = "gt_image_2";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoadSample {
    pub image: PathBuf,
    pub label: PathBuf,
}

/// Fail early when the training directory is absent.
pub fn require_dataset(path: &Path) -> DatasetResult<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(DatasetError::MissingDirectory {
            path: path.to_path_buf(),
        })
    }
}

/// Pair every training image with its road label.
pub fn index_samples(root: &Path) -> DatasetResult<Vec<RoadSample>> {
    require_dataset(root)?;
    let image_dir = root.join(IMAGE_DIR);
    let label_dir = root.join(LABEL_DIR);
    require_dataset(&image_dir)?;
    require_dataset(&label_dir)?;

    let mut labels = HashMap::new();
    for path in list_png(&label_dir)? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.contains("_road_") {
            continue;
        }
        labels.insert(label_key(name), path.clone());
    }

    let mut samples = Vec::new();
    for image in list_png(&image_dir)? {
        let name = image
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let Some(label) = labels.get(&name) else {
            return Err(DatasetError::MissingLabel { image });
        };
        samples.push(RoadSample {
            label: label.clone(),
            image,
        });
    }
    if samples.is_empty() {
        return Err(DatasetError::Empty { path: image_dir });
    }
    Ok(samples)
}

/// `um_road_000000.png` -> `um_000000.png`.
fn label_key(name: &str) -> String {
    name.replacen("_road_", "_", 1).replacen("_lane_", "_", 1)
}

fn list_png(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    png_files(dir).map_err(|source| DatasetError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// One-hot `[2, height, width]`: channel 0 background, channel 1 road.
pub fn encode_label(label: &RgbImage) -> Vec<f32> {
    let (width, height) = label.dimensions();
    let plane = (width * height) as usize;
    let mut buf = vec![0.0; plane * 2];
    for (i, pixel) in label.pixels().enumerate() {
        if *pixel == BACKGROUND_COLOR {
            buf[i] = 1.0;
        } else {
            buf[plane + i] = 1.0;
        }
    }
    buf
}

fn open_rgb(path: &Path) -> DatasetResult<RgbImage> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| DatasetError::Image {
            path: path.to_path_buf(),
            source,
        })
}

#[derive(Debug)]
pub struct KittiRoadDataset {
    samples: Vec<RoadSample>,
    image_shape: (usize, usize),
    rng: StdRng,
}

impl KittiRoadDataset {
    /// Index `root` (a `data_road/training` directory). Only the two-class
    /// road/background encoding is supported.
    pub fn new(
        root: &Path,
        image_shape: (usize, usize),
        num_classes: usize,
        seed: Option<u64>,
    ) -> DatasetResult<Self> {
        if num_classes != 2 {
            return Err(DatasetError::UnsupportedClasses { found: num_classes });
        }
        let samples = index_samples(root)?;
        log::info!("indexed {} road samples under {}", samples.len(), root.display());
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            samples,
            image_shape,
            rng,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[RoadSample] {
        &self.samples
    }
}

impl<B: Backend> BatchSource<B> for KittiRoadDataset {
    fn batches(
        &mut self,
        batch_size: usize,
        device: &B::Device,
    ) -> TrainResult<BatchStream<'_, B>> {
        let mut order: Vec<usize> = (0..self.samples.len()).collect();
        order.shuffle(&mut self.rng);
        let chunks: Vec<Vec<usize>> = order
            .chunks(batch_size.max(1))
            .map(<[usize]>::to_vec)
            .collect();

        let samples = &self.samples;
        let image_shape = self.image_shape;
        let device = device.clone();
        Ok(Box::new(chunks.into_iter().map(move |chunk| {
            load_batch::<B>(samples, &chunk, image_shape, &device).map_err(TrainError::from)
        })))
    }
}

fn load_batch<B: Backend>(
    samples: &[RoadSample],
    indices: &[usize],
    image_shape: (usize, usize),
    device: &B::Device,
) -> DatasetResult<SegmentationBatch<B>> {
    let (height, width) = image_shape;
    let n = indices.len();
    let mut images = Vec::with_capacity(n * 3 * height * width);
    let mut labels = Vec::with_capacity(n * 2 * height * width);

    for &idx in indices {
        let sample = &samples[idx];
        let image = resize_rgb(&open_rgb(&sample.image)?, image_shape);
        images.extend(rgb_to_chw(&image));

        // nearest keeps label colors exact
        let label = imageops::resize(
            &open_rgb(&sample.label)?,
            width as u32,
            height as u32,
            FilterType::Nearest,
        );
        labels.extend(encode_label(&label));
    }

    Ok(SegmentationBatch {
        images: Tensor::from_data(TensorData::new(images, [n, 3, height, width]), device),
        labels: Tensor::from_data(TensorData::new(labels, [n, 2, height, width]), device),
    })
}
