use std::fs;
use std::path::Path;

use burn_ndarray::NdArray;
use image::{Rgb, RgbImage};
use training::dataset::{index_samples, BACKGROUND_COLOR};
use training::{BatchSource, DatasetError, KittiRoadDataset};

type B = NdArray<f32>;

const ROAD: Rgb<u8> = Rgb([255, 0, 255]);

/// `image_2/um_00000{i}.png` with a label whose left half is background.
fn write_training_set(root: &Path, count: usize) {
    let image_dir = root.join("image_2");
    let label_dir = root.join("gt_image_2");
    fs::create_dir_all(&image_dir).unwrap();
    fs::create_dir_all(&label_dir).unwrap();
    for i in 0..count {
        RgbImage::from_fn(64, 32, |x, y| Rgb([x as u8, y as u8, 40]))
            .save(image_dir.join(format!("um_00000{i}.png")))
            .unwrap();
        RgbImage::from_fn(64, 32, |x, _| if x < 32 { BACKGROUND_COLOR } else { ROAD })
            .save(label_dir.join(format!("um_road_00000{i}.png")))
            .unwrap();
        // lane labels sit alongside road labels and are ignored
        RgbImage::new(64, 32)
            .save(label_dir.join(format!("um_lane_00000{i}.png")))
            .unwrap();
    }
}

#[test]
fn samples_pair_images_with_road_labels() {
    let tmp = tempfile::tempdir().unwrap();
    write_training_set(tmp.path(), 3);

    let samples = index_samples(tmp.path()).unwrap();
    assert_eq!(samples.len(), 3);
    for sample in &samples {
        let image = sample.image.file_name().unwrap().to_str().unwrap();
        let label = sample.label.file_name().unwrap().to_str().unwrap();
        assert_eq!(label, image.replace("um_", "um_road_"));
    }
}

#[test]
fn batches_cover_the_epoch_with_one_hot_labels() {
    let tmp = tempfile::tempdir().unwrap();
    write_training_set(tmp.path(), 3);
    let device = Default::default();

    let mut dataset = KittiRoadDataset::new(tmp.path(), (32, 64), 2, Some(7)).unwrap();
    assert_eq!(dataset.len(), 3);
    let batches: Vec<_> = BatchSource::<B>::batches(&mut dataset, 2, &device)
        .unwrap()
        .map(|b| b.unwrap())
        .collect();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].images.dims(), [2, 3, 32, 64]);
    assert_eq!(batches[0].labels.dims(), [2, 2, 32, 64]);
    assert_eq!(batches[1].images.dims(), [1, 3, 32, 64]);

    let labels = batches[1].labels.clone().into_data().to_vec::<f32>().unwrap();
    let plane = 32 * 64;
    let background: f32 = labels[..plane].iter().sum();
    let road: f32 = labels[plane..].iter().sum();
    assert_eq!(background, (plane / 2) as f32);
    assert_eq!(road, (plane / 2) as f32);

    let images = batches[0].images.clone().into_data().to_vec::<f32>().unwrap();
    assert!(images.iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn images_are_resized_to_the_network_shape() {
    let tmp = tempfile::tempdir().unwrap();
    write_training_set(tmp.path(), 1);
    let device = Default::default();

    let mut dataset = KittiRoadDataset::new(tmp.path(), (64, 96), 2, Some(1)).unwrap();
    let batch = BatchSource::<B>::batches(&mut dataset, 8, &device)
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(batch.images.dims(), [1, 3, 64, 96]);
    assert_eq!(batch.labels.dims(), [1, 2, 64, 96]);
}

#[test]
fn missing_directories_and_labels_are_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let err = KittiRoadDataset::new(&tmp.path().join("missing"), (32, 64), 2, None).unwrap_err();
    assert!(matches!(err, DatasetError::MissingDirectory { .. }));

    write_training_set(tmp.path(), 2);
    fs::remove_file(tmp.path().join("gt_image_2/um_road_000001.png")).unwrap();
    let err = KittiRoadDataset::new(tmp.path(), (32, 64), 2, None).unwrap_err();
    match err {
        DatasetError::MissingLabel { image } => {
            assert!(image.ends_with("um_000001.png"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn only_two_class_labels_are_supported() {
    let tmp = tempfile::tempdir().unwrap();
    write_training_set(tmp.path(), 1);
    let err = KittiRoadDataset::new(tmp.path(), (32, 64), 3, None).unwrap_err();
    assert!(matches!(err, DatasetError::UnsupportedClasses { found: 3 }));
}
