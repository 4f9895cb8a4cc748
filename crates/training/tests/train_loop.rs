use burn::backend::Autodiff;
use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use models::{BackboneConfig, Fcn8s, FcnDecoderConfig};
use training::loss::scalar_value;
use training::train::BatchStream;
use training::{
    build_train_op, segmentation_objective, train_nn, BatchSource, InMemoryBatches,
    SegmentationBatch, TrainError, TrainHyperParams,
};

type B = Autodiff<NdArray<f32>>;

fn tiny_model() -> Fcn8s<B> {
    let device = Default::default();
    let backbone = BackboneConfig {
        in_channels: 3,
        block_channels: [2, 4, 8, 8, 8],
        fc_channels: 16,
    };
    Fcn8s::new(
        backbone.init(&device),
        FcnDecoderConfig::for_backbone(&backbone, 2).init(&device),
    )
}

/// Three bright images labelled road everywhere, one dark image labelled background.
fn bright_is_road() -> InMemoryBatches<B> {
    let device = Default::default();
    let (n, h, w) = (4, 32, 32);
    let plane = h * w;
    let mut images = Vec::with_capacity(n * 3 * plane);
    let mut labels = Vec::with_capacity(n * 2 * plane);
    for i in 0..n {
        let road = i < 3;
        images.extend(std::iter::repeat(if road { 0.9 } else { 0.1 }).take(3 * plane));
        let (bg, fg) = if road { (0.0, 1.0) } else { (1.0, 0.0) };
        labels.extend(std::iter::repeat(bg).take(plane));
        labels.extend(std::iter::repeat(fg).take(plane));
    }
    InMemoryBatches::new(
        Tensor::from_data(TensorData::new(images, [n, 3, h, w]), &device),
        Tensor::from_data(TensorData::new(labels, [n, 2, h, w]), &device),
    )
    .unwrap()
}

fn hyper(epochs: usize, batch_size: usize) -> TrainHyperParams {
    TrainHyperParams {
        epochs,
        batch_size,
        learning_rate: 5e-3,
        keep_prob: 1.0,
        num_classes: 2,
    }
}

#[test]
fn loss_decreases_on_learnable_data() {
    let device = Default::default();
    let mut source = bright_is_road();
    let mut train_op = build_train_op::<B, Fcn8s<B>>(1e-4);

    let (_model, reports) =
        train_nn(tiny_model(), &mut train_op, &mut source, &hyper(30, 4), &device).unwrap();

    assert_eq!(reports.len(), 30);
    assert_eq!(train_op.learning_rate(), 5e-3);
    let first = reports[0].last_loss.unwrap();
    let last = reports[29].last_loss.unwrap();
    assert!(first > 0.5, "untrained loss should be near ln 2, got {first}");
    assert!(last < first, "loss did not decrease: {first} -> {last}");
    assert!(reports.iter().all(|r| r.batches == 1 && r.epochs == 30));
    assert_eq!(reports[29].epoch, 30);
}

/// Same image twice; the second copy carries road labels of weight 2, so its
/// cross-entropy is exactly double the first.
fn unequal_batches() -> InMemoryBatches<B> {
    let device = Default::default();
    let (h, w) = (32, 32);
    let plane = h * w;
    let image: Vec<f32> = (0..3 * plane).map(|i| (i % 7) as f32 / 7.0).collect();
    let mut labels = Vec::with_capacity(2 * 2 * plane);
    for weight in [1.0, 2.0] {
        labels.extend(std::iter::repeat(0.0).take(plane));
        labels.extend(std::iter::repeat(weight).take(plane));
    }
    InMemoryBatches::new(
        Tensor::from_data(TensorData::new(image.repeat(2), [2, 3, h, w]), &device),
        Tensor::from_data(TensorData::new(labels, [2, 2, h, w]), &device),
    )
    .unwrap()
}

#[test]
fn epoch_reports_the_final_batch_loss() {
    let device = Default::default();
    let model = tiny_model();
    let mut source = unequal_batches();

    let final_batch = source.batches(1, &device).unwrap().nth(1).unwrap().unwrap();
    let expected = scalar_value(
        segmentation_objective(&model, final_batch, 1.0, 2)
            .unwrap()
            .loss
            .loss,
    );

    // a vanishing step keeps the second batch scored by the initial weights
    let hyper = TrainHyperParams {
        learning_rate: 1e-12,
        ..hyper(1, 1)
    };
    let mut train_op = build_train_op::<B, Fcn8s<B>>(1e-12);
    let (_model, reports) = train_nn(model, &mut train_op, &mut source, &hyper, &device).unwrap();

    let report = &reports[0];
    let last = report.last_loss.unwrap();
    let mean = report.mean_loss.unwrap();
    assert_eq!(report.batches, 2);
    assert!((last - expected).abs() < 1e-4, "last {last} vs batch loss {expected}");
    assert!(last > mean, "last {last} should exceed mean {mean}");
    assert!((mean - 0.75 * last).abs() < 1e-4, "mean {mean} vs last {last}");
}

#[test]
fn every_batch_of_every_epoch_is_consumed() {
    let device = Default::default();
    let mut source = bright_is_road();
    let mut train_op = build_train_op::<B, Fcn8s<B>>(1e-4);

    let (_model, reports) =
        train_nn(tiny_model(), &mut train_op, &mut source, &hyper(2, 3), &device).unwrap();

    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert_eq!(report.batches, 2);
        assert!(report.last_loss.is_some());
        assert!(report.mean_loss.is_some());
    }
}

struct NoBatches;

impl BatchSource<B> for NoBatches {
    fn batches(
        &mut self,
        _batch_size: usize,
        _device: &<B as burn::tensor::backend::Backend>::Device,
    ) -> Result<BatchStream<'_, B>, TrainError> {
        Ok(Box::new(std::iter::empty()))
    }
}

#[test]
fn empty_epochs_report_no_loss() {
    let device = Default::default();
    let mut train_op = build_train_op::<B, Fcn8s<B>>(1e-4);
    let (_model, reports) =
        train_nn(tiny_model(), &mut train_op, &mut NoBatches, &hyper(3, 8), &device).unwrap();

    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.batches == 0 && r.last_loss.is_none()));
    assert!(reports[0].to_string().contains("Loss: n/a"));
}

struct WrongClasses;

impl BatchSource<B> for WrongClasses {
    fn batches(
        &mut self,
        _batch_size: usize,
        device: &<B as burn::tensor::backend::Backend>::Device,
    ) -> Result<BatchStream<'_, B>, TrainError> {
        let batch = SegmentationBatch {
            images: Tensor::zeros([1, 3, 32, 32], device),
            labels: Tensor::zeros([1, 3, 32, 32], device),
        };
        Ok(Box::new(std::iter::once(Ok(batch))))
    }
}

#[test]
fn label_shape_errors_abort_training() {
    let device = Default::default();
    let mut train_op = build_train_op::<B, Fcn8s<B>>(1e-4);
    let err = train_nn(tiny_model(), &mut train_op, &mut WrongClasses, &hyper(1, 1), &device)
        .unwrap_err();
    assert!(matches!(err, TrainError::ShapeMismatch { .. }));
}
