//! Epoch loop over a batch source.

use std::fmt;
use std::time::{Duration, Instant};

use burn::optim::Optimizer;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use models::Fcn8s;

use crate::error::{TrainError, TrainResult};
use crate::loss::scalar_value;
use crate::optim::{segmentation_objective, TrainOp};

#[derive(Debug, Clone)]
pub struct SegmentationBatch<B: Backend> {
    /// `[batch, 3, height, width]`, values in `[0, 1]`.
    pub images: Tensor<B, 4>,
    /// One-hot `[batch, num_classes, height, width]`.
    pub labels: Tensor<B, 4>,
}

pub type BatchStream<'a, B> = Box<dyn Iterator<Item = TrainResult<SegmentationBatch<B>>> + 'a>;

/// Anything that can yield one finite pass of training batches per call.
pub trait BatchSource<B: Backend> {
    fn batches(&mut self, batch_size: usize, device: &B::Device)
        -> TrainResult<BatchStream<'_, B>>;
}

/// Batches sliced from tensors already in memory, in order.
pub struct InMemoryBatches<B: Backend> {
    images: Tensor<B, 4>,
    labels: Tensor<B, 4>,
}

impl<B: Backend> InMemoryBatches<B> {
    pub fn new(images: Tensor<B, 4>, labels: Tensor<B, 4>) -> TrainResult<Self> {
        let [n_img, _, h_img, w_img] = images.dims();
        let [n_lbl, _, h_lbl, w_lbl] = labels.dims();
        if (n_img, h_img, w_img) != (n_lbl, h_lbl, w_lbl) {
            return Err(TrainError::ShapeMismatch {
                left_name: "images",
                left: images.dims().to_vec(),
                right_name: "labels",
                right: labels.dims().to_vec(),
            });
        }
        Ok(Self { images, labels })
    }

    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<B: Backend> BatchSource<B> for InMemoryBatches<B> {
    fn batches(
        &mut self,
        batch_size: usize,
        device: &B::Device,
    ) -> TrainResult<BatchStream<'_, B>> {
        let batch_size = batch_size.max(1);
        let [total, channels, height, width] = self.images.dims();
        let classes = self.labels.dims()[1];
        let images = self.images.clone();
        let labels = self.labels.clone();
        let device = device.clone();
        Ok(Box::new((0..total).step_by(batch_size).map(move |start| {
            let end = (start + batch_size).min(total);
            Ok(SegmentationBatch {
                images: images
                    .clone()
                    .slice([start..end, 0..channels, 0..height, 0..width])
                    .to_device(&device),
                labels: labels
                    .clone()
                    .slice([start..end, 0..classes, 0..height, 0..width])
                    .to_device(&device),
            })
        })))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainHyperParams {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub keep_prob: f64,
    pub num_classes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    /// 1-based.
    pub epoch: usize,
    pub epochs: usize,
    pub batches: usize,
    /// Loss of the final batch; `None` when the epoch had no batches.
    pub last_loss: Option<f32>,
    pub mean_loss: Option<f32>,
    pub elapsed: Duration,
}

impl fmt::Display for EpochReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Epoch: {}/{} Loss: ", self.epoch, self.epochs)?;
        match self.last_loss {
            Some(loss) => write!(f, "{loss:.4}")?,
            None => write!(f, "n/a")?,
        }
        write!(f, " Time: {:.3}]", self.elapsed.as_secs_f64())
    }
}

/// Train `model` for `hyper.epochs` full passes over `source`.
///
/// Every batch runs forward with `hyper.keep_prob`, backpropagates the
/// objective and steps the optimizer at `hyper.learning_rate`. There is no
/// early stopping and no checkpointing; the updated model is returned along
/// with one report per epoch.
pub fn train_nn<B, O, S>(
    mut model: Fcn8s<B>,
    train_op: &mut TrainOp<O>,
    source: &mut S,
    hyper: &TrainHyperParams,
    device: &B::Device,
) -> TrainResult<(Fcn8s<B>, Vec<EpochReport>)>
where
    B: AutodiffBackend,
    O: Optimizer<Fcn8s<B>, B>,
    S: BatchSource<B> + ?Sized,
{
    train_op.set_learning_rate(hyper.learning_rate);
    let mut reports = Vec::with_capacity(hyper.epochs);

    for epoch in 1..=hyper.epochs {
        let start = Instant::now();
        let mut losses = Vec::new();

        for batch in source.batches(hyper.batch_size, device)? {
            let step =
                segmentation_objective(&model, batch?, hyper.keep_prob, hyper.num_classes)?;
            let loss = scalar_value(step.loss.loss);
            model = train_op.minimize(model, step.objective);
            log::debug!("epoch {epoch} batch {}: loss {loss:.6}", losses.len() + 1);
            losses.push(loss);
        }

        let report = EpochReport {
            epoch,
            epochs: hyper.epochs,
            batches: losses.len(),
            last_loss: losses.last().copied(),
            mean_loss: mean(&losses),
            elapsed: start.elapsed(),
        };
        log::info!("{report}");
        if let Some(mean_loss) = report.mean_loss {
            log::debug!(
                "epoch {epoch} mean loss {mean_loss:.6} over {} batches",
                report.batches
            );
        } else {
            log::warn!("epoch {epoch} produced no batches");
        }
        reports.push(report);
    }

    Ok((model, reports))
}

fn mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f32>() / values.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn report_formats_last_loss_and_seconds() {
        let report = EpochReport {
            epoch: 3,
            epochs: 30,
            batches: 36,
            last_loss: Some(0.123456),
            mean_loss: Some(0.2),
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(report.to_string(), "[Epoch: 3/30 Loss: 0.1235 Time: 1.500]");

        let empty = EpochReport {
            last_loss: None,
            mean_loss: None,
            ..report
        };
        assert_eq!(empty.to_string(), "[Epoch: 3/30 Loss: n/a Time: 1.500]");
    }

    #[test]
    fn in_memory_source_yields_ragged_final_batch() {
        let device = Default::default();
        let mut source = InMemoryBatches::<B>::new(
            Tensor::zeros([5, 3, 4, 4], &device),
            Tensor::zeros([5, 2, 4, 4], &device),
        )
        .unwrap();
        let sizes: Vec<usize> = source
            .batches(2, &device)
            .unwrap()
            .map(|b| b.unwrap().images.dims()[0])
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        // a second pass sees the same data
        assert_eq!(source.batches(8, &device).unwrap().count(), 1);
    }

    #[test]
    fn in_memory_source_rejects_unpaired_tensors() {
        let device = Default::default();
        let result = InMemoryBatches::<B>::new(
            Tensor::zeros([4, 3, 4, 4], &device),
            Tensor::zeros([3, 2, 4, 4], &device),
        );
        assert!(matches!(result, Err(TrainError::ShapeMismatch { .. })));
    }

    #[test]
    fn mean_of_nothing_is_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 3.0]), Some(2.0));
    }
}
