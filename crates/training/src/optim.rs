use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Tensor;
use models::Fcn8s;

use crate::error::TrainResult;
use crate::loss::{cross_entropy_loss, LossOutput};
use crate::train::SegmentationBatch;

/// Adam optimizer plus the learning rate it steps with.
pub struct TrainOp<O> {
    optim: O,
    learning_rate: f64,
}

impl<O> TrainOp<O> {
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    /// Backpropagate `objective` and apply one update to every trainable
    /// parameter of `model`, backbone included.
    pub fn minimize<B, M>(&mut self, model: M, objective: Tensor<B, 1>) -> M
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let grads = GradientsParams::from_grads(objective.backward(), &model);
        self.optim.step(self.learning_rate, model, grads)
    }
}

pub fn build_train_op<B, M>(learning_rate: f64) -> TrainOp<impl Optimizer<M, B>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    TrainOp {
        optim: AdamConfig::new().init::<B, M>(),
        learning_rate,
    }
}

#[derive(Debug, Clone)]
pub struct StepOutput<B: AutodiffBackend> {
    /// Cross-entropy alone; this is what gets reported.
    pub loss: LossOutput<B>,
    /// Cross-entropy plus the decoder L2 penalty; this is what gets minimized.
    pub objective: Tensor<B, 1>,
}

/// Forward `batch` through `model` and build the training objective.
pub fn segmentation_objective<B: AutodiffBackend>(
    model: &Fcn8s<B>,
    batch: SegmentationBatch<B>,
    keep_prob: f64,
    num_classes: usize,
) -> TrainResult<StepOutput<B>> {
    let logits = model.forward(batch.images, keep_prob)?;
    let loss = cross_entropy_loss(logits, batch.labels, num_classes)?;
    let objective = loss.loss.clone() + model.l2_penalty();
    Ok(StepOutput { loss, objective })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::scalar_value;
    use burn::backend::Autodiff;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;
    use models::{BackboneConfig, FcnDecoderConfig};

    type B = Autodiff<NdArray<f32>>;

    fn tiny_model(l2_scale: f64) -> Fcn8s<B> {
        let device = Default::default();
        let backbone = BackboneConfig {
            in_channels: 3,
            block_channels: [2, 4, 8, 8, 8],
            fc_channels: 16,
        };
        let decoder = FcnDecoderConfig::for_backbone(&backbone, 2).with_l2_scale(l2_scale);
        Fcn8s::new(backbone.init(&device), decoder.init(&device))
    }

    fn batch() -> SegmentationBatch<B> {
        let device = Default::default();
        SegmentationBatch {
            images: Tensor::random([1, 3, 32, 32], Distribution::Default, &device),
            labels: Tensor::ones([1, 2, 32, 32], &device).div_scalar(2.0),
        }
    }

    #[test]
    fn objective_adds_penalty_to_reported_loss() {
        let model = tiny_model(10.0);
        let step = segmentation_objective(&model, batch(), 1.0, 2).unwrap();
        let loss = scalar_value(step.loss.loss.clone());
        let objective = scalar_value(step.objective.clone());
        let penalty = scalar_value(model.l2_penalty());
        assert!(penalty > 0.0);
        assert!((objective - (loss + penalty)).abs() < 1e-4);
    }

    #[test]
    fn minimize_changes_parameters() {
        let model = tiny_model(1e-5);
        let mut train_op = build_train_op::<B, Fcn8s<B>>(1e-2);
        assert_eq!(train_op.learning_rate(), 1e-2);

        let before = scalar_value(model.l2_penalty());
        let step = segmentation_objective(&model, batch(), 1.0, 2).unwrap();
        let model = train_op.minimize(model, step.objective);
        let after = scalar_value(model.l2_penalty());
        assert_ne!(before, after);
    }
}
