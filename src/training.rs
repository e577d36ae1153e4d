use log::{debug, info, warn};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Instant;

use crate::config::TrainingConfig;
use crate::error::{RnnError, Result};
use crate::layers::recurrent::RecurrentCell;
use crate::loss::{LossFunction, MSELoss};
use crate::models::sequence_model::{SequenceModel, SequenceModelGradients};
use crate::optimizers::{clip_by_global_norm, Adam, Optimizer, SGD};
use crate::tasks::stack_batch;

/// One input sequence with its targets
///
/// `inputs` holds one (input_size, batch) matrix per time step. `targets`
/// holds one (output_size, batch) matrix per model prediction: a single entry
/// for `OutputMode::LastStep`, one per step for `OutputMode::EveryStep`.
#[derive(Debug, Clone)]
pub struct TrainingSample {
    pub inputs: Vec<Array2<f64>>,
    pub targets: Vec<Array2<f64>>,
}

impl TrainingSample {
    pub fn new(inputs: Vec<Array2<f64>>, targets: Vec<Array2<f64>>) -> Self {
        TrainingSample { inputs, targets }
    }

    /// Number of independent sequences stacked in this sample
    pub fn batch_size(&self) -> usize {
        self.inputs.first().map_or(0, |x| x.ncols())
    }
}

/// Training metrics tracked during training
#[derive(Debug, Clone)]
pub struct TrainingMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub validation_loss: Option<f64>,
    pub time_elapsed: f64,
}

/// Mini-batch trainer for sequence models with configurable loss and optimizer
pub struct SequenceTrainer<C, L: LossFunction, O: Optimizer> {
    pub model: SequenceModel<C>,
    pub loss_function: L,
    pub optimizer: O,
    pub config: TrainingConfig,
    pub metrics_history: Vec<TrainingMetrics>,
}

impl<C: RecurrentCell, L: LossFunction, O: Optimizer> SequenceTrainer<C, L, O> {
    pub fn new(model: SequenceModel<C>, loss_function: L, optimizer: O) -> Self {
        SequenceTrainer {
            model,
            loss_function,
            optimizer,
            config: TrainingConfig::default(),
            metrics_history: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    /// Mean loss over a sample's predictions, without touching the model
    fn sample_loss(&self, predictions: &[Array2<f64>], targets: &[Array2<f64>]) -> Result<f64> {
        if predictions.len() != targets.len() {
            return Err(RnnError::LengthMismatch {
                context: "targets",
                expected: predictions.len(),
                actual: targets.len(),
            });
        }
        for (prediction, target) in predictions.iter().zip(targets) {
            if prediction.shape() != target.shape() {
                return Err(RnnError::ShapeMismatch {
                    context: "target",
                    expected: prediction.shape().to_vec(),
                    actual: target.shape().to_vec(),
                });
            }
        }

        let total: f64 = predictions
            .iter()
            .zip(targets)
            .map(|(prediction, target)| self.loss_function.compute_loss(prediction, target))
            .sum();
        Ok(total / predictions.len() as f64)
    }

    /// Loss and full-BPTT gradients for one (possibly batched) sample
    pub fn compute_gradients(
        &self,
        sample: &TrainingSample,
    ) -> Result<(f64, SequenceModelGradients<C::Weights>)> {
        let (predictions, cache) = self.model.forward_with_cache(&sample.inputs)?;
        let loss = self.sample_loss(&predictions, &sample.targets)?;

        let steps = predictions.len() as f64;
        let d_predictions: Vec<Array2<f64>> = predictions
            .iter()
            .zip(&sample.targets)
            .map(|(prediction, target)| self.loss_function.compute_gradient(prediction, target) / steps)
            .collect();

        let (gradients, _) = self.model.backward(&d_predictions, &cache)?;
        Ok((loss, gradients))
    }

    /// One optimizer step on a batch; returns the batch loss
    ///
    /// A non-finite loss skips the update so one bad batch cannot poison the weights.
    pub fn train_batch(&mut self, batch: &TrainingSample) -> Result<f64> {
        let (loss, mut gradients) = self.compute_gradients(batch)?;

        if !loss.is_finite() {
            warn!("Non-finite loss {} on batch of {}; skipping update", loss, batch.batch_size());
            return Ok(loss);
        }

        if let Some(max_norm) = self.config.clip_gradient {
            let norm = clip_by_global_norm(&mut gradients, max_norm);
            if norm > max_norm {
                debug!("Clipped gradient norm {:.4} to {:.4}", norm, max_norm);
            }
        }

        self.model.update_parameters(&gradients, &mut self.optimizer);
        Ok(loss)
    }

    /// Train for `config.epochs` epochs with optional validation
    ///
    /// Samples are reshuffled each epoch (seeded by `config.seed`) and stacked
    /// into batches of `config.batch_size` columns. All samples in a batch must
    /// share a sequence length.
    pub fn train(
        &mut self,
        train_data: &[TrainingSample],
        validation_data: Option<&[TrainingSample]>,
    ) -> Result<()> {
        self.config.validate()?;
        if train_data.is_empty() {
            return Err(RnnError::InvalidConfig("training data is empty".into()));
        }

        info!(
            "Starting training: {} epochs, {} samples, batch size {}, {} parameters",
            self.config.epochs,
            train_data.len(),
            self.config.batch_size,
            self.model.num_parameters()
        );

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut order: Vec<usize> = (0..train_data.len()).collect();

        for epoch in 0..self.config.epochs {
            let start_time = Instant::now();
            order.shuffle(&mut rng);

            let mut epoch_loss = 0.0;
            let mut num_batches = 0;
            for chunk in order.chunks(self.config.batch_size) {
                let samples: Vec<&TrainingSample> = chunk.iter().map(|&i| &train_data[i]).collect();
                let batch = stack_batch(&samples)?;
                epoch_loss += self.train_batch(&batch)?;
                num_batches += 1;
            }
            epoch_loss /= num_batches as f64;

            let validation_loss = match validation_data {
                Some(data) => Some(self.evaluate(data)?),
                None => None,
            };

            let time_elapsed = start_time.elapsed().as_secs_f64();
            self.metrics_history.push(TrainingMetrics {
                epoch,
                train_loss: epoch_loss,
                validation_loss,
                time_elapsed,
            });

            if epoch % self.config.log_every == 0 || epoch + 1 == self.config.epochs {
                match validation_loss {
                    Some(val_loss) => info!(
                        "Epoch {}: Train Loss: {:.6}, Val Loss: {:.6}, Time: {:.2}s",
                        epoch, epoch_loss, val_loss, time_elapsed
                    ),
                    None => info!("Epoch {}: Train Loss: {:.6}, Time: {:.2}s", epoch, epoch_loss, time_elapsed),
                }
            }
        }

        info!("Training completed!");
        Ok(())
    }

    /// Mean loss over a data set, weighting each sample equally
    pub fn evaluate(&self, data: &[TrainingSample]) -> Result<f64> {
        if data.is_empty() {
            return Ok(0.0);
        }

        let mut total_loss = 0.0;
        for sample in data {
            let predictions = self.model.forward(&sample.inputs)?;
            total_loss += self.sample_loss(&predictions, &sample.targets)?;
        }
        Ok(total_loss / data.len() as f64)
    }

    /// Generate predictions for an input sequence
    pub fn predict(&self, inputs: &[Array2<f64>]) -> Result<Vec<Array2<f64>>> {
        self.model.forward(inputs)
    }

    pub fn get_latest_metrics(&self) -> Option<&TrainingMetrics> {
        self.metrics_history.last()
    }

    pub fn get_metrics_history(&self) -> &[TrainingMetrics] {
        &self.metrics_history
    }
}

/// Create a basic trainer with SGD optimizer and MSE loss
pub fn create_basic_trainer<C: RecurrentCell>(
    model: SequenceModel<C>,
    learning_rate: f64,
) -> SequenceTrainer<C, MSELoss, SGD> {
    SequenceTrainer::new(model, MSELoss, SGD::new(learning_rate))
}

/// Create a trainer with Adam and MSE loss using the config's learning rate
pub fn create_adam_trainer<C: RecurrentCell>(
    model: SequenceModel<C>,
    config: TrainingConfig,
) -> SequenceTrainer<C, MSELoss, Adam> {
    let optimizer = Adam::new(config.learning_rate);
    SequenceTrainer::new(model, MSELoss, optimizer).with_config(config)
}
