use ndarray::{arr2, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::layers::embedding::Embedding;
use crate::layers::linear::LinearLayer;
use crate::layers::recurrent::RecurrentCell;
use crate::loss::{BCEWithLogitsLoss, LossFunction};
use crate::models::recurrent_network::{CombineMode, RecurrentNetwork};
use crate::models::sequence_model::{OutputMode, SequenceModel, SequenceModelGradients};
use crate::optimizers::{clip_by_global_norm, GradientSet, Optimizer};
use crate::utils::sigmoid;

/// Gradients for the embedding table and the recurrent model
#[derive(Clone, Debug)]
pub struct TextClassifierGradients<W> {
    pub embedding: Array2<f64>,
    pub model: SequenceModelGradients<W>,
}

impl<W: GradientSet> GradientSet for TextClassifierGradients<W> {
    fn zeros_like(&self) -> Self {
        TextClassifierGradients { embedding: self.embedding.zeros_like(), model: self.model.zeros_like() }
    }

    fn accumulate(&mut self, other: &Self) {
        self.embedding.accumulate(&other.embedding);
        self.model.accumulate(&other.model);
    }

    fn scale(&mut self, factor: f64) {
        GradientSet::scale(&mut self.embedding, factor);
        self.model.scale(factor);
    }

    fn squared_norm(&self) -> f64 {
        self.embedding.squared_norm() + self.model.squared_norm()
    }
}

/// Binary sentiment classifier over token id sequences
///
/// Embeds each token, runs the (optionally bidirectional) recurrent model and
/// reads a single logit from the combined final hidden state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TextClassifier<C> {
    pub embedding: Embedding,
    pub model: SequenceModel<C>,
}

impl<C: RecurrentCell> TextClassifier<C> {
    pub fn with_rng<R: Rng + ?Sized>(
        vocab_size: usize,
        embedding_dim: usize,
        hidden_size: usize,
        num_layers: usize,
        bidirectional: bool,
        rng: &mut R,
    ) -> Self {
        let embedding = Embedding::with_rng(vocab_size, embedding_dim, rng);
        let network =
            RecurrentNetwork::with_rng(embedding_dim, hidden_size, num_layers, bidirectional, CombineMode::Concat, rng);
        let head = LinearLayer::with_rng(network.output_size(), 1, rng);

        let model = SequenceModel { network, head, output_mode: OutputMode::LastStep };
        TextClassifier { embedding, model }
    }

    /// Raw logit for one token sequence
    pub fn logit(&self, tokens: &[usize]) -> Result<f64> {
        let inputs = self.embedding.embed_sequence(tokens)?;
        let prediction = self.model.predict(&inputs)?;
        Ok(prediction[[0, 0]])
    }

    /// Probability that the sequence belongs to the positive class
    pub fn predict_proba(&self, tokens: &[usize]) -> Result<f64> {
        Ok(sigmoid(self.logit(tokens)?))
    }

    pub fn predict(&self, tokens: &[usize]) -> Result<bool> {
        Ok(self.predict_proba(tokens)? >= 0.5)
    }

    /// Loss and gradients for one labelled sequence (`label` is 0.0 or 1.0)
    pub fn compute_gradients(
        &self,
        tokens: &[usize],
        label: f64,
    ) -> Result<(f64, TextClassifierGradients<C::Weights>)> {
        let loss_fn = BCEWithLogitsLoss;
        let inputs = self.embedding.embed_sequence(tokens)?;
        let (predictions, cache) = self.model.forward_with_cache(&inputs)?;

        let target = arr2(&[[label]]);
        let loss = loss_fn.compute_loss(&predictions[0], &target);
        let d_prediction = loss_fn.compute_gradient(&predictions[0], &target);

        let (model_gradients, d_inputs) = self.model.backward(&[d_prediction], &cache)?;
        let embedding_gradient = self.embedding.backward(tokens, &d_inputs);

        Ok((loss, TextClassifierGradients { embedding: embedding_gradient, model: model_gradients }))
    }

    pub fn update_parameters<O: Optimizer>(
        &mut self,
        gradients: &TextClassifierGradients<C::Weights>,
        optimizer: &mut O,
    ) {
        self.embedding.update_parameters(&gradients.embedding, optimizer, "text");
        self.model.update_parameters(&gradients.model, optimizer);
    }

    /// One optimizer step on a single labelled sequence, returning its loss
    pub fn train_step<O: Optimizer>(
        &mut self,
        tokens: &[usize],
        label: f64,
        optimizer: &mut O,
        clip_gradient: Option<f64>,
    ) -> Result<f64> {
        let (loss, mut gradients) = self.compute_gradients(tokens, label)?;
        if let Some(max_norm) = clip_gradient {
            let norm = clip_by_global_norm(&mut gradients, max_norm);
            if norm > max_norm {
                log::debug!("Clipped classifier gradient norm {:.4} to {:.4}", norm, max_norm);
            }
        }
        self.update_parameters(&gradients, optimizer);
        Ok(loss)
    }

    /// Fraction of sequences whose predicted class matches the label
    pub fn accuracy(&self, samples: &[(Vec<usize>, f64)]) -> Result<f64> {
        if samples.is_empty() {
            return Ok(0.0);
        }
        let mut correct = 0;
        for (tokens, label) in samples {
            if self.predict(tokens)? == (*label >= 0.5) {
                correct += 1;
            }
        }
        Ok(correct as f64 / samples.len() as f64)
    }
}
