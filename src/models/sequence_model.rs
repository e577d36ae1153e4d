use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::{ensure_shape, RnnError, Result};
use crate::layers::linear::{LinearGradients, LinearLayer};
use crate::layers::recurrent::RecurrentCell;
use crate::models::recurrent_network::{NetworkCache, NetworkGradients, RecurrentNetwork};
use crate::optimizers::{GradientSet, Optimizer};

/// Which hidden states the linear head reads
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// One prediction per sequence, from the combined final hidden state.
    #[default]
    LastStep,
    /// One prediction per time step.
    EveryStep,
}

/// Cache for a model forward pass
pub struct SequenceModelCache<C: RecurrentCell> {
    network: NetworkCache<C>,
    head_inputs: Vec<Array2<f64>>,
    seq_len: usize,
}

/// Gradients for the recurrent body and the head
#[derive(Clone, Debug)]
pub struct SequenceModelGradients<W> {
    pub network: NetworkGradients<W>,
    pub head: LinearGradients,
}

impl<W: GradientSet> GradientSet for SequenceModelGradients<W> {
    fn zeros_like(&self) -> Self {
        SequenceModelGradients { network: self.network.zeros_like(), head: self.head.zeros_like() }
    }

    fn accumulate(&mut self, other: &Self) {
        self.network.accumulate(&other.network);
        self.head.accumulate(&other.head);
    }

    fn scale(&mut self, factor: f64) {
        self.network.scale(factor);
        self.head.scale(factor);
    }

    fn squared_norm(&self) -> f64 {
        self.network.squared_norm() + self.head.squared_norm()
    }
}

/// Recurrent network followed by a linear readout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SequenceModel<C> {
    pub network: RecurrentNetwork<C>,
    pub head: LinearLayer,
    pub output_mode: OutputMode,
}

impl<C: RecurrentCell> SequenceModel<C> {
    pub fn from_parts(
        network: RecurrentNetwork<C>,
        head: LinearLayer,
        output_mode: OutputMode,
    ) -> Result<Self> {
        let model = SequenceModel { network, head, output_mode };
        model.validate()?;
        Ok(model)
    }

    /// Checks the network and that the head reads the network's output width.
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.head.validate()?;
        if self.head.input_size != self.network.output_size() {
            return Err(RnnError::ShapeMismatch {
                context: "linear head",
                expected: vec![self.head.output_size, self.network.output_size()],
                actual: vec![self.head.output_size, self.head.input_size],
            });
        }
        Ok(())
    }

    /// Build a freshly initialised model from a validated config.
    pub fn from_config<R: Rng + ?Sized>(config: &ModelConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;

        let network = RecurrentNetwork::with_rng(
            config.input_size,
            config.hidden_size,
            config.num_layers,
            config.bidirectional,
            config.combine_mode,
            rng,
        );
        let head = LinearLayer::with_rng(network.output_size(), config.output_size, rng);

        Self::from_parts(network, head, config.output_mode)
    }

    pub fn input_size(&self) -> usize {
        self.network.input_size
    }

    pub fn output_size(&self) -> usize {
        self.head.output_size
    }

    pub fn num_parameters(&self) -> usize {
        self.network.num_parameters() + self.head.num_parameters()
    }

    /// Predictions for a sequence of (input_size, batch) steps
    ///
    /// `LastStep` yields a single (output_size, batch) matrix, `EveryStep` one
    /// per input step.
    pub fn forward(&self, sequence: &[Array2<f64>]) -> Result<Vec<Array2<f64>>> {
        let (predictions, _) = self.forward_with_cache(sequence)?;
        Ok(predictions)
    }

    /// Final prediction only: the last entry of `forward`.
    pub fn predict(&self, sequence: &[Array2<f64>]) -> Result<Array2<f64>> {
        self.forward(sequence)?.pop().ok_or(RnnError::EmptySequence)
    }

    pub fn forward_with_cache(
        &self,
        sequence: &[Array2<f64>],
    ) -> Result<(Vec<Array2<f64>>, SequenceModelCache<C>)> {
        let (output, network_cache) = self.network.forward_sequence_with_cache(sequence)?;

        let head_inputs = match self.output_mode {
            OutputMode::LastStep => vec![output.final_hidden],
            OutputMode::EveryStep => output.outputs,
        };
        let predictions = head_inputs.iter().map(|h| self.head.forward(h)).collect::<Result<Vec<_>>>()?;

        let cache = SequenceModelCache { network: network_cache, head_inputs, seq_len: sequence.len() };
        Ok((predictions, cache))
    }

    /// Backward pass from loss gradients on the predictions
    ///
    /// Returns the parameter gradients and the gradient for every input step.
    pub fn backward(
        &self,
        d_predictions: &[Array2<f64>],
        cache: &SequenceModelCache<C>,
    ) -> Result<(SequenceModelGradients<C::Weights>, Vec<Array2<f64>>)> {
        if d_predictions.len() != cache.head_inputs.len() {
            return Err(RnnError::LengthMismatch {
                context: "prediction gradients",
                expected: cache.head_inputs.len(),
                actual: d_predictions.len(),
            });
        }

        let mut head_gradients = self.head.zero_gradients();
        let mut d_hidden = Vec::with_capacity(d_predictions.len());
        for (input, d_prediction) in cache.head_inputs.iter().zip(d_predictions) {
            ensure_shape("prediction gradient", d_prediction, self.head.output_size, input.ncols())?;
            let (gradients, d_input) = self.head.backward(input, d_prediction);
            head_gradients.accumulate(&gradients);
            d_hidden.push(d_input);
        }

        let (network_gradients, d_inputs) = match self.output_mode {
            OutputMode::LastStep => {
                let batch_size = d_hidden[0].ncols();
                let d_outputs = vec![Array2::zeros((self.network.output_size(), batch_size)); cache.seq_len];
                self.network.backward(&d_outputs, d_hidden.first(), &cache.network)?
            }
            OutputMode::EveryStep => self.network.backward(&d_hidden, None, &cache.network)?,
        };

        Ok((SequenceModelGradients { network: network_gradients, head: head_gradients }, d_inputs))
    }

    pub fn zero_gradients(&self) -> SequenceModelGradients<C::Weights> {
        SequenceModelGradients { network: self.network.zero_gradients(), head: self.head.zero_gradients() }
    }

    pub fn update_parameters<O: Optimizer>(
        &mut self,
        gradients: &SequenceModelGradients<C::Weights>,
        optimizer: &mut O,
    ) {
        self.network.update_parameters(&gradients.network, optimizer);
        self.head.update_parameters(&gradients.head, optimizer, "head");
    }
}
