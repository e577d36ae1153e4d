use ndarray::{s, Array2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_shape, RnnError, Result};
use crate::layers::gru_cell::GRUCell;
use crate::layers::lstm_cell::LSTMCell;
use crate::layers::recurrent::RecurrentCell;
use crate::layers::sequence_runner::{backprop_sequence, run_sequence, Direction};
use crate::optimizers::{GradientSet, Optimizer};

/// Configuration for combining forward and backward outputs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombineMode {
    #[default]
    Concat,
    Sum,
    Average,
}

/// One layer of a stack: a left-to-right cell and, when bidirectional,
/// an independently weighted right-to-left cell.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecurrentLayer<C> {
    pub forward: C,
    pub backward: Option<C>,
}

/// Output of a network pass over one sequence
#[derive(Clone, Debug)]
pub struct NetworkOutput {
    /// Combined top-layer hidden state for every time step.
    pub outputs: Vec<Array2<f64>>,
    /// Combined final hidden states of the top layer: the forward direction
    /// after the last input and the backward direction after the first.
    pub final_hidden: Array2<f64>,
}

/// Cache for a network forward pass
pub struct NetworkCache<C: RecurrentCell> {
    forward: Vec<Vec<C::Cache>>,
    backward: Vec<Option<Vec<C::Cache>>>,
    seq_len: usize,
    batch_size: usize,
}

/// Gradients for one layer, mirroring `RecurrentLayer`
#[derive(Clone, Debug)]
pub struct LayerGradients<W> {
    pub forward: W,
    pub backward: Option<W>,
}

/// Gradients for every layer of a network
#[derive(Clone, Debug)]
pub struct NetworkGradients<W> {
    pub layers: Vec<LayerGradients<W>>,
}

impl<W: GradientSet> GradientSet for NetworkGradients<W> {
    fn zeros_like(&self) -> Self {
        NetworkGradients {
            layers: self
                .layers
                .iter()
                .map(|layer| LayerGradients {
                    forward: layer.forward.zeros_like(),
                    backward: layer.backward.as_ref().map(GradientSet::zeros_like),
                })
                .collect(),
        }
    }

    fn accumulate(&mut self, other: &Self) {
        for (mine, theirs) in self.layers.iter_mut().zip(&other.layers) {
            mine.forward.accumulate(&theirs.forward);
            if let (Some(mine), Some(theirs)) = (mine.backward.as_mut(), theirs.backward.as_ref()) {
                mine.accumulate(theirs);
            }
        }
    }

    fn scale(&mut self, factor: f64) {
        for layer in &mut self.layers {
            layer.forward.scale(factor);
            if let Some(backward) = layer.backward.as_mut() {
                backward.scale(factor);
            }
        }
    }

    fn squared_norm(&self) -> f64 {
        self.layers
            .iter()
            .map(|layer| layer.forward.squared_norm() + layer.backward.as_ref().map_or(0.0, GradientSet::squared_norm))
            .sum()
    }
}

/// Stacked, optionally bidirectional recurrent network
///
/// Layer 0 reads the input sequence; layer k+1 reads the combined per-step
/// outputs of layer k. Every direction of every layer starts from a zero state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecurrentNetwork<C> {
    layers: Vec<RecurrentLayer<C>>,
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub bidirectional: bool,
    pub combine_mode: CombineMode,
}

/// Multi-layer LSTM network
pub type LSTMNetwork = RecurrentNetwork<LSTMCell>;

/// Multi-layer GRU network
pub type GRUNetwork = RecurrentNetwork<GRUCell>;

impl<C: RecurrentCell> RecurrentNetwork<C> {
    /// Creates a new unidirectional multi-layer network
    pub fn new(input_size: usize, hidden_size: usize, num_layers: usize) -> Self {
        Self::with_rng(input_size, hidden_size, num_layers, false, CombineMode::Concat, &mut rand::thread_rng())
    }

    /// Creates a new bidirectional multi-layer network
    pub fn new_bidirectional(
        input_size: usize,
        hidden_size: usize,
        num_layers: usize,
        combine_mode: CombineMode,
    ) -> Self {
        Self::with_rng(input_size, hidden_size, num_layers, true, combine_mode, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(
        input_size: usize,
        hidden_size: usize,
        num_layers: usize,
        bidirectional: bool,
        combine_mode: CombineMode,
        rng: &mut R,
    ) -> Self {
        let layer_output_size = Self::directional_output_size(hidden_size, bidirectional, combine_mode);
        let layers = (0..num_layers)
            .map(|i| {
                let layer_input_size = if i == 0 { input_size } else { layer_output_size };
                RecurrentLayer {
                    forward: C::with_rng(layer_input_size, hidden_size, rng),
                    backward: bidirectional.then(|| C::with_rng(layer_input_size, hidden_size, rng)),
                }
            })
            .collect();

        RecurrentNetwork { layers, input_size, hidden_size, num_layers, bidirectional, combine_mode }
    }

    /// Builds a network from externally supplied layers, checking that they chain.
    pub fn from_layers(layers: Vec<RecurrentLayer<C>>, combine_mode: CombineMode) -> Result<Self> {
        let first = layers
            .first()
            .ok_or_else(|| RnnError::InvalidConfig("network needs at least one layer".into()))?;
        let input_size = first.forward.input_size();
        let hidden_size = first.forward.hidden_size();
        let bidirectional = first.backward.is_some();
        let num_layers = layers.len();

        let network = RecurrentNetwork { layers, input_size, hidden_size, num_layers, bidirectional, combine_mode };

        network.validate()?;
        Ok(network)
    }

    /// Checks that every cell fits the declared sizes and that layers chain.
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() || self.layers.len() != self.num_layers {
            return Err(RnnError::LengthMismatch {
                context: "network layers",
                expected: self.num_layers,
                actual: self.layers.len(),
            });
        }

        let layer_output_size = self.output_size();
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.backward.is_some() != self.bidirectional {
                return Err(RnnError::InvalidConfig(format!(
                    "layer {} does not match the network's direction count",
                    i
                )));
            }

            let expected_input = if i == 0 { self.input_size } else { layer_output_size };
            for cell in std::iter::once(&layer.forward).chain(layer.backward.as_ref()) {
                if cell.input_size() != expected_input || cell.hidden_size() != self.hidden_size {
                    return Err(RnnError::ShapeMismatch {
                        context: "network layer",
                        expected: vec![expected_input, self.hidden_size],
                        actual: vec![cell.input_size(), cell.hidden_size()],
                    });
                }
                cell.validate()?;
            }
        }
        Ok(())
    }

    fn directional_output_size(
        hidden_size: usize,
        bidirectional: bool,
        combine_mode: CombineMode,
    ) -> usize {
        match (bidirectional, combine_mode) {
            (true, CombineMode::Concat) => 2 * hidden_size,
            _ => hidden_size,
        }
    }

    /// Size of each combined output column
    pub fn output_size(&self) -> usize {
        Self::directional_output_size(self.hidden_size, self.bidirectional, self.combine_mode)
    }

    /// Get references to the layers for inspection
    pub fn get_layers(&self) -> &[RecurrentLayer<C>] {
        &self.layers
    }

    pub fn get_layers_mut(&mut self) -> &mut [RecurrentLayer<C>] {
        &mut self.layers
    }

    pub fn num_parameters(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| layer.forward.num_parameters() + layer.backward.as_ref().map_or(0, C::num_parameters))
            .sum()
    }

    /// Combine forward and backward outputs according to the combine mode
    fn combine_outputs(
        &self,
        forward: &Array2<f64>,
        backward: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        let backward = match backward {
            Some(backward) => backward,
            None => return Ok(forward.clone()),
        };

        Ok(match self.combine_mode {
            CombineMode::Concat => ndarray::concatenate(Axis(0), &[forward.view(), backward.view()])?,
            CombineMode::Sum => forward + backward,
            CombineMode::Average => (forward + backward) * 0.5,
        })
    }

    /// Inverse of `combine_outputs` for gradients.
    fn split_gradient(&self, gradient: &Array2<f64>) -> (Array2<f64>, Option<Array2<f64>>) {
        if !self.bidirectional {
            return (gradient.clone(), None);
        }

        match self.combine_mode {
            CombineMode::Concat => {
                let h = self.hidden_size;
                (gradient.slice(s![..h, ..]).to_owned(), Some(gradient.slice(s![h.., ..]).to_owned()))
            }
            CombineMode::Sum => (gradient.clone(), Some(gradient.clone())),
            CombineMode::Average => (gradient * 0.5, Some(gradient * 0.5)),
        }
    }

    /// Forward pass for a complete sequence
    pub fn forward_sequence(&self, sequence: &[Array2<f64>]) -> Result<NetworkOutput> {
        let (output, _) = self.forward_sequence_with_cache(sequence)?;
        Ok(output)
    }

    /// Forward pass with caching for training
    ///
    /// Runs every layer left to right (and right to left when bidirectional),
    /// combining the two directions step by step before the next layer.
    pub fn forward_sequence_with_cache(
        &self,
        sequence: &[Array2<f64>],
    ) -> Result<(NetworkOutput, NetworkCache<C>)> {
        if sequence.is_empty() {
            return Err(RnnError::EmptySequence);
        }
        let seq_len = sequence.len();
        let batch_size = sequence[0].ncols();

        let mut cache = NetworkCache { forward: Vec::new(), backward: Vec::new(), seq_len, batch_size };
        let mut layer_input = sequence.to_vec();
        let mut final_hidden = None;

        for layer in &self.layers {
            let forward_run = run_sequence(&layer.forward, &layer_input, Direction::Forward)?;
            let backward_run = match &layer.backward {
                Some(cell) => Some(run_sequence(cell, &layer_input, Direction::Backward)?),
                None => None,
            };

            let combined = (0..seq_len)
                .map(|t| {
                    let backward_output = backward_run.as_ref().map(|run| &run.outputs[t]);
                    self.combine_outputs(&forward_run.outputs[t], backward_output)
                })
                .collect::<Result<Vec<_>>>()?;

            final_hidden = Some(self.combine_outputs(
                forward_run.final_hidden(),
                backward_run.as_ref().map(|run| run.final_hidden()),
            )?);

            cache.forward.push(forward_run.caches);
            cache.backward.push(backward_run.map(|run| run.caches));
            layer_input = combined;
        }

        let final_hidden = final_hidden.ok_or_else(|| RnnError::InvalidConfig("network has no layers".into()))?;
        Ok((NetworkOutput { outputs: layer_input, final_hidden }, cache))
    }

    /// Backpropagation through time across every layer and direction
    ///
    /// `d_outputs` are gradients for the combined per-step outputs (use zeros
    /// for steps without a loss); `d_final_hidden` is a gradient for
    /// `NetworkOutput::final_hidden`. Returns the parameter gradients and the
    /// gradient for every input step.
    pub fn backward(
        &self,
        d_outputs: &[Array2<f64>],
        d_final_hidden: Option<&Array2<f64>>,
        cache: &NetworkCache<C>,
    ) -> Result<(NetworkGradients<C::Weights>, Vec<Array2<f64>>)> {
        let seq_len = cache.seq_len;
        if d_outputs.len() != seq_len {
            return Err(RnnError::LengthMismatch {
                context: "output gradients",
                expected: seq_len,
                actual: d_outputs.len(),
            });
        }
        for d_output in d_outputs {
            ensure_shape("output gradient", d_output, self.output_size(), cache.batch_size)?;
        }
        if let Some(d_final) = d_final_hidden {
            ensure_shape("final hidden gradient", d_final, self.output_size(), cache.batch_size)?;
        }

        let mut layer_gradients = Vec::with_capacity(self.layers.len());
        let mut d_layer_outputs = d_outputs.to_vec();
        let top = self.layers.len() - 1;

        for (idx, layer) in self.layers.iter().enumerate().rev() {
            let (mut d_forward, mut d_backward): (Vec<_>, Vec<_>) =
                d_layer_outputs.iter().map(|d| self.split_gradient(d)).unzip();

            if idx == top {
                if let Some(d_final) = d_final_hidden {
                    let (d_final_forward, d_final_backward) = self.split_gradient(d_final);
                    d_forward[seq_len - 1] += &d_final_forward;
                    if let (Some(slot), Some(d)) = (d_backward[0].as_mut(), d_final_backward) {
                        *slot += &d;
                    }
                }
            }

            let (forward_gradients, mut d_inputs) =
                backprop_sequence(&layer.forward, &cache.forward[idx], &d_forward, None, Direction::Forward)?;

            let backward_gradients = match (&layer.backward, &cache.backward[idx]) {
                (Some(cell), Some(caches)) => {
                    let d_backward: Vec<Array2<f64>> = d_backward.into_iter().flatten().collect();
                    let (gradients, d_inputs_backward) =
                        backprop_sequence(cell, caches, &d_backward, None, Direction::Backward)?;
                    for (total, d) in d_inputs.iter_mut().zip(&d_inputs_backward) {
                        *total += d;
                    }
                    Some(gradients)
                }
                _ => None,
            };

            layer_gradients.push(LayerGradients { forward: forward_gradients, backward: backward_gradients });
            d_layer_outputs = d_inputs;
        }

        layer_gradients.reverse();
        Ok((NetworkGradients { layers: layer_gradients }, d_layer_outputs))
    }

    /// Initialize zero gradients for all layers
    pub fn zero_gradients(&self) -> NetworkGradients<C::Weights> {
        NetworkGradients {
            layers: self
                .layers
                .iter()
                .map(|layer| LayerGradients {
                    forward: layer.forward.zero_gradients(),
                    backward: layer.backward.as_ref().map(|cell| cell.zero_gradients()),
                })
                .collect(),
        }
    }

    /// Update parameters for both directions of every layer
    pub fn update_parameters<O: Optimizer>(
        &mut self,
        gradients: &NetworkGradients<C::Weights>,
        optimizer: &mut O,
    ) {
        for (i, (layer, grads)) in self.layers.iter_mut().zip(&gradients.layers).enumerate() {
            layer.forward.update_parameters(&grads.forward, optimizer, &format!("layer_{}_forward", i));
            if let (Some(cell), Some(grads)) = (layer.backward.as_mut(), grads.backward.as_ref()) {
                cell.update_parameters(grads, optimizer, &format!("layer_{}_backward", i));
            }
        }
    }
}
