use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_shape, Result};
use crate::layers::gate::{check_step_shapes, GateWeights};
use crate::layers::recurrent::RecurrentCell;
use crate::optimizers::{GradientSet, Optimizer};
use crate::utils::sigmoid;

/// The four gate weight sets of an LSTM cell
///
/// Also used to hold their gradients during backpropagation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LSTMWeights {
    pub forget: GateWeights,
    pub input: GateWeights,
    pub output: GateWeights,
    pub candidate: GateWeights,
}

pub type LSTMCellGradients = LSTMWeights;

impl LSTMWeights {
    pub fn zeros(input_size: usize, hidden_size: usize) -> Self {
        LSTMWeights {
            forget: GateWeights::zeros(input_size, hidden_size),
            input: GateWeights::zeros(input_size, hidden_size),
            output: GateWeights::zeros(input_size, hidden_size),
            candidate: GateWeights::zeros(input_size, hidden_size),
        }
    }

    fn gates(&self) -> [&GateWeights; 4] {
        [&self.forget, &self.input, &self.output, &self.candidate]
    }
}

impl GradientSet for LSTMWeights {
    fn zeros_like(&self) -> Self {
        LSTMWeights {
            forget: self.forget.zeros_like(),
            input: self.input.zeros_like(),
            output: self.output.zeros_like(),
            candidate: self.candidate.zeros_like(),
        }
    }

    fn accumulate(&mut self, other: &Self) {
        self.forget.accumulate(&other.forget);
        self.input.accumulate(&other.input);
        self.output.accumulate(&other.output);
        self.candidate.accumulate(&other.candidate);
    }

    fn scale(&mut self, factor: f64) {
        self.forget.scale(factor);
        self.input.scale(factor);
        self.output.scale(factor);
        self.candidate.scale(factor);
    }

    fn squared_norm(&self) -> f64 {
        self.gates().iter().map(|gate| gate.squared_norm()).sum()
    }
}

/// Hidden and cell state of an LSTM, each (hidden_size, batch).
#[derive(Clone, Debug, PartialEq)]
pub struct LSTMState {
    pub hidden: Array2<f64>,
    pub cell: Array2<f64>,
}

impl LSTMState {
    pub fn zeros(hidden_size: usize, batch_size: usize) -> Self {
        LSTMState {
            hidden: Array2::zeros((hidden_size, batch_size)),
            cell: Array2::zeros((hidden_size, batch_size)),
        }
    }
}

/// Caches intermediate values during forward pass for efficient backward computation
#[derive(Clone, Debug)]
pub struct LSTMCellCache {
    pub input: Array2<f64>,
    pub hx: Array2<f64>,
    pub cx: Array2<f64>,
    pub forget_gate: Array2<f64>,
    pub input_gate: Array2<f64>,
    pub output_gate: Array2<f64>,
    pub candidate: Array2<f64>,
    pub cy: Array2<f64>,
    pub tanh_cy: Array2<f64>,
}

/// LSTM cell built directly from the gate equations
///
/// - f_t = σ(W_f·[x_t, h_t-1] + b_f)
/// - i_t = σ(W_i·[x_t, h_t-1] + b_i)
/// - o_t = σ(W_o·[x_t, h_t-1] + b_o)
/// - c̃_t = tanh(W_c·[x_t, h_t-1] + b_c)
/// - c_t = f_t ⊙ c_t-1 + i_t ⊙ c̃_t
/// - h_t = o_t ⊙ tanh(c_t)
///
/// The cell holds weights only; hidden and cell state are passed in and
/// returned by every call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LSTMCell {
    pub(crate) weights: LSTMWeights,
    pub(crate) input_size: usize,
    hidden_size: usize,
}

impl LSTMCell {
    /// Creates a new LSTM cell with uniform ±1/√hidden_size initialization
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        Self::with_rng(input_size, hidden_size, &mut rand::thread_rng())
    }

    /// Builds a cell around externally supplied weights, checking every gate's shape.
    pub fn from_weights(weights: LSTMWeights) -> Result<Self> {
        let input_size = weights.forget.input_size();
        let hidden_size = weights.forget.hidden_size();
        for gate in weights.gates() {
            gate.validate("lstm gate weights", input_size, hidden_size)?;
        }

        Ok(LSTMCell { weights, input_size, hidden_size })
    }

    /// Forward pass for one time step
    ///
    /// `input` is (input_size, batch); `hx` and `cx` are (hidden_size, batch).
    /// Returns (h_t, c_t).
    pub fn forward(
        &self,
        input: &Array2<f64>,
        hx: &Array2<f64>,
        cx: &Array2<f64>,
    ) -> Result<(Array2<f64>, Array2<f64>)> {
        let (hy, cy, _) = self.forward_with_cache(input, hx, cx)?;
        Ok((hy, cy))
    }

    pub fn forward_with_cache(
        &self,
        input: &Array2<f64>,
        hx: &Array2<f64>,
        cx: &Array2<f64>,
    ) -> Result<(Array2<f64>, Array2<f64>, LSTMCellCache)> {
        let batch = check_step_shapes(input, hx, self.input_size, self.hidden_size)?;
        ensure_shape("cell state", cx, self.hidden_size, batch)?;

        let w = &self.weights;
        let forget_gate = w.forget.pre_activation(input, hx).mapv_into(sigmoid);
        let input_gate = w.input.pre_activation(input, hx).mapv_into(sigmoid);
        let output_gate = w.output.pre_activation(input, hx).mapv_into(sigmoid);
        let candidate = w.candidate.pre_activation(input, hx).mapv_into(f64::tanh);

        // Cell state update: f_t ⊙ c_t-1 + i_t ⊙ c̃_t
        let cy = &forget_gate * cx + &input_gate * &candidate;
        let tanh_cy = cy.mapv(f64::tanh);

        // Hidden state: o_t ⊙ tanh(c_t)
        let hy = &output_gate * &tanh_cy;

        let cache = LSTMCellCache {
            input: input.clone(),
            hx: hx.clone(),
            cx: cx.clone(),
            forget_gate,
            input_gate,
            output_gate,
            candidate,
            cy: cy.clone(),
            tanh_cy,
        };

        Ok((hy, cy, cache))
    }

    /// Backward pass for one time step
    ///
    /// `dhy` and `dcy` are the loss gradients with respect to h_t and c_t.
    /// Returns (parameter_gradients, input_gradient, hidden_gradient, cell_gradient).
    pub fn backward(
        &self,
        dhy: &Array2<f64>,
        dcy: &Array2<f64>,
        cache: &LSTMCellCache) -> (LSTMCellGradients, Array2<f64>, Array2<f64>, Array2<f64>,
    ) {
        let o = &cache.output_gate;
        let f = &cache.forget_gate;
        let i = &cache.input_gate;
        let g = &cache.candidate;

        // ∂L/∂o_t = ∂L/∂h_t ⊙ tanh(c_t)
        let do_raw = dhy * &cache.tanh_cy * o * &o.mapv(|x| 1.0 - x);

        // Cell state gradients from both tanh and direct paths
        let dc_total = dcy + &(dhy * o * &cache.tanh_cy.mapv(|x| 1.0 - x * x));

        // ∂L/∂f_t = ∂L/∂c_t ⊙ c_t-1
        let df_raw = &dc_total * &cache.cx * f * &f.mapv(|x| 1.0 - x);

        // ∂L/∂i_t = ∂L/∂c_t ⊙ c̃_t
        let di_raw = &dc_total * g * i * &i.mapv(|x| 1.0 - x);

        // ∂L/∂c̃_t = ∂L/∂c_t ⊙ i_t
        let dg_raw = &dc_total * i * &g.mapv(|x| 1.0 - x * x);

        let w = &self.weights;
        let (d_forget, dx_f, dh_f) = w.forget.backward(&df_raw, &cache.input, &cache.hx);
        let (d_input, dx_i, dh_i) = w.input.backward(&di_raw, &cache.input, &cache.hx);
        let (d_output, dx_o, dh_o) = w.output.backward(&do_raw, &cache.input, &cache.hx);
        let (d_candidate, dx_g, dh_g) = w.candidate.backward(&dg_raw, &cache.input, &cache.hx);

        let gradients = LSTMCellGradients {
            forget: d_forget,
            input: d_input,
            output: d_output,
            candidate: d_candidate,
        };

        let dx = dx_f + dx_i + dx_o + dx_g;
        let dhx = dh_f + dh_i + dh_o + dh_g;
        let dcx = dc_total * f;

        (gradients, dx, dhx, dcx)
    }

    /// Initialize zero gradients for accumulation
    pub fn zero_gradients(&self) -> LSTMCellGradients {
        LSTMWeights::zeros(self.input_size, self.hidden_size)
    }

    /// Apply gradients using the provided optimizer
    pub fn update_parameters<O: Optimizer>(
        &mut self,
        gradients: &LSTMCellGradients,
        optimizer: &mut O,
        prefix: &str,
    ) {
        let w = &mut self.weights;
        w.forget.update_parameters(&gradients.forget, optimizer, &format!("{}_forget", prefix));
        w.input.update_parameters(&gradients.input, optimizer, &format!("{}_input", prefix));
        w.output.update_parameters(&gradients.output, optimizer, &format!("{}_output", prefix));
        w.candidate.update_parameters(&gradients.candidate, optimizer, &format!("{}_candidate", prefix));
    }

    pub fn num_parameters(&self) -> usize {
        self.weights.gates().iter().map(|gate| gate.num_parameters()).sum()
    }
}

impl RecurrentCell for LSTMCell {
    type State = LSTMState;
    type Cache = LSTMCellCache;
    type Weights = LSTMWeights;

    const NAME: &'static str = "lstm";

    fn with_rng<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let weights = LSTMWeights {
            forget: GateWeights::with_rng(input_size, hidden_size, rng),
            input: GateWeights::with_rng(input_size, hidden_size, rng),
            output: GateWeights::with_rng(input_size, hidden_size, rng),
            candidate: GateWeights::with_rng(input_size, hidden_size, rng),
        };

        LSTMCell { weights, input_size, hidden_size }
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn zero_state(&self, batch_size: usize) -> LSTMState {
        LSTMState::zeros(self.hidden_size, batch_size)
    }

    fn hidden(state: &LSTMState) -> &Array2<f64> {
        &state.hidden
    }

    fn hidden_mut(state: &mut LSTMState) -> &mut Array2<f64> {
        &mut state.hidden
    }

    fn step(&self, input: &Array2<f64>, state: &LSTMState) -> Result<(LSTMState, LSTMCellCache)> {
        let (hidden, cell, cache) = self.forward_with_cache(input, &state.hidden, &state.cell)?;
        Ok((LSTMState { hidden, cell }, cache))
    }

    fn backward_step(
        &self,
        d_state: &LSTMState,
        cache: &LSTMCellCache) -> (LSTMWeights, Array2<f64>, LSTMState,
    ) {
        let (gradients, dx, dhx, dcx) = self.backward(&d_state.hidden, &d_state.cell, cache);
        (gradients, dx, LSTMState { hidden: dhx, cell: dcx })
    }

    fn weights(&self) -> &LSTMWeights {
        &self.weights
    }

    fn update_parameters<O: Optimizer>(
        &mut self,
        gradients: &LSTMWeights,
        optimizer: &mut O,
        prefix: &str,
    ) {
        LSTMCell::update_parameters(self, gradients, optimizer, prefix);
    }

    fn num_parameters(&self) -> usize {
        LSTMCell::num_parameters(self)
    }

    fn validate(&self) -> Result<()> {
        for gate in self.weights.gates() {
            gate.validate("lstm gate weights", self.input_size, self.hidden_size)?;
        }
        Ok(())
    }
}
