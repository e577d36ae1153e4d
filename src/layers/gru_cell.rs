use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::layers::gate::{check_step_shapes, GateWeights};
use crate::layers::recurrent::RecurrentCell;
use crate::optimizers::{GradientSet, Optimizer};
use crate::utils::sigmoid;

/// The three gate weight sets of a GRU cell
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GRUWeights {
    pub reset: GateWeights,
    pub update: GateWeights,
    pub candidate: GateWeights,
}

pub type GRUCellGradients = GRUWeights;

impl GRUWeights {
    pub fn zeros(input_size: usize, hidden_size: usize) -> Self {
        GRUWeights {
            reset: GateWeights::zeros(input_size, hidden_size),
            update: GateWeights::zeros(input_size, hidden_size),
            candidate: GateWeights::zeros(input_size, hidden_size),
        }
    }

    fn gates(&self) -> [&GateWeights; 3] {
        [&self.reset, &self.update, &self.candidate]
    }
}

impl GradientSet for GRUWeights {
    fn zeros_like(&self) -> Self {
        GRUWeights {
            reset: self.reset.zeros_like(),
            update: self.update.zeros_like(),
            candidate: self.candidate.zeros_like(),
        }
    }

    fn accumulate(&mut self, other: &Self) {
        self.reset.accumulate(&other.reset);
        self.update.accumulate(&other.update);
        self.candidate.accumulate(&other.candidate);
    }

    fn scale(&mut self, factor: f64) {
        self.reset.scale(factor);
        self.update.scale(factor);
        self.candidate.scale(factor);
    }

    fn squared_norm(&self) -> f64 {
        self.gates().iter().map(|gate| gate.squared_norm()).sum()
    }
}

/// Caches intermediate values during forward pass for efficient backward computation
#[derive(Clone, Debug)]
pub struct GRUCellCache {
    pub input: Array2<f64>,
    pub hx: Array2<f64>,
    pub reset_gate: Array2<f64>,
    pub update_gate: Array2<f64>,
    pub candidate: Array2<f64>,
    pub reset_hidden: Array2<f64>,
}

/// GRU cell built directly from the gate equations
///
/// - r_t = σ(W_r·[x_t, h_t-1] + b_r)
/// - z_t = σ(W_z·[x_t, h_t-1] + b_z)
/// - h̃_t = tanh(W_h·[x_t, r_t ⊙ h_t-1] + b_h)
/// - h_t = (1 - z_t) ⊙ h_t-1 + z_t ⊙ h̃_t
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GRUCell {
    pub(crate) weights: GRUWeights,
    pub(crate) input_size: usize,
    hidden_size: usize,
}

impl GRUCell {
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        Self::with_rng(input_size, hidden_size, &mut rand::thread_rng())
    }

    pub fn from_weights(weights: GRUWeights) -> Result<Self> {
        let input_size = weights.reset.input_size();
        let hidden_size = weights.reset.hidden_size();
        for gate in weights.gates() {
            gate.validate("gru gate weights", input_size, hidden_size)?;
        }

        Ok(GRUCell { weights, input_size, hidden_size })
    }

    pub fn forward(&self, input: &Array2<f64>, hx: &Array2<f64>) -> Result<Array2<f64>> {
        let (hy, _) = self.forward_with_cache(input, hx)?;
        Ok(hy)
    }

    pub fn forward_with_cache(
        &self,
        input: &Array2<f64>,
        hx: &Array2<f64>,
    ) -> Result<(Array2<f64>, GRUCellCache)> {
        check_step_shapes(input, hx, self.input_size, self.hidden_size)?;

        let w = &self.weights;
        let reset_gate = w.reset.pre_activation(input, hx).mapv_into(sigmoid);
        let update_gate = w.update.pre_activation(input, hx).mapv_into(sigmoid);

        // The candidate only sees the part of h_t-1 the reset gate lets through
        let reset_hidden = &reset_gate * hx;
        let candidate = w.candidate.pre_activation(input, &reset_hidden).mapv_into(f64::tanh);

        // h_t = (1 - z_t) ⊙ h_t-1 + z_t ⊙ h̃_t
        let hy = &update_gate.mapv(|z| 1.0 - z) * hx + &update_gate * &candidate;

        let cache = GRUCellCache {
            input: input.clone(),
            hx: hx.clone(),
            reset_gate,
            update_gate,
            candidate,
            reset_hidden,
        };

        Ok((hy, cache))
    }

    /// Backward pass for one time step
    ///
    /// Returns (parameter_gradients, input_gradient, hidden_gradient)
    pub fn backward(
        &self,
        dhy: &Array2<f64>,
        cache: &GRUCellCache) -> (GRUCellGradients, Array2<f64>, Array2<f64>,
    ) {
        let r = &cache.reset_gate;
        let z = &cache.update_gate;
        let n = &cache.candidate;

        // Output mix: h_t = (1 - z_t) ⊙ h_t-1 + z_t ⊙ h̃_t
        let dz_raw = dhy * &(n - &cache.hx) * z * &z.mapv(|x| 1.0 - x);
        let dn_raw = dhy * z * &n.mapv(|x| 1.0 - x * x);
        let dhx_direct = dhy * &z.mapv(|x| 1.0 - x);

        let w = &self.weights;
        let (d_candidate, dx_n, d_reset_hidden) =
            w.candidate.backward(&dn_raw, &cache.input, &cache.reset_hidden);

        // reset_hidden = r_t ⊙ h_t-1
        let dr_raw = &d_reset_hidden * &cache.hx * r * &r.mapv(|x| 1.0 - x);
        let dhx_through_reset = &d_reset_hidden * r;

        let (d_reset, dx_r, dh_r) = w.reset.backward(&dr_raw, &cache.input, &cache.hx);
        let (d_update, dx_z, dh_z) = w.update.backward(&dz_raw, &cache.input, &cache.hx);

        let gradients = GRUCellGradients {
            reset: d_reset,
            update: d_update,
            candidate: d_candidate,
        };

        let dx = dx_n + dx_r + dx_z;
        let dhx = dhx_direct + dhx_through_reset + dh_r + dh_z;

        (gradients, dx, dhx)
    }

    pub fn zero_gradients(&self) -> GRUCellGradients {
        GRUWeights::zeros(self.input_size, self.hidden_size)
    }

    pub fn update_parameters<O: Optimizer>(
        &mut self,
        gradients: &GRUCellGradients,
        optimizer: &mut O,
        prefix: &str,
    ) {
        let w = &mut self.weights;
        w.reset.update_parameters(&gradients.reset, optimizer, &format!("{}_reset", prefix));
        w.update.update_parameters(&gradients.update, optimizer, &format!("{}_update", prefix));
        w.candidate.update_parameters(&gradients.candidate, optimizer, &format!("{}_candidate", prefix));
    }

    pub fn num_parameters(&self) -> usize {
        self.weights.gates().iter().map(|gate| gate.num_parameters()).sum()
    }
}

impl RecurrentCell for GRUCell {
    type State = Array2<f64>;
    type Cache = GRUCellCache;
    type Weights = GRUWeights;

    const NAME: &'static str = "gru";

    fn with_rng<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let weights = GRUWeights {
            reset: GateWeights::with_rng(input_size, hidden_size, rng),
            update: GateWeights::with_rng(input_size, hidden_size, rng),
            candidate: GateWeights::with_rng(input_size, hidden_size, rng),
        };

        GRUCell { weights, input_size, hidden_size }
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn zero_state(&self, batch_size: usize) -> Array2<f64> {
        Array2::zeros((self.hidden_size, batch_size))
    }

    fn hidden(state: &Array2<f64>) -> &Array2<f64> {
        state
    }

    fn hidden_mut(state: &mut Array2<f64>) -> &mut Array2<f64> {
        state
    }

    fn step(
        &self,
        input: &Array2<f64>,
        state: &Array2<f64>,
    ) -> Result<(Array2<f64>, GRUCellCache)> {
        self.forward_with_cache(input, state)
    }

    fn backward_step(
        &self,
        d_state: &Array2<f64>,
        cache: &GRUCellCache) -> (GRUWeights, Array2<f64>, Array2<f64>,
    ) {
        self.backward(d_state, cache)
    }

    fn weights(&self) -> &GRUWeights {
        &self.weights
    }

    fn update_parameters<O: Optimizer>(
        &mut self,
        gradients: &GRUWeights,
        optimizer: &mut O,
        prefix: &str,
    ) {
        GRUCell::update_parameters(self, gradients, optimizer, prefix);
    }

    fn num_parameters(&self) -> usize {
        GRUCell::num_parameters(self)
    }

    fn validate(&self) -> Result<()> {
        for gate in self.weights.gates() {
            gate.validate("gru gate weights", self.input_size, self.hidden_size)?;
        }
        Ok(())
    }
}
