use ndarray::{Array2, Axis};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_rows, ensure_shape, Result};
use crate::optimizers::{GradientSet, Optimizer};

/// Parameters of a single gate: `W_x·x + W_h·h + b`.
///
/// `w_x` is (hidden_size, input_size), `w_h` is (hidden_size, hidden_size)
/// and `bias` is a (hidden_size, 1) column that broadcasts across the batch.
/// The same type carries the gradients of a gate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateWeights {
    #[serde(with = "crate::persistence::array2")]
    pub w_x: Array2<f64>,
    #[serde(with = "crate::persistence::array2")]
    pub w_h: Array2<f64>,
    #[serde(with = "crate::persistence::array2")]
    pub bias: Array2<f64>,
}

impl GateWeights {
    /// Uniform initialisation in ±1/√hidden_size, biases at zero.
    pub fn with_rng<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (hidden_size.max(1) as f64).sqrt();
        let dist = Uniform::new_inclusive(-bound, bound);

        GateWeights {
            w_x: Array2::random_using((hidden_size, input_size), dist, rng),
            w_h: Array2::random_using((hidden_size, hidden_size), dist, rng),
            bias: Array2::zeros((hidden_size, 1)),
        }
    }

    pub fn zeros(input_size: usize, hidden_size: usize) -> Self {
        GateWeights {
            w_x: Array2::zeros((hidden_size, input_size)),
            w_h: Array2::zeros((hidden_size, hidden_size)),
            bias: Array2::zeros((hidden_size, 1)),
        }
    }

    /// Zero weights with every bias entry set to `bias`, handy for pinning a gate open or shut.
    pub fn constant_bias(input_size: usize, hidden_size: usize, bias: f64) -> Self {
        let mut gate = Self::zeros(input_size, hidden_size);
        gate.bias.fill(bias);
        gate
    }

    pub fn input_size(&self) -> usize {
        self.w_x.ncols()
    }

    pub fn hidden_size(&self) -> usize {
        self.w_x.nrows()
    }

    pub fn num_parameters(&self) -> usize {
        self.w_x.len() + self.w_h.len() + self.bias.len()
    }

    /// Checks every matrix against the sizes a cell was built with.
    pub fn validate(
        &self,
        context: &'static str,
        input_size: usize,
        hidden_size: usize,
    ) -> Result<()> {
        ensure_shape(context, &self.w_x, hidden_size, input_size)?;
        ensure_shape(context, &self.w_h, hidden_size, hidden_size)?;
        ensure_shape(context, &self.bias, hidden_size, 1)
    }

    /// Gate pre-activation for a batch of columns.
    ///
    /// Callers validate `x` and `h`; this only does the algebra.
    pub fn pre_activation(&self, x: &Array2<f64>, h: &Array2<f64>) -> Array2<f64> {
        self.w_x.dot(x) + self.w_h.dot(h) + &self.bias
    }

    /// Backward pass of `pre_activation`.
    ///
    /// Returns (parameter_gradients, dx, dh).
    pub fn backward(
        &self,
        d_pre: &Array2<f64>,
        x: &Array2<f64>,
        h: &Array2<f64>) -> (GateWeights, Array2<f64>, Array2<f64>,
    ) {
        let gradients = GateWeights {
            w_x: d_pre.dot(&x.t()),
            w_h: d_pre.dot(&h.t()),
            bias: d_pre.sum_axis(Axis(1)).insert_axis(Axis(1)),
        };
        let dx = self.w_x.t().dot(d_pre);
        let dh = self.w_h.t().dot(d_pre);
        (gradients, dx, dh)
    }

    pub fn update_parameters<O: Optimizer>(
        &mut self,
        gradients: &GateWeights,
        optimizer: &mut O,
        prefix: &str,
    ) {
        optimizer.update(&format!("{}_w_x", prefix), &mut self.w_x, &gradients.w_x);
        optimizer.update(&format!("{}_w_h", prefix), &mut self.w_h, &gradients.w_h);
        optimizer.update(&format!("{}_bias", prefix), &mut self.bias, &gradients.bias);
    }
}

impl GradientSet for GateWeights {
    fn zeros_like(&self) -> Self {
        GateWeights::zeros(self.input_size(), self.hidden_size())
    }

    fn accumulate(&mut self, other: &Self) {
        self.w_x += &other.w_x;
        self.w_h += &other.w_h;
        self.bias += &other.bias;
    }

    fn scale(&mut self, factor: f64) {
        self.w_x.scale(factor);
        self.w_h.scale(factor);
        self.bias.scale(factor);
    }

    fn squared_norm(&self) -> f64 {
        self.w_x.squared_norm() + self.w_h.squared_norm() + self.bias.squared_norm()
    }
}

/// Validates an input/state pair against a cell's sizes and returns the batch size.
pub(crate) fn check_step_shapes(
    input: &Array2<f64>,
    hidden: &Array2<f64>,
    input_size: usize,
    hidden_size: usize,
) -> Result<usize> {
    let batch = ensure_rows("hidden state", hidden, hidden_size)?;
    ensure_shape("input", input, input_size, batch)?;
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_gate_shapes() {
        let mut rng = StdRng::seed_from_u64(1);
        let gate = GateWeights::with_rng(3, 4, &mut rng);
        assert_eq!(gate.w_x.shape(), &[4, 3]);
        assert_eq!(gate.w_h.shape(), &[4, 4]);
        assert_eq!(gate.bias.shape(), &[4, 1]);
        assert_eq!(gate.num_parameters(), 12 + 16 + 4);
        assert!(gate.validate("gate", 3, 4).is_ok());
        assert!(gate.validate("gate", 2, 4).is_err());
    }

    #[test]
    fn test_pre_activation_broadcasts_bias() {
        let gate = GateWeights {
            w_x: arr2(&[[1.0, 0.0]]),
            w_h: arr2(&[[2.0]]),
            bias: arr2(&[[0.5]]),
        };
        let x = arr2(&[[1.0, 2.0], [5.0, 5.0]]);
        let h = arr2(&[[1.0, -1.0]]);

        let pre = gate.pre_activation(&x, &h);
        assert_eq!(pre, arr2(&[[3.5, 0.5]]));
    }

    #[test]
    fn test_backward_sums_bias_over_batch() {
        let mut rng = StdRng::seed_from_u64(2);
        let gate = GateWeights::with_rng(2, 3, &mut rng);
        let x = Array2::ones((2, 4));
        let h = Array2::ones((3, 4));
        let d_pre = Array2::ones((3, 4));

        let (grads, dx, dh) = gate.backward(&d_pre, &x, &h);
        assert_eq!(grads.bias, Array2::from_elem((3, 1), 4.0));
        assert_eq!(grads.w_x, Array2::from_elem((3, 2), 4.0));
        assert_eq!(dx.shape(), &[2, 4]);
        assert_eq!(dh.shape(), &[3, 4]);
    }

    #[test]
    fn test_step_shape_check() {
        let x = Array2::zeros((3, 2));
        let h = Array2::zeros((4, 2));
        assert_eq!(check_step_shapes(&x, &h, 3, 4).unwrap(), 2);
        assert!(check_step_shapes(&x, &h, 2, 4).is_err());
        assert!(check_step_shapes(&x, &Array2::zeros((4, 1)), 3, 4).is_err());
    }
}
