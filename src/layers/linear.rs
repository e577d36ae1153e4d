use ndarray::{Array2, Axis};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_rows, ensure_shape, Result};
use crate::optimizers::{GradientSet, Optimizer};

/// Holds gradients for linear layer parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LinearGradients {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
}

impl GradientSet for LinearGradients {
    fn zeros_like(&self) -> Self {
        LinearGradients {
            weight: self.weight.zeros_like(),
            bias: self.bias.zeros_like(),
        }
    }

    fn accumulate(&mut self, other: &Self) {
        self.weight += &other.weight;
        self.bias += &other.bias;
    }

    fn scale(&mut self, factor: f64) {
        GradientSet::scale(&mut self.weight, factor);
        GradientSet::scale(&mut self.bias, factor);
    }

    fn squared_norm(&self) -> f64 {
        self.weight.squared_norm() + self.bias.squared_norm()
    }
}

/// A fully connected (linear/dense) layer used as the readout of a recurrent model
///
/// Performs the transformation: output = weight · input + bias
/// where weight has shape (output_size, input_size) and bias has shape (output_size, 1)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinearLayer {
    #[serde(with = "crate::persistence::array2")]
    pub weight: Array2<f64>,
    #[serde(with = "crate::persistence::array2")]
    pub bias: Array2<f64>,
    pub input_size: usize,
    pub output_size: usize,
}

impl LinearLayer {
    /// Create a new linear layer with Xavier/Glorot initialization
    pub fn new(input_size: usize, output_size: usize) -> Self {
        Self::with_rng(input_size, output_size, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        // Xavier/Glorot initialization: scale by sqrt(2 / (input_size + output_size))
        let scale = (2.0 / (input_size + output_size) as f64).sqrt();
        let weight = Array2::random_using((output_size, input_size), Uniform::new(-scale, scale), rng);
        let bias = Array2::zeros((output_size, 1));

        Self { weight, bias, input_size, output_size }
    }

    /// Create a new linear layer with zero initialization
    pub fn new_zeros(input_size: usize, output_size: usize) -> Self {
        Self {
            weight: Array2::zeros((output_size, input_size)),
            bias: Array2::zeros((output_size, 1)),
            input_size,
            output_size,
        }
    }

    /// Create a new linear layer with custom weights
    pub fn from_weights(weight: Array2<f64>, bias: Array2<f64>) -> Result<Self> {
        let (output_size, input_size) = weight.dim();
        ensure_shape("linear bias", &bias, output_size, 1)?;

        Ok(Self { weight, bias, input_size, output_size })
    }

    /// Checks the weight and bias shapes against the declared sizes.
    pub fn validate(&self) -> Result<()> {
        ensure_shape("linear weight", &self.weight, self.output_size, self.input_size)?;
        ensure_shape("linear bias", &self.bias, self.output_size, 1)
    }

    /// Forward pass through the linear layer
    ///
    /// `input` is (input_size, batch_size); the output is (output_size, batch_size).
    pub fn forward(&self, input: &Array2<f64>) -> Result<Array2<f64>> {
        ensure_rows("linear input", input, self.input_size)?;
        Ok(self.weight.dot(input) + &self.bias)
    }

    /// Backward pass through the linear layer
    ///
    /// `input` must be the tensor given to the matching `forward` call.
    /// Returns (gradients, input_gradient).
    pub fn backward(
        &self,
        input: &Array2<f64>,
        grad_output: &Array2<f64>) -> (LinearGradients, Array2<f64>,
    ) {
        let gradients = LinearGradients {
            weight: grad_output.dot(&input.t()),
            // Sum over the batch dimension, keep as column vector
            bias: grad_output.sum_axis(Axis(1)).insert_axis(Axis(1)),
        };

        let input_grad = self.weight.t().dot(grad_output);
        (gradients, input_grad)
    }

    /// Update parameters using the provided optimizer
    pub fn update_parameters<O: Optimizer>(
        &mut self,
        gradients: &LinearGradients,
        optimizer: &mut O,
        prefix: &str,
    ) {
        optimizer.update(&format!("{}_weight", prefix), &mut self.weight, &gradients.weight);
        optimizer.update(&format!("{}_bias", prefix), &mut self.bias, &gradients.bias);
    }

    /// Initialize zero gradients for accumulation
    pub fn zero_gradients(&self) -> LinearGradients {
        LinearGradients {
            weight: Array2::zeros(self.weight.raw_dim()),
            bias: Array2::zeros(self.bias.raw_dim()),
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::SGD;
    use ndarray::arr2;

    #[test]
    fn test_linear_layer_creation() {
        let layer = LinearLayer::new(10, 5);
        assert_eq!(layer.input_size, 10);
        assert_eq!(layer.output_size, 5);
        assert_eq!(layer.weight.shape(), &[5, 10]);
        assert_eq!(layer.bias.shape(), &[5, 1]);
        assert_eq!(layer.num_parameters(), 55);
    }

    #[test]
    fn test_linear_layer_forward() {
        let layer = LinearLayer::from_weights(arr2(&[[1.0, 2.0, 3.0]]), arr2(&[[0.5]])).unwrap();
        let input = arr2(&[[1.0, 0.0], [1.0, 0.0], [1.0, 1.0]]);

        let output = layer.forward(&input).unwrap();
        assert_eq!(output, arr2(&[[6.5, 3.5]]));
    }

    #[test]
    fn test_linear_layer_rejects_wrong_input() {
        let layer = LinearLayer::new_zeros(3, 2);
        assert!(layer.forward(&Array2::zeros((2, 1))).is_err());
        assert!(LinearLayer::from_weights(Array2::zeros((2, 3)), Array2::zeros((3, 1))).is_err());
    }

    #[test]
    fn test_linear_layer_backward() {
        let layer = LinearLayer::new(3, 2);
        let input = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let grad_output = arr2(&[[1.0, 1.0], [1.0, 1.0]]);

        let (gradients, input_grad) = layer.backward(&input, &grad_output);

        assert_eq!(gradients.weight.shape(), &[2, 3]);
        assert_eq!(gradients.bias, arr2(&[[2.0], [2.0]]));
        assert_eq!(input_grad.shape(), &[3, 2]);
    }

    #[test]
    fn test_linear_layer_with_optimizer() {
        let mut layer = LinearLayer::new_zeros(2, 1);
        let mut optimizer = SGD::new(0.1);

        let input = arr2(&[[1.0], [2.0]]);
        let target = arr2(&[[3.0]]);

        let output = layer.forward(&input).unwrap();
        let grad_output = &output - &target;
        let (gradients, _) = layer.backward(&input, &grad_output);
        layer.update_parameters(&gradients, &mut optimizer, "linear");

        assert!((&layer.weight - &arr2(&[[0.3, 0.6]])).mapv(f64::abs).sum() < 1e-12);
        assert!((layer.bias[[0, 0]] - 0.3).abs() < 1e-12);
    }
}
