use ndarray::Array2;
use rand::Rng;

use crate::error::Result;
use crate::optimizers::{GradientSet, Optimizer};

/// A recurrent cell usable by the sequence driver.
///
/// Cells are pure: `step` reads the weights and the previous state and
/// returns a fresh state. The caller owns the state and threads it from one
/// time step to the next. State tensors are (hidden_size, batch) columns.
pub trait RecurrentCell: Clone {
    /// Carried state. Also used to carry the gradient with respect to the state.
    type State: Clone + std::fmt::Debug;
    /// Values saved by `step` for the backward pass.
    type Cache: Clone;
    /// Learned parameters; the same type holds their gradients.
    type Weights: GradientSet + Clone;

    /// Short name used in saved metadata and log lines.
    const NAME: &'static str;

    fn with_rng<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self;

    fn input_size(&self) -> usize;
    fn hidden_size(&self) -> usize;

    fn zero_state(&self, batch_size: usize) -> Self::State;
    fn hidden(state: &Self::State) -> &Array2<f64>;
    fn hidden_mut(state: &mut Self::State) -> &mut Array2<f64>;

    /// One time step. Fails on any input/state shape mismatch.
    fn step(&self, input: &Array2<f64>, state: &Self::State) -> Result<(Self::State, Self::Cache)>;

    /// Backward through one step.
    ///
    /// `d_state` is the loss gradient with respect to the state this step
    /// produced. Returns (parameter_gradients, d_input, d_previous_state).
    fn backward_step(
        &self,
        d_state: &Self::State,
        cache: &Self::Cache) -> (Self::Weights, Array2<f64>, Self::State,
    );

    fn weights(&self) -> &Self::Weights;

    fn zero_gradients(&self) -> Self::Weights {
        self.weights().zeros_like()
    }

    fn update_parameters<O: Optimizer>(
        &mut self,
        gradients: &Self::Weights,
        optimizer: &mut O,
        prefix: &str,
    );

    fn num_parameters(&self) -> usize;

    /// Checks the weights against the declared input and hidden sizes.
    fn validate(&self) -> Result<()>;
}
