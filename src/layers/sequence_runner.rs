//! Drives a recurrent cell across the time steps of a sequence.
//!
//! The runner only threads state: each step feeds the previous step's state
//! back into the same pure cell. Running right to left is the same loop with
//! the time index mirrored, which is all a bidirectional layer needs.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_rows, ensure_shape, RnnError, Result};
use crate::layers::recurrent::RecurrentCell;
use crate::optimizers::GradientSet;

/// Order in which a sequence is consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    /// Time index visited at processing step `step` of a `len`-step sequence.
    pub fn time_index(self, step: usize, len: usize) -> usize {
        match self {
            Direction::Forward => step,
            Direction::Backward => len - 1 - step,
        }
    }
}

/// Everything produced by one pass of a cell over a sequence
pub struct SequenceRun<C: RecurrentCell> {
    /// Hidden state after each input, in time order regardless of direction.
    pub outputs: Vec<Array2<f64>>,
    /// State after the last processed input.
    pub final_state: C::State,
    /// Per-step caches in processing order.
    pub caches: Vec<C::Cache>,
    pub direction: Direction,
}

impl<C: RecurrentCell> SequenceRun<C> {
    pub fn final_hidden(&self) -> &Array2<f64> {
        C::hidden(&self.final_state)
    }
}

/// Run `cell` over `sequence` from a zero state.
pub fn run_sequence<C: RecurrentCell>(
    cell: &C,
    sequence: &[Array2<f64>],
    direction: Direction,
) -> Result<SequenceRun<C>> {
    run_sequence_from(cell, sequence, None, direction)
}

/// Run `cell` over `sequence`, optionally continuing from a carried state.
///
/// Stops at the first step whose input does not fit the cell.
pub fn run_sequence_from<C: RecurrentCell>(
    cell: &C,
    sequence: &[Array2<f64>],
    initial_state: Option<C::State>,
    direction: Direction,
) -> Result<SequenceRun<C>> {
    let first = sequence.first().ok_or(RnnError::EmptySequence)?;
    let len = sequence.len();

    let mut state = initial_state.unwrap_or_else(|| cell.zero_state(first.ncols()));
    let mut outputs = Vec::with_capacity(len);
    let mut caches = Vec::with_capacity(len);

    for step in 0..len {
        let t = direction.time_index(step, len);
        let (next_state, cache) = cell.step(&sequence[t], &state)?;
        outputs.push(C::hidden(&next_state).clone());
        caches.push(cache);
        state = next_state;
    }

    if direction == Direction::Backward {
        outputs.reverse();
    }

    Ok(SequenceRun { outputs, final_state: state, caches, direction })
}

/// Backpropagation through time for one directional pass.
///
/// `d_outputs` holds the loss gradient for each hidden output in time order;
/// `d_final_state` is an extra gradient on the final state (e.g. the LSTM
/// cell state when it is carried onwards). Returns the summed parameter
/// gradients and the gradient for every input, in time order.
///
/// Every output gradient must be (hidden_size, batch) with one per cached step.
pub fn backprop_sequence<C: RecurrentCell>(
    cell: &C,
    caches: &[C::Cache],
    d_outputs: &[Array2<f64>],
    d_final_state: Option<&C::State>,
    direction: Direction,
) -> Result<(C::Weights, Vec<Array2<f64>>)> {
    let len = caches.len();
    if d_outputs.len() != len {
        return Err(RnnError::LengthMismatch {
            context: "sequence output gradients",
            expected: len,
            actual: d_outputs.len(),
        });
    }

    let mut gradients = cell.zero_gradients();
    let mut d_inputs = Vec::with_capacity(len);
    if len == 0 {
        return Ok((gradients, d_inputs));
    }

    let batch_size = ensure_rows("sequence output gradient", &d_outputs[0], cell.hidden_size())?;
    for d_output in d_outputs {
        ensure_shape("sequence output gradient", d_output, cell.hidden_size(), batch_size)?;
    }

    let mut d_state = match d_final_state {
        Some(state) => {
            ensure_shape("final state gradient", C::hidden(state), cell.hidden_size(), batch_size)?;
            state.clone()
        }
        None => cell.zero_state(batch_size),
    };

    for step in (0..len).rev() {
        let t = direction.time_index(step, len);
        *C::hidden_mut(&mut d_state) += &d_outputs[t];

        let (step_gradients, d_input, d_previous) = cell.backward_step(&d_state, &caches[step]);
        gradients.accumulate(&step_gradients);
        d_inputs.push(d_input);
        d_state = d_previous;
    }

    // Forward runs were unwound from the last time step, backward runs from the first.
    if direction == Direction::Forward {
        d_inputs.reverse();
    }

    Ok((gradients, d_inputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::gru_cell::GRUCell;
    use crate::layers::lstm_cell::LSTMCell;
    use ndarray::arr2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sequence() -> Vec<Array2<f64>> {
        vec![arr2(&[[1.0], [0.0]]), arr2(&[[0.0], [1.0]]), arr2(&[[-1.0], [0.5]])]
    }

    #[test]
    fn test_forward_run_threads_state() {
        let cell = LSTMCell::with_rng(2, 3, &mut StdRng::seed_from_u64(5));
        let run = run_sequence(&cell, &sequence(), Direction::Forward).unwrap();

        assert_eq!(run.outputs.len(), 3);
        assert_eq!(run.caches.len(), 3);
        assert_eq!(run.final_hidden(), &run.outputs[2]);

        // Manual threading gives the same states
        let mut h = Array2::zeros((3, 1));
        let mut c = Array2::zeros((3, 1));
        for (t, x) in sequence().iter().enumerate() {
            let (hy, cy) = cell.forward(x, &h, &c).unwrap();
            assert_eq!(hy, run.outputs[t]);
            h = hy;
            c = cy;
        }
        assert_eq!(c, run.final_state.cell);
    }

    #[test]
    fn test_backward_run_consumes_right_to_left() {
        let cell = GRUCell::with_rng(2, 3, &mut StdRng::seed_from_u64(5));
        let mut reversed = sequence();
        reversed.reverse();

        let backward = run_sequence(&cell, &sequence(), Direction::Backward).unwrap();
        let forward_on_reversed = run_sequence(&cell, &reversed, Direction::Forward).unwrap();

        // Output at time t of the backward run is the state after seeing t..end
        assert_eq!(backward.outputs[0], forward_on_reversed.outputs[2]);
        assert_eq!(backward.outputs[2], forward_on_reversed.outputs[0]);
        assert_eq!(backward.final_hidden(), &backward.outputs[0]);
    }

    #[test]
    fn test_empty_sequence_is_rejected() {
        let cell = GRUCell::with_rng(2, 3, &mut StdRng::seed_from_u64(5));
        assert!(matches!(run_sequence(&cell, &[], Direction::Forward), Err(RnnError::EmptySequence)));
    }

    #[test]
    fn test_ragged_sequence_fails_at_bad_step() {
        let cell = GRUCell::with_rng(2, 3, &mut StdRng::seed_from_u64(5));
        let mut seq = sequence();
        seq[1] = arr2(&[[1.0], [2.0], [3.0]]);
        assert!(matches!(
            run_sequence(&cell, &seq, Direction::Forward),
            Err(RnnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_bptt_matches_finite_differences() {
        let cell = LSTMCell::with_rng(2, 3, &mut StdRng::seed_from_u64(9));
        let seq = sequence();

        // L = sum of the final hidden state of a right-to-left pass
        let loss = |cell: &LSTMCell, seq: &[Array2<f64>]| {
            run_sequence(cell, seq, Direction::Backward).unwrap().final_hidden().sum()
        };

        let run = run_sequence(&cell, &seq, Direction::Backward).unwrap();
        let mut d_outputs = vec![Array2::zeros((3, 1)); 3];
        d_outputs[0] = Array2::ones((3, 1));
        let (grads, d_inputs) =
            backprop_sequence(&cell, &run.caches, &d_outputs, None, Direction::Backward).unwrap();

        let eps = 1e-6;
        for r in 0..3 {
            for c in 0..3 {
                let mut plus = cell.clone();
                plus.weights.output.w_h[[r, c]] += eps;
                let mut minus = cell.clone();
                minus.weights.output.w_h[[r, c]] -= eps;
                let numeric = (loss(&plus, &seq) - loss(&minus, &seq)) / (2.0 * eps);
                assert!((numeric - grads.output.w_h[[r, c]]).abs() < 1e-6);
            }
        }

        for t in 0..3 {
            for r in 0..2 {
                let mut plus = seq.clone();
                plus[t][[r, 0]] += eps;
                let mut minus = seq.clone();
                minus[t][[r, 0]] -= eps;
                let numeric = (loss(&cell, &plus) - loss(&cell, &minus)) / (2.0 * eps);
                assert!((numeric - d_inputs[t][[r, 0]]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_bptt_rejects_missing_output_gradients() {
        let cell = GRUCell::with_rng(2, 3, &mut StdRng::seed_from_u64(5));
        let run = run_sequence(&cell, &sequence(), Direction::Forward).unwrap();

        let result = backprop_sequence(&cell, &run.caches, &[Array2::zeros((3, 1))], None, Direction::Forward);
        assert!(matches!(result, Err(RnnError::LengthMismatch { expected: 3, actual: 1, .. })));
    }

    #[test]
    fn test_bptt_rejects_wrongly_shaped_output_gradient() {
        let cell = LSTMCell::with_rng(2, 3, &mut StdRng::seed_from_u64(5));
        let run = run_sequence(&cell, &sequence(), Direction::Forward).unwrap();

        let mut d_outputs = vec![Array2::zeros((3, 1)); 3];
        d_outputs[2] = Array2::zeros((4, 1));
        let result = backprop_sequence(&cell, &run.caches, &d_outputs, None, Direction::Forward);
        assert!(matches!(result, Err(RnnError::ShapeMismatch { .. })));
    }
}
