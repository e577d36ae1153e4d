//! Toy sequence tasks and batching helpers.
//!
//! Every sample is a single sequence: one (features, 1) column per step.
//! `stack_batch` turns several samples of equal length into one batched
//! sample whose columns are the individual sequences.

use ndarray::{Array2, Axis};
use rand::Rng;

use crate::error::{RnnError, Result};
use crate::layers::recurrent::RecurrentCell;
use crate::models::sequence_model::SequenceModel;
use crate::training::TrainingSample;

/// Sequence length used by the binary counting task.
pub const BINARY_COUNTING_SEQ_LEN: usize = 20;

/// Window length used by the sine wave task.
pub const SINE_WINDOW: usize = 40;

fn scalar(value: f64) -> Array2<f64> {
    Array2::from_elem((1, 1), value)
}

/// Random 0/1 sequences labelled with their count of ones
///
/// Each sequence draws its own probability of a one, so counts cover the
/// whole range instead of clustering around `seq_len / 2`. Targets are
/// normalised to `count / seq_len`.
pub fn binary_counting_samples<R: Rng + ?Sized>(
    n: usize,
    seq_len: usize,
    rng: &mut R,
) -> Vec<TrainingSample> {
    (0..n)
        .map(|_| {
            let p: f64 = rng.gen();
            let bits: Vec<f64> = (0..seq_len).map(|_| if rng.gen_bool(p) { 1.0 } else { 0.0 }).collect();
            let count: f64 = bits.iter().sum();

            let inputs = bits.into_iter().map(scalar).collect();
            TrainingSample::new(inputs, vec![scalar(count / seq_len as f64)])
        })
        .collect()
}

/// Converts a normalised counting prediction back to a count
pub fn predicted_count(prediction: f64, seq_len: usize) -> f64 {
    prediction * seq_len as f64
}

/// `sin(i * step)` for `i` in `0..len`
pub fn sine_wave_series(len: usize, step: f64) -> Vec<f64> {
    (0..len).map(|i| (i as f64 * step).sin()).collect()
}

/// Sliding windows over `series`, each labelled with the value that follows it
pub fn sine_wave_windows(series: &[f64], window: usize) -> Vec<TrainingSample> {
    if window == 0 || series.len() <= window {
        return Vec::new();
    }

    (0..series.len() - window)
        .map(|start| {
            let inputs = series[start..start + window].iter().copied().map(scalar).collect();
            TrainingSample::new(inputs, vec![scalar(series[start + window])])
        })
        .collect()
}

/// Extend `history` by `steps` values, feeding each prediction back as input
///
/// The model reads a sliding window the length of `history` and must map one
/// feature to one output.
pub fn autoregressive_forecast<C: RecurrentCell>(
    model: &SequenceModel<C>,
    history: &[f64],
    steps: usize,
) -> Result<Vec<f64>> {
    if history.is_empty() {
        return Err(RnnError::EmptySequence);
    }
    if model.input_size() != 1 || model.output_size() != 1 {
        return Err(RnnError::ShapeMismatch {
            context: "autoregressive model",
            expected: vec![1, 1],
            actual: vec![model.input_size(), model.output_size()],
        });
    }

    let mut window: Vec<Array2<f64>> = history.iter().copied().map(scalar).collect();
    let mut forecast = Vec::with_capacity(steps);

    for _ in 0..steps {
        let next = model.predict(&window)?[[0, 0]];
        forecast.push(next);
        window.remove(0);
        window.push(scalar(next));
    }

    Ok(forecast)
}

/// Stack samples of equal length into one batched sample (one column each)
pub fn stack_batch(samples: &[&TrainingSample]) -> Result<TrainingSample> {
    let first = match samples.first() {
        Some(first) => first,
        None => return Ok(TrainingSample::new(Vec::new(), Vec::new())),
    };

    for sample in samples {
        if sample.inputs.len() != first.inputs.len() {
            return Err(RnnError::LengthMismatch {
                context: "batched sequence",
                expected: first.inputs.len(),
                actual: sample.inputs.len(),
            });
        }
        if sample.targets.len() != first.targets.len() {
            return Err(RnnError::LengthMismatch {
                context: "batched targets",
                expected: first.targets.len(),
                actual: sample.targets.len(),
            });
        }
    }

    let inputs: Vec<&[Array2<f64>]> = samples.iter().map(|s| s.inputs.as_slice()).collect();
    let targets: Vec<&[Array2<f64>]> = samples.iter().map(|s| s.targets.as_slice()).collect();
    Ok(TrainingSample::new(stack_steps(&inputs)?, stack_steps(&targets)?))
}

/// Concatenate step `t` of every sequence along the batch axis.
fn stack_steps(sequences: &[&[Array2<f64>]]) -> Result<Vec<Array2<f64>>> {
    let len = sequences.first().map_or(0, |seq| seq.len());
    (0..len)
        .map(|t| {
            let columns: Vec<_> = sequences.iter().map(|seq| seq[t].view()).collect();
            Ok(ndarray::concatenate(Axis(1), &columns)?)
        })
        .collect()
}

/// Split `samples` into consecutive stacked batches of at most `batch_size`
pub fn batches(samples: &[TrainingSample], batch_size: usize) -> Result<Vec<TrainingSample>> {
    if batch_size == 0 {
        return Err(RnnError::InvalidConfig("batch_size must be positive".into()));
    }

    samples
        .chunks(batch_size)
        .map(|chunk| {
            let refs: Vec<&TrainingSample> = chunk.iter().collect();
            stack_batch(&refs)
        })
        .collect()
}
