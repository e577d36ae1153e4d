use ndarray::Array2;
use ndarray_rand::RandomExt;
use rand_distr::StandardNormal;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{RnnError, Result};
use crate::optimizers::Optimizer;

/// Token embedding table mapping token ids to dense input vectors
///
/// `weight` is (embedding_dim, vocab_size); column `t` is the vector for token `t`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Embedding {
    #[serde(with = "crate::persistence::array2")]
    pub weight: Array2<f64>,
    pub vocab_size: usize,
    pub embedding_dim: usize,
}

impl Embedding {
    pub fn with_rng<R: Rng + ?Sized>(vocab_size: usize, embedding_dim: usize, rng: &mut R) -> Self {
        // N(0, 1) like most framework defaults
        let weight = Array2::random_using((embedding_dim, vocab_size), StandardNormal, rng);

        Embedding { weight, vocab_size, embedding_dim }
    }

    fn check_token(&self, token: usize) -> Result<()> {
        if token >= self.vocab_size {
            return Err(RnnError::TokenOutOfRange { token, vocab_size: self.vocab_size });
        }
        Ok(())
    }

    /// Look up one token per time step, producing (embedding_dim, 1) inputs.
    pub fn embed_sequence(&self, tokens: &[usize]) -> Result<Vec<Array2<f64>>> {
        tokens
            .iter()
            .map(|&token| {
                self.check_token(token)?;
                Ok(self.weight.column(token).to_owned().insert_axis(ndarray::Axis(1)))
            })
            .collect()
    }

    /// Scatter per-step input gradients back onto the rows they were read from.
    pub fn backward(&self, tokens: &[usize], d_inputs: &[Array2<f64>]) -> Array2<f64> {
        let mut gradient = Array2::zeros(self.weight.raw_dim());
        for (&token, d_input) in tokens.iter().zip(d_inputs) {
            let mut column = gradient.column_mut(token);
            column += &d_input.column(0);
        }
        gradient
    }

    pub fn update_parameters<O: Optimizer>(
        &mut self,
        gradient: &Array2<f64>,
        optimizer: &mut O,
        prefix: &str,
    ) {
        optimizer.update(&format!("{}_embedding", prefix), &mut self.weight, gradient);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_embed_sequence_reads_columns() {
        let embedding = Embedding::with_rng(5, 3, &mut StdRng::seed_from_u64(3));
        let inputs = embedding.embed_sequence(&[4, 0, 4]).unwrap();

        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs[0].shape(), &[3, 1]);
        assert_eq!(inputs[0].column(0), embedding.weight.column(4));
        assert_eq!(inputs[0], inputs[2]);
    }

    #[test]
    fn test_embed_rejects_unknown_token() {
        let embedding = Embedding::with_rng(5, 3, &mut StdRng::seed_from_u64(3));
        assert!(matches!(
            embedding.embed_sequence(&[1, 5]),
            Err(RnnError::TokenOutOfRange { token: 5, vocab_size: 5 })
        ));
    }

    #[test]
    fn test_backward_accumulates_repeated_tokens() {
        let embedding = Embedding::with_rng(4, 2, &mut StdRng::seed_from_u64(3));
        let d_inputs = vec![Array2::ones((2, 1)), Array2::ones((2, 1)), Array2::from_elem((2, 1), 2.0)];

        let gradient = embedding.backward(&[1, 1, 3], &d_inputs);
        assert_eq!(gradient[[0, 1]], 2.0);
        assert_eq!(gradient[[1, 3]], 2.0);
        assert_eq!(gradient.column(0).sum(), 0.0);
    }
}
