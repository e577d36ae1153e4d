use ndarray::Array2;
use thiserror::Error;

/// Errors raised by cells, sequence drivers and models.
#[derive(Error, Debug, Clone)]
pub enum RnnError {
    #[error("shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("sequence must contain at least one step")]
    EmptySequence,

    #[error("length mismatch in {context}: expected {expected}, got {actual}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("token {token} is outside the vocabulary of size {vocab_size}")]
    TokenOutOfRange { token: usize, vocab_size: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("ndarray error: {0}")]
    Ndarray(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, RnnError>;

/// Fails unless `array` has exactly `rows` x `cols` elements.
pub(crate) fn ensure_shape(
    context: &'static str,
    array: &Array2<f64>,
    rows: usize,
    cols: usize,
) -> Result<()> {
    if array.dim() != (rows, cols) {
        return Err(RnnError::ShapeMismatch {
            context,
            expected: vec![rows, cols],
            actual: array.shape().to_vec(),
        });
    }
    Ok(())
}

/// Fails unless `array` has `rows` rows; returns its column (batch) count.
pub(crate) fn ensure_rows(
    context: &'static str,
    array: &Array2<f64>,
    rows: usize,
) -> Result<usize> {
    if array.nrows() != rows {
        return Err(RnnError::ShapeMismatch {
            context,
            expected: vec![rows, array.ncols()],
            actual: array.shape().to_vec(),
        });
    }
    Ok(array.ncols())
}
