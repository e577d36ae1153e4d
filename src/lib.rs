//! # gated-rnn
//!
//! Hand-written LSTM and GRU cells with a pure forward pass, driven over
//! sequences in one or both directions and read out by a linear head.
//!
//! ## Core Components
//!
//! - **Cells**: `LSTMCell` and `GRUCell` compute one time step from explicit
//!   state and weights, failing fast on shape mismatches
//! - **Sequence runner**: threads state across steps left to right or right to left
//! - **Networks**: stacked, optionally bidirectional networks with a linear head
//! - **Training**: full BPTT, mini-batches stacked as columns, gradient clipping
//! - **Tasks**: binary counting and sine-wave generators with autoregressive forecasting
//!
//! ## Quick Start
//!
//! ```rust
//! use gated_rnn::{LSTMCell, LSTMState};
//! use ndarray::Array2;
//!
//! let cell = LSTMCell::new(3, 8);
//! let state = LSTMState::zeros(8, 1);
//! let x = Array2::ones((3, 1));
//!
//! let (h, c) = cell.forward(&x, &state.hidden, &state.cell).unwrap();
//! assert_eq!(h.shape(), &[8, 1]);
//! assert_eq!(c.shape(), &[8, 1]);
//!
//! // Wrong-sized inputs are rejected instead of broadcast
//! assert!(cell.forward(&Array2::ones((2, 1)), &h, &c).is_err());
//! ```

pub mod config;
pub mod error;
pub mod layers;
pub mod loss;
pub mod models;
pub mod optimizers;
pub mod persistence;
pub mod tasks;
pub mod training;
pub mod utils;

// Re-export commonly used items
pub use config::{ConfigError, ModelConfig, TrainingConfig};
pub use error::{Result, RnnError};
pub use layers::gru_cell::GRUCell;
pub use layers::linear::LinearLayer;
pub use layers::lstm_cell::{LSTMCell, LSTMState};
pub use layers::recurrent::RecurrentCell;
pub use layers::sequence_runner::{run_sequence, Direction};
pub use loss::{BCEWithLogitsLoss, LossFunction, MAELoss, MSELoss};
pub use models::recurrent_network::{CombineMode, GRUNetwork, LSTMNetwork, RecurrentNetwork};
pub use models::sequence_model::{OutputMode, SequenceModel};
pub use models::text_classifier::TextClassifier;
pub use optimizers::{Adam, Optimizer, RMSprop, SGD};
pub use persistence::{ModelMetadata, ModelPersistence, PersistenceError, PersistentModel};
pub use training::{SequenceTrainer, TrainingSample};
