/// Per-gate parameters shared by every cell.
pub mod gate;

/// The cell trait used by the sequence driver.
pub mod recurrent;

/// LSTM cell.
pub mod lstm_cell;

/// GRU cell.
pub mod gru_cell;

/// Unidirectional and reversed passes over a sequence.
pub mod sequence_runner;

/// Affine readout layer.
pub mod linear;

/// Token lookup table.
pub mod embedding;
