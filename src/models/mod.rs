/// Stacked and bidirectional recurrent networks.
pub mod recurrent_network;

/// Recurrent network plus linear head.
pub mod sequence_model;

/// Embedding-based binary text classifier.
pub mod text_classifier;
