//! Utility functions for the gate nonlinearities.

/// Sigmoid activation function: σ(x) = 1 / (1 + e^(-x))
///
/// Only ever exponentiates a non-positive number, so large magnitudes
/// saturate instead of overflowing.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-10);
        assert!(sigmoid(1000.0) > 0.99);
        assert!(sigmoid(-1000.0) < 0.01);
        assert!(sigmoid(-1000.0) >= 0.0);
        assert!(sigmoid(f64::MAX).is_finite());
        assert!(sigmoid(f64::MIN).is_finite());
    }

    #[test]
    fn test_sigmoid_is_symmetric() {
        for &x in &[0.3, 1.7, 5.0, 20.0] {
            assert!((sigmoid(x) + sigmoid(-x) - 1.0).abs() < 1e-12);
        }
    }
}
