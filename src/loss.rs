use ndarray::Array2;

use crate::utils::sigmoid;

/// Loss function trait for training recurrent models
///
/// Predictions and targets are (output_size, batch) matrices of equal shape.
/// Losses are averaged over every element so batch size does not change the
/// learning rate scale.
pub trait LossFunction {
    /// Compute the loss between predictions and targets
    fn compute_loss(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> f64;

    /// Compute the gradient of the loss with respect to predictions
    fn compute_gradient(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64>;
}

/// Mean Squared Error loss function
#[derive(Clone, Copy, Debug, Default)]
pub struct MSELoss;

impl LossFunction for MSELoss {
    fn compute_loss(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> f64 {
        let diff = predictions - targets;
        let squared_diff = &diff * &diff;
        squared_diff.sum() / (predictions.len() as f64)
    }

    fn compute_gradient(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64> {
        let diff = predictions - targets;
        2.0 * diff / (predictions.len() as f64)
    }
}

/// Mean Absolute Error loss function
#[derive(Clone, Copy, Debug, Default)]
pub struct MAELoss;

impl LossFunction for MAELoss {
    fn compute_loss(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> f64 {
        let diff = predictions - targets;
        diff.mapv(f64::abs).sum() / (predictions.len() as f64)
    }

    fn compute_gradient(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64> {
        let diff = predictions - targets;
        diff.mapv(|x| if x > 0.0 { 1.0 } else if x < 0.0 { -1.0 } else { 0.0 }) / (predictions.len() as f64)
    }
}

/// Binary cross-entropy on raw logits, with targets in [0, 1]
///
/// Uses `max(z, 0) - z·y + ln(1 + e^-|z|)`, which stays finite for any logit.
#[derive(Clone, Copy, Debug, Default)]
pub struct BCEWithLogitsLoss;

impl LossFunction for BCEWithLogitsLoss {
    fn compute_loss(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> f64 {
        let total: f64 = predictions
            .iter()
            .zip(targets.iter())
            .map(|(&z, &y)| z.max(0.0) - z * y + (-z.abs()).exp().ln_1p())
            .sum();
        total / (predictions.len() as f64)
    }

    fn compute_gradient(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64> {
        (predictions.mapv(sigmoid) - targets) / (predictions.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_mse_loss() {
        let loss_fn = MSELoss;
        let predictions = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let targets = arr2(&[[1.5, 2.5], [2.5, 3.5]]);

        let loss = loss_fn.compute_loss(&predictions, &targets);
        assert!((loss - 0.25).abs() < 1e-6);

        let gradient = loss_fn.compute_gradient(&predictions, &targets);
        assert_eq!(gradient, arr2(&[[-0.25, -0.25], [0.25, 0.25]]));
    }

    #[test]
    fn test_mae_loss() {
        let loss_fn = MAELoss;
        let predictions = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let targets = arr2(&[[1.5, 2.5], [2.5, 3.5]]);

        let loss = loss_fn.compute_loss(&predictions, &targets);
        assert!((loss - 0.5).abs() < 1e-6);

        let gradient = loss_fn.compute_gradient(&predictions, &targets);
        assert_eq!(gradient.shape(), predictions.shape());
    }

    #[test]
    fn test_bce_with_logits_matches_naive_formula() {
        let loss_fn = BCEWithLogitsLoss;
        let predictions = arr2(&[[0.3, -1.2]]);
        let targets = arr2(&[[1.0, 0.0]]);

        let naive: f64 = predictions
            .iter()
            .zip(targets.iter())
            .map(|(&z, &y): (&f64, &f64)| {
                let p = 1.0 / (1.0 + (-z).exp());
                -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
            })
            .sum::<f64>()
            / 2.0;

        assert!((loss_fn.compute_loss(&predictions, &targets) - naive).abs() < 1e-12);
    }

    #[test]
    fn test_bce_with_logits_is_stable_for_large_logits() {
        let loss_fn = BCEWithLogitsLoss;
        let predictions = arr2(&[[1000.0, -1000.0]]);

        let confident_right = loss_fn.compute_loss(&predictions, &arr2(&[[1.0, 0.0]]));
        assert!(confident_right.is_finite() && confident_right < 1e-12);

        let confident_wrong = loss_fn.compute_loss(&predictions, &arr2(&[[0.0, 1.0]]));
        assert!((confident_wrong - 1000.0).abs() < 1e-9);

        let gradient = loss_fn.compute_gradient(&predictions, &arr2(&[[0.0, 1.0]]));
        assert!(gradient.iter().all(|g| g.is_finite()));
    }
}
