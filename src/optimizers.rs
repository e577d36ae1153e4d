use ndarray::Array2;
use std::collections::HashMap;

/// Optimizer trait for parameter updates during training
///
/// Parameters are identified by a stable string id so stateful optimizers
/// can keep per-parameter moments.
pub trait Optimizer {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>);
    fn reset(&mut self);
}

/// Arithmetic shared by every gradient container (cells, heads, models).
pub trait GradientSet: Sized {
    /// A container of the same shapes filled with zeros.
    fn zeros_like(&self) -> Self;
    /// Element-wise `self += other`.
    fn accumulate(&mut self, other: &Self);
    /// Multiply every element by `factor`.
    fn scale(&mut self, factor: f64);
    /// Sum of squares over every element.
    fn squared_norm(&self) -> f64;
}

impl GradientSet for Array2<f64> {
    fn zeros_like(&self) -> Self {
        Array2::zeros(self.raw_dim())
    }

    fn accumulate(&mut self, other: &Self) {
        *self += other;
    }

    fn scale(&mut self, factor: f64) {
        self.mapv_inplace(|x| x * factor);
    }

    fn squared_norm(&self) -> f64 {
        self.iter().map(|x| x * x).sum()
    }
}

/// Rescale `gradients` so their global L2 norm is at most `max_norm`.
///
/// Returns the norm before clipping.
pub fn clip_by_global_norm<G: GradientSet>(gradients: &mut G, max_norm: f64) -> f64 {
    let norm = gradients.squared_norm().sqrt();
    if norm > max_norm && norm > 0.0 {
        gradients.scale(max_norm / norm);
    }
    norm
}

/// Stochastic Gradient Descent: θ = θ - η∇θ
pub struct SGD {
    learning_rate: f64,
}

impl SGD {
    pub fn new(learning_rate: f64) -> Self {
        SGD { learning_rate }
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        param.scaled_add(-self.learning_rate, gradient);
    }

    fn reset(&mut self) {}
}

struct AdamMoments {
    step: i32,
    m: Array2<f64>,
    v: Array2<f64>,
}

/// Adam optimizer with adaptive learning rates
///
/// Implements: m_t = β₁m_{t-1} + (1-β₁)g_t
///             v_t = β₂v_{t-1} + (1-β₂)g_t²
///             θ_t = θ_{t-1} - η * m̂_t / (√v̂_t + ε)
/// where m̂_t and v̂_t are bias-corrected with each parameter's own step count.
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    moments: HashMap<String, AdamMoments>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Adam::with_params(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub fn with_params(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            moments: HashMap::new(),
        }
    }
}

impl Optimizer for Adam {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        let state = self
            .moments
            .entry(param_id.to_string())
            .or_insert_with(|| AdamMoments {
                step: 0,
                m: Array2::zeros(param.raw_dim()),
                v: Array2::zeros(param.raw_dim()),
            });
        state.step += 1;

        let (beta1, beta2) = (self.beta1, self.beta2);
        state.m.zip_mut_with(gradient, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
        state.v.zip_mut_with(gradient, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);

        let m_correction = 1.0 - beta1.powi(state.step);
        let v_correction = 1.0 - beta2.powi(state.step);
        let (lr, eps) = (self.learning_rate, self.epsilon);

        ndarray::Zip::from(param)
            .and(&state.m)
            .and(&state.v)
            .for_each(|p, &m, &v| {
                let m_hat = m / m_correction;
                let v_hat = v / v_correction;
                *p -= lr * m_hat / (v_hat.sqrt() + eps);
            });
    }

    fn reset(&mut self) {
        self.moments.clear();
    }
}

/// RMSprop: v_t = αv_{t-1} + (1-α)g_t²
///          θ_t = θ_{t-1} - η * g_t / (√v_t + ε)
pub struct RMSprop {
    learning_rate: f64,
    alpha: f64,
    epsilon: f64,
    v: HashMap<String, Array2<f64>>,
}

impl RMSprop {
    pub fn new(learning_rate: f64) -> Self {
        RMSprop::with_params(learning_rate, 0.99, 1e-8)
    }

    pub fn with_params(learning_rate: f64, alpha: f64, epsilon: f64) -> Self {
        RMSprop {
            learning_rate,
            alpha,
            epsilon,
            v: HashMap::new(),
        }
    }
}

impl Optimizer for RMSprop {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        let v_t = self
            .v
            .entry(param_id.to_string())
            .or_insert_with(|| Array2::zeros(param.raw_dim()));

        let alpha = self.alpha;
        v_t.zip_mut_with(gradient, |v, &g| *v = alpha * *v + (1.0 - alpha) * g * g);

        let (lr, eps) = (self.learning_rate, self.epsilon);
        ndarray::Zip::from(param)
            .and(gradient)
            .and(&*v_t)
            .for_each(|p, &g, &v| *p -= lr * g / (v.sqrt() + eps));
    }

    fn reset(&mut self) {
        self.v.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_sgd_optimizer() {
        let mut optimizer = SGD::new(0.1);
        let mut param = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let gradient = arr2(&[[0.1, 0.2], [0.3, 0.4]]);

        let original_param = param.clone();
        optimizer.update("test_param", &mut param, &gradient);

        let expected = &original_param - 0.1 * &gradient;
        assert!((param - expected).map(|x| x.abs()).sum() < 1e-10);
    }

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        let mut optimizer = Adam::new(0.001);
        let mut param = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let gradient = arr2(&[[0.1, -0.2], [0.3, 0.4]]);

        let original_param = param.clone();
        optimizer.update("test_param", &mut param, &gradient);

        // With bias correction the first step is ~lr * sign(g).
        let delta = &original_param - &param;
        for (d, g) in delta.iter().zip(gradient.iter()) {
            assert!((d - 0.001 * g.signum()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_adam_tracks_parameters_independently() {
        let mut optimizer = Adam::new(0.01);
        let mut a = arr2(&[[0.0]]);
        let mut b = arr2(&[[0.0]]);
        let gradient = arr2(&[[1.0]]);

        optimizer.update("a", &mut a, &gradient);
        optimizer.update("a", &mut a, &gradient);
        optimizer.update("b", &mut b, &gradient);

        // "b" sees its own first step, not the third global one.
        assert!((b[[0, 0]] + 0.01).abs() < 1e-6);
        assert!(a[[0, 0]] < b[[0, 0]]);
    }

    #[test]
    fn test_rmsprop_optimizer() {
        let mut optimizer = RMSprop::new(0.01);
        let mut param = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let gradient = arr2(&[[0.1, 0.2], [0.3, 0.4]]);

        let original_param = param.clone();
        optimizer.update("test_param", &mut param, &gradient);

        assert!((param - original_param).map(|x| x.abs()).sum() > 1e-10);
    }

    #[test]
    fn test_clip_by_global_norm() {
        let mut gradient = arr2(&[[3.0, 4.0]]);
        let norm = clip_by_global_norm(&mut gradient, 1.0);
        assert!((norm - 5.0).abs() < 1e-12);
        assert!((gradient.squared_norm().sqrt() - 1.0).abs() < 1e-12);

        let mut small = arr2(&[[0.1, 0.1]]);
        clip_by_global_norm(&mut small, 1.0);
        assert_eq!(small, arr2(&[[0.1, 0.1]]));
    }
}
