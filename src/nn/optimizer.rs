//! Optimization Algorithms
//!
//! - SGD (Stochastic Gradient Descent) with optional momentum
//! - Adam (Adaptive Moment Estimation) with optional L2 weight decay
//!
//! State is kept per parameter position, so callers must pass the
//! parameters in the same order on every step.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::Parameter;

/// Optimizer trait for parameter updates
pub trait Optimizer: Send + Sync {
    /// Apply one update from the accumulated gradients
    fn step(&mut self, params: &mut [&mut Parameter]);

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, learning_rate: f64);

    /// Reset optimizer state (for new training run)
    fn reset(&mut self);
}

/// Stochastic Gradient Descent with optional momentum
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    #[serde(skip)]
    velocity: Vec<Array2<f64>>,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            momentum: 0.0,
            velocity: Vec::new(),
        }
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [&mut Parameter]) {
        if self.velocity.len() != params.len() {
            self.velocity = params.iter().map(|p| Array2::zeros(p.dim())).collect();
        }

        for (param, v) in params.iter_mut().zip(self.velocity.iter_mut()) {
            let Some(grad) = param.grad() else { continue };
            if self.momentum > 0.0 {
                *v = &*v * self.momentum - grad * self.learning_rate;
            } else {
                *v = grad * -self.learning_rate;
            }
            param.value += &*v;
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    fn reset(&mut self) {
        self.velocity.clear();
    }
}

/// Adam optimizer (Adaptive Moment Estimation)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub weight_decay: f64,
    #[serde(skip)]
    t: i32,
    #[serde(skip)]
    moments: Vec<(Array2<f64>, Array2<f64>)>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay: 0.0,
            t: 0,
            moments: Vec::new(),
        }
    }

    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn steps(&self) -> i32 {
        self.t
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [&mut Parameter]) {
        if self.moments.len() != params.len() {
            self.moments = params
                .iter()
                .map(|p| (Array2::zeros(p.dim()), Array2::zeros(p.dim())))
                .collect();
            self.t = 0;
        }
        self.t += 1;

        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);

        for (param, (m, v)) in params.iter_mut().zip(self.moments.iter_mut()) {
            let Some(grad) = param.grad() else { continue };
            let grad = if self.weight_decay > 0.0 {
                grad + &(&param.value * self.weight_decay)
            } else {
                grad.clone()
            };

            // Update biased first and second moment estimates
            *m = &*m * self.beta1 + &grad * (1.0 - self.beta1);
            *v = &*v * self.beta2 + &(&grad * &grad) * (1.0 - self.beta2);

            let m_hat = &*m / bias1;
            let v_hat = &*v / bias2;
            let update = &m_hat * self.learning_rate / &(v_hat.mapv(f64::sqrt) + self.epsilon);
            param.value -= &update;
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    fn reset(&mut self) {
        self.t = 0;
        self.moments.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param_with_grad(value: f64, grad: f64) -> Parameter {
        let mut p = Parameter::new(Array2::from_elem((3, 2), value));
        p.accumulate(&Array2::from_elem((3, 2), grad));
        p
    }

    #[test]
    fn test_sgd_update() {
        let mut optimizer = Sgd::new(0.01);
        let mut p = param_with_grad(1.0, 1.0);
        optimizer.step(&mut [&mut p]);

        assert!((p.value[[0, 0]] - 0.99).abs() < 1e-10);
    }

    #[test]
    fn test_sgd_momentum_accelerates() {
        let mut optimizer = Sgd::new(0.1).with_momentum(0.9);
        let mut p = param_with_grad(0.0, 1.0);
        optimizer.step(&mut [&mut p]);
        optimizer.step(&mut [&mut p]);
        // -0.1 then -0.19
        assert!((p.value[[0, 0]] + 0.29).abs() < 1e-10);
    }

    #[test]
    fn test_adam_update() {
        let mut optimizer = Adam::new(0.001);
        let mut p = param_with_grad(1.0, 1.0);

        for _ in 0..10 {
            optimizer.step(&mut [&mut p]);
        }

        assert!(p.value[[0, 0]] < 1.0);
        assert_eq!(optimizer.steps(), 10);
        // Constant gradients move each weight by ~lr per step
        assert!((p.value[[0, 0]] - (1.0 - 0.01)).abs() < 1e-6);
    }

    #[test]
    fn test_missing_gradient_is_skipped() {
        let mut optimizer = Adam::new(0.1);
        let mut p = Parameter::new(Array2::ones((2, 2)));
        optimizer.step(&mut [&mut p]);
        assert_eq!(p.value, Array2::<f64>::ones((2, 2)));
    }

    #[test]
    fn test_learning_rate_setter() {
        let mut optimizer: Box<dyn Optimizer> = Box::new(Adam::new(0.01));
        optimizer.set_learning_rate(0.005);
        assert_eq!(optimizer.learning_rate(), 0.005);
    }
}
