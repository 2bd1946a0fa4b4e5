//! Activation functions and their derivatives

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// Negative slope used by the attention logits
pub const ATTENTION_NEGATIVE_SLOPE: f64 = 0.2;

/// Types of activation functions available
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActivationType {
    /// max(0, x)
    ReLU,
    /// x for x > 0, alpha * (exp(x) - 1) otherwise
    ELU,
    /// max(slope * x, x)
    LeakyReLU,
    /// Identity
    Linear,
}

impl ActivationType {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            ActivationType::ReLU => relu(x),
            ActivationType::ELU => elu(x, 1.0),
            ActivationType::LeakyReLU => leaky_relu(x, ATTENTION_NEGATIVE_SLOPE),
            ActivationType::Linear => x,
        }
    }

    /// Derivative evaluated at the pre-activation `x`
    pub fn derivative(self, x: f64) -> f64 {
        match self {
            ActivationType::ReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            ActivationType::ELU => {
                if x > 0.0 {
                    1.0
                } else {
                    x.exp()
                }
            }
            ActivationType::LeakyReLU => leaky_relu_derivative(x, ATTENTION_NEGATIVE_SLOPE),
            ActivationType::Linear => 1.0,
        }
    }

    /// Apply to a whole batch
    pub fn forward_batch(self, x: &Array2<f64>) -> Array2<f64> {
        x.mapv(|v| self.apply(v))
    }

    /// Chain rule: `grad * f'(pre_activation)`
    pub fn backward_batch(self, pre_activation: &Array2<f64>, grad: &Array2<f64>) -> Array2<f64> {
        let mut out = grad.clone();
        Zip::from(&mut out)
            .and(pre_activation)
            .for_each(|g, &x| *g *= self.derivative(x));
        out
    }
}

/// Rectified linear unit
pub fn relu(x: f64) -> f64 {
    x.max(0.0)
}

/// ELU activation
pub fn elu(x: f64, alpha: f64) -> f64 {
    if x >= 0.0 {
        x
    } else {
        alpha * (x.exp() - 1.0)
    }
}

/// LeakyReLU activation
pub fn leaky_relu(x: f64, negative_slope: f64) -> f64 {
    if x >= 0.0 {
        x
    } else {
        negative_slope * x
    }
}

pub fn leaky_relu_derivative(x: f64, negative_slope: f64) -> f64 {
    if x >= 0.0 {
        1.0
    } else {
        negative_slope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_leaky_relu() {
        assert_eq!(leaky_relu(1.0, 0.2), 1.0);
        assert_eq!(leaky_relu(-1.0, 0.2), -0.2);
        assert_eq!(leaky_relu(0.0, 0.2), 0.0);
    }

    #[test]
    fn test_elu() {
        assert_eq!(elu(2.0, 1.0), 2.0);
        assert_relative_eq!(elu(-1.0, 1.0), (-1.0f64).exp() - 1.0);
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let h = 1e-6;
        for kind in [ActivationType::ELU, ActivationType::LeakyReLU, ActivationType::ReLU] {
            for x in [-1.3, -0.2, 0.4, 2.1] {
                let numeric = (kind.apply(x + h) - kind.apply(x - h)) / (2.0 * h);
                assert_relative_eq!(kind.derivative(x), numeric, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_backward_batch() {
        let pre = array![[-1.0, 2.0]];
        let grad = array![[3.0, 3.0]];
        let out = ActivationType::ReLU.backward_batch(&pre, &grad);
        assert_eq!(out, array![[0.0, 3.0]]);
    }
}
