//! Fully connected layer: `y = x W + b`

use ndarray::{Array2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::Parameter;
use crate::error::{Error, Result};

/// Dense layer with cached input for backpropagation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Linear {
    /// Weight matrix (input_size x output_size)
    pub weight: Parameter,
    /// Bias row (1 x output_size)
    pub bias: Parameter,
    #[serde(skip)]
    last_input: Option<Array2<f64>>,
}

impl Linear {
    pub fn new<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        Self {
            weight: Parameter::glorot(input_size, output_size, rng),
            bias: Parameter::zeros(1, output_size),
            last_input: None,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weight.dim().0
    }

    pub fn output_size(&self) -> usize {
        self.weight.dim().1
    }

    /// Forward pass; caches `x` for the next `backward`
    pub fn forward(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.input_size() {
            return Err(Error::shape(
                format!("{} input columns", self.input_size()),
                format!("{} columns", x.ncols()),
            ));
        }
        let mut out = x.dot(&self.weight.value);
        out += &self.bias.value;
        self.last_input = Some(x.clone());
        Ok(out)
    }

    /// Accumulate weight/bias gradients and return the input gradient
    pub fn backward(&mut self, grad_output: &Array2<f64>) -> Result<Array2<f64>> {
        let input = self
            .last_input
            .take()
            .ok_or_else(|| Error::Model("Linear::backward called before forward".to_string()))?;

        self.weight.accumulate(&input.t().dot(grad_output));
        self.bias
            .accumulate(&grad_output.sum_axis(Axis(0)).insert_axis(Axis(0)));

        Ok(grad_output.dot(&self.weight.value.t()))
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.weight, &mut self.bias]
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}
