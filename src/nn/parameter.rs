//! Trainable parameter with an accumulated gradient

use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A weight matrix and the gradient accumulated since the last `zero_grad`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub value: Array2<f64>,
    #[serde(skip)]
    grad: Option<Array2<f64>>,
}

impl Parameter {
    pub fn new(value: Array2<f64>) -> Self {
        Self { value, grad: None }
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::new(Array2::zeros((rows, cols)))
    }

    /// Xavier/Glorot uniform initialization
    pub fn glorot<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (rows + cols).max(1) as f64).sqrt();
        Self::new(Array2::random_using(
            (rows, cols),
            Uniform::new(-limit, limit),
            rng,
        ))
    }

    pub fn dim(&self) -> (usize, usize) {
        self.value.dim()
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn grad(&self) -> Option<&Array2<f64>> {
        self.grad.as_ref()
    }

    /// Add `g` to the stored gradient
    pub fn accumulate(&mut self, g: &Array2<f64>) {
        match self.grad.as_mut() {
            Some(grad) => *grad += g,
            None => self.grad = Some(g.clone()),
        }
    }

    pub fn zero_grad(&mut self) {
        self.grad = None;
    }
}
