//! Neural network building blocks
//!
//! Every layer caches what its backward pass needs during `forward` and
//! accumulates parameter gradients during `backward`:
//! - `Parameter` values with accumulated gradients
//! - Activation functions and derivatives
//! - Dense layers
//! - Global graph pooling
//! - Softmax cross-entropy
//! - SGD and Adam optimizers

mod activation;
mod linear;
mod loss;
mod optimizer;
mod parameter;
mod pooling;

pub use activation::{
    elu, leaky_relu, leaky_relu_derivative, relu, ActivationType, ATTENTION_NEGATIVE_SLOPE,
};
pub use linear::Linear;
pub use loss::{argmax_rows, class_probability, softmax, softmax_cross_entropy};
pub use optimizer::{Adam, Optimizer, Sgd};
pub use parameter::Parameter;
pub use pooling::{max_pool, max_pool_backward, mean_pool, mean_pool_backward};
