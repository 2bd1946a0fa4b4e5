//! Graph data structures and builders
//!
//! Jets become k-nearest-neighbour graphs over their particles; batches of
//! graphs are stacked into one block-diagonal graph for the models.

mod batch;
mod builder;
mod knn;
mod sparse;

pub use batch::GraphBatch;
pub use builder::{GraphBuilder, GraphConfig, JetGraph};
pub use knn::{knn_graph, knn_single};
pub use sparse::SparseGraph;
