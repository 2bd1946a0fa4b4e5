//! Global graph pooling over node segments
//!
//! Each segment is the node range of one graph in a batch; pooling turns
//! `(total_nodes, features)` into `(num_graphs, features)`.

use std::ops::Range;

use ndarray::{Array1, Array2, Axis};

/// Average of the node features of every graph
pub fn mean_pool(x: &Array2<f64>, segments: &[Range<usize>]) -> Array2<f64> {
    let mut out = Array2::zeros((segments.len(), x.ncols()));
    for (g, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        let rows = x.slice_axis(Axis(0), segment.clone().into());
        let mean: Array1<f64> = rows.sum_axis(Axis(0)) / segment.len() as f64;
        out.row_mut(g).assign(&mean);
    }
    out
}

/// Spread the pooled gradient evenly back onto each graph's nodes
pub fn mean_pool_backward(
    grad: &Array2<f64>,
    segments: &[Range<usize>],
    num_nodes: usize,
) -> Array2<f64> {
    let mut out = Array2::zeros((num_nodes, grad.ncols()));
    for (g, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        let share = grad.row(g).mapv(|v| v / segment.len() as f64);
        for i in segment.clone() {
            out.row_mut(i).assign(&share);
        }
    }
    out
}

/// Channel-wise maximum per graph, with the winning node of each channel
///
/// Returns the pooled features and `argmax[[g, c]]`, the node index that
/// produced channel `c` of graph `g`.
pub fn max_pool(x: &Array2<f64>, segments: &[Range<usize>]) -> (Array2<f64>, Array2<usize>) {
    let channels = x.ncols();
    let mut out = Array2::zeros((segments.len(), channels));
    let mut argmax = Array2::zeros((segments.len(), channels));

    for (g, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        for c in 0..channels {
            let mut best = segment.start;
            for i in segment.clone() {
                if x[[i, c]] > x[[best, c]] {
                    best = i;
                }
            }
            out[[g, c]] = x[[best, c]];
            argmax[[g, c]] = best;
        }
    }

    (out, argmax)
}

/// Route the pooled gradient to the node that won each channel
pub fn max_pool_backward(
    grad: &Array2<f64>,
    argmax: &Array2<usize>,
    segments: &[Range<usize>],
    num_nodes: usize,
) -> Array2<f64> {
    let mut out = Array2::zeros((num_nodes, grad.ncols()));
    for (g, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        for c in 0..grad.ncols() {
            out[[argmax[[g, c]], c]] += grad[[g, c]];
        }
    }
    out
}
