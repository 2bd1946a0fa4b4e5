//! k-nearest-neighbour graph construction in feature space

use std::ops::Range;

use ndarray::ArrayView2;
use ordered_float::OrderedFloat;

use super::SparseGraph;

/// Squared Euclidean distance between rows `i` and `j`
fn squared_distance(x: &ArrayView2<f64>, i: usize, j: usize) -> f64 {
    x.row(i)
        .iter()
        .zip(x.row(j).iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum()
}

/// Build a directed k-NN graph over the rows of `x`
///
/// Neighbours are searched only inside each segment, so a batch of
/// disjoint graphs never gets cross-graph edges. Every node receives edges
/// from its `min(k, segment_len - 1)` closest nodes, never from itself.
/// Ties are broken by the lower node index.
pub fn knn_graph(x: ArrayView2<f64>, k: usize, segments: &[Range<usize>]) -> SparseGraph {
    let mut lists = vec![Vec::new(); x.nrows()];

    for segment in segments {
        let len = segment.len();
        let take = k.min(len.saturating_sub(1));
        if take == 0 {
            continue;
        }

        for i in segment.clone() {
            let mut candidates: Vec<(OrderedFloat<f64>, usize)> = segment
                .clone()
                .filter(|&j| j != i)
                .map(|j| (OrderedFloat(squared_distance(&x, i, j)), j))
                .collect();

            if take < candidates.len() {
                candidates.select_nth_unstable(take - 1);
                candidates.truncate(take);
            }
            candidates.sort_unstable();

            lists[i] = candidates.into_iter().map(|(_, j)| j).collect();
        }
    }

    SparseGraph::from_neighbor_lists(&lists)
}

/// k-NN graph of a single point cloud
pub fn knn_single(x: ArrayView2<f64>, k: usize) -> SparseGraph {
    let n = x.nrows();
    knn_graph(x, k, &[0..n])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_line_neighbours() {
        let x = array![[0.0], [1.0], [3.0], [6.0]];
        let graph = knn_single(x.view(), 1);

        assert_eq!(graph.neighbors(0), &[1]);
        assert_eq!(graph.neighbors(1), &[0]);
        assert_eq!(graph.neighbors(2), &[1]);
        assert_eq!(graph.neighbors(3), &[2]);
    }

    #[test]
    fn test_edge_count_and_no_self_loops() {
        let x = Array2::from_shape_fn((10, 4), |(i, j)| ((i * 7 + j * 3) % 11) as f64);
        let graph = knn_single(x.view(), 3);

        assert_eq!(graph.num_edges(), 10 * 3);
        assert!(!graph.has_self_loops());
        for i in 0..10 {
            assert_eq!(graph.degree(i), 3);
        }
    }

    #[test]
    fn test_k_capped_by_graph_size() {
        let x = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let graph = knn_single(x.view(), 8);
        assert_eq!(graph.num_edges(), 3 * 2);
    }

    #[test]
    fn test_single_node_has_no_edges() {
        let x = array![[1.0, 2.0]];
        let graph = knn_single(x.view(), 4);
        assert_eq!(graph.num_nodes(), 1);
        assert_eq!(graph.num_edges(), 0);
    }

    #[test]
    fn test_ties_prefer_lower_index() {
        let x = array![[0.0], [1.0], [-1.0]];
        let graph = knn_single(x.view(), 1);
        assert_eq!(graph.neighbors(0), &[1]);
    }

    #[test]
    fn test_segments_stay_disjoint() {
        let x = array![[0.0], [0.1], [0.2], [0.15]];
        let graph = knn_graph(x.view(), 2, &[0..2, 2..4]);

        assert_eq!(graph.neighbors(1), &[0]);
        assert_eq!(graph.neighbors(2), &[3]);
        assert_eq!(graph.num_edges(), 4);
    }
}
