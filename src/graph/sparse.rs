//! Sparse graph representation using CSR format
//!
//! Row `i` lists the source nodes whose messages node `i` receives, which is
//! the orientation message passing consumes directly.

use serde::{Deserialize, Serialize};

/// Compressed Sparse Row (CSR) directed graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseGraph {
    /// Number of nodes
    n_nodes: usize,
    /// indptr[i]..indptr[i+1] is the incoming-edge range of node i
    indptr: Vec<usize>,
    /// Source node of each edge
    indices: Vec<usize>,
}

impl SparseGraph {
    /// Graph with nodes but no edges
    pub fn new(n_nodes: usize) -> Self {
        Self {
            n_nodes,
            indptr: vec![0; n_nodes + 1],
            indices: Vec::new(),
        }
    }

    /// Build from per-node neighbour lists
    pub fn from_neighbor_lists(lists: &[Vec<usize>]) -> Self {
        let mut indptr = Vec::with_capacity(lists.len() + 1);
        let mut indices = Vec::with_capacity(lists.iter().map(Vec::len).sum());
        indptr.push(0);
        for list in lists {
            indices.extend_from_slice(list);
            indptr.push(indices.len());
        }
        Self {
            n_nodes: lists.len(),
            indptr,
            indices,
        }
    }

    /// Build from `(source, target)` pairs
    pub fn from_edges(n_nodes: usize, edges: &[(usize, usize)]) -> Self {
        let mut lists = vec![Vec::new(); n_nodes];
        for &(src, dst) in edges {
            lists[dst].push(src);
        }
        Self::from_neighbor_lists(&lists)
    }

    /// Get number of nodes
    pub fn num_nodes(&self) -> usize {
        self.n_nodes
    }

    /// Get number of edges
    pub fn num_edges(&self) -> usize {
        self.indices.len()
    }

    /// Source nodes aggregated by `node`
    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.indices[self.indptr[node]..self.indptr[node + 1]]
    }

    /// Range of `node`'s incoming edges in global edge numbering
    pub fn edge_range(&self, node: usize) -> std::ops::Range<usize> {
        self.indptr[node]..self.indptr[node + 1]
    }

    /// In-degree of a node
    pub fn degree(&self, node: usize) -> usize {
        self.indptr[node + 1] - self.indptr[node]
    }

    pub fn has_self_loops(&self) -> bool {
        (0..self.n_nodes).any(|i| self.neighbors(i).contains(&i))
    }

    /// Iterate `(source, target)` pairs in CSR order
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.n_nodes).flat_map(move |dst| self.neighbors(dst).iter().map(move |&src| (src, dst)))
    }

    /// Copy with a self-loop appended to every node's neighbour list
    pub fn with_self_loops(&self) -> Self {
        let lists: Vec<Vec<usize>> = (0..self.n_nodes)
            .map(|i| {
                let mut list = self.neighbors(i).to_vec();
                if !list.contains(&i) {
                    list.push(i);
                }
                list
            })
            .collect();
        Self::from_neighbor_lists(&lists)
    }

    /// Disjoint union: node ids of `other` are shifted past this graph's
    pub fn append(&mut self, other: &SparseGraph) {
        let offset = self.n_nodes;
        let base = self.indices.len();
        self.indices
            .extend(other.indices.iter().map(|&src| src + offset));
        self.indptr
            .extend(other.indptr[1..].iter().map(|&p| p + base));
        self.n_nodes += other.n_nodes;
    }
}
