//! Mini-batches of graphs as one disjoint graph

use std::ops::Range;

use ndarray::{s, Array2};

use super::{JetGraph, SparseGraph};
use crate::error::{Error, Result};

/// Several jet graphs stacked into one block-diagonal graph
#[derive(Debug, Clone)]
pub struct GraphBatch {
    /// Stacked node features, shape (total_nodes, features)
    pub x: Array2<f64>,
    /// Static edges with node ids offset per graph
    pub edges: SparseGraph,
    /// Node range of each graph inside `x`
    pub segments: Vec<Range<usize>>,
    /// Class index of each graph
    pub labels: Vec<usize>,
}

impl GraphBatch {
    pub fn from_graphs(graphs: &[&JetGraph]) -> Result<Self> {
        if graphs.is_empty() {
            return Err(Error::EmptyDataset("cannot batch zero graphs".to_string()));
        }

        let total: usize = graphs.iter().map(|g| g.num_nodes()).sum();
        let width = graphs[0].x.ncols();
        let mut x = Array2::zeros((total, width));
        let mut edges = SparseGraph::new(0);
        let mut segments = Vec::with_capacity(graphs.len());
        let mut labels = Vec::with_capacity(graphs.len());

        let mut offset = 0;
        for graph in graphs {
            let n = graph.num_nodes();
            if graph.x.ncols() != width {
                return Err(Error::shape(
                    format!("{} node features", width),
                    format!("{} node features", graph.x.ncols()),
                ));
            }
            if graph.edges.num_nodes() != n {
                return Err(Error::shape(
                    format!("edge set over {} nodes", n),
                    format!("{} nodes", graph.edges.num_nodes()),
                ));
            }
            x.slice_mut(s![offset..offset + n, ..]).assign(&graph.x);
            edges.append(&graph.edges);
            segments.push(offset..offset + n);
            labels.push(graph.label.index());
            offset += n;
        }

        Ok(Self {
            x,
            edges,
            segments,
            labels,
        })
    }

    /// Batch a subset of `graphs` selected by index
    pub fn select(graphs: &[JetGraph], indices: &[usize]) -> Result<Self> {
        let chosen: Vec<&JetGraph> = indices
            .iter()
            .map(|&i| {
                graphs.get(i).ok_or_else(|| {
                    Error::shape(format!("index < {}", graphs.len()), i.to_string())
                })
            })
            .collect::<Result<_>>()?;
        Self::from_graphs(&chosen)
    }

    pub fn num_graphs(&self) -> usize {
        self.segments.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.x.nrows()
    }
}
