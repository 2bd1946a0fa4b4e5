//! Dynamic Graph CNN
//!
//! Every `EdgeConv` rebuilds the k-NN graph from its own input, so
//! neighbourhoods move through feature space as the representation
//! evolves. Edge features are `[x_i, x_j - x_i]`, passed through a small
//! MLP and max-aggregated over the neighbours of `i`.

use std::ops::Range;

use ndarray::{concatenate, s, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::GraphClassifier;
use crate::data::PARTICLE_FEATURES;
use crate::error::{Error, Result};
use crate::graph::{knn_graph, GraphBatch, SparseGraph};
use crate::nn::{
    max_pool, max_pool_backward, mean_pool, mean_pool_backward, ActivationType, Linear, Parameter,
};

#[derive(Debug, Clone)]
struct EdgeConvCache {
    graph: SparseGraph,
    pre_activations: Vec<Array2<f64>>,
    /// Edge that produced each (node, channel) maximum
    argmax: Array2<usize>,
}

/// Edge convolution with per-call k-NN recomputation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConv {
    in_features: usize,
    out_features: usize,
    k: usize,
    /// Linear + ReLU blocks applied to every edge feature
    mlp: Vec<Linear>,
    #[serde(skip)]
    cache: Option<EdgeConvCache>,
}

impl EdgeConv {
    pub fn new<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        k: usize,
        mlp_depth: usize,
        rng: &mut R,
    ) -> Self {
        let mut mlp = Vec::with_capacity(mlp_depth.max(1));
        mlp.push(Linear::new(2 * in_features, out_features, rng));
        for _ in 1..mlp_depth {
            mlp.push(Linear::new(out_features, out_features, rng));
        }

        Self {
            in_features,
            out_features,
            k,
            mlp,
            cache: None,
        }
    }

    pub fn output_dim(&self) -> usize {
        self.out_features
    }

    /// Graph built by the last forward pass
    pub fn last_graph(&self) -> Option<&SparseGraph> {
        self.cache.as_ref().map(|c| &c.graph)
    }

    pub fn forward(&mut self, x: &Array2<f64>, segments: &[Range<usize>]) -> Result<Array2<f64>> {
        let (n, d) = x.dim();
        if d != self.in_features {
            return Err(Error::shape(
                format!("{} input features", self.in_features),
                format!("{}", d),
            ));
        }

        let graph = knn_graph(x.view(), self.k, segments);

        let mut edge_features = Array2::<f64>::zeros((graph.num_edges(), 2 * d));
        for (e, (j, i)) in graph.edges().enumerate() {
            for c in 0..d {
                edge_features[[e, c]] = x[[i, c]];
                edge_features[[e, d + c]] = x[[j, c]] - x[[i, c]];
            }
        }

        let mut h = edge_features;
        let mut pre_activations = Vec::with_capacity(self.mlp.len());
        for layer in &mut self.mlp {
            let pre = layer.forward(&h)?;
            h = ActivationType::ReLU.forward_batch(&pre);
            pre_activations.push(pre);
        }

        let mut output = Array2::<f64>::zeros((n, self.out_features));
        let mut argmax = Array2::<usize>::zeros((n, self.out_features));
        for i in 0..n {
            let range = graph.edge_range(i);
            if range.is_empty() {
                continue;
            }
            for c in 0..self.out_features {
                let mut best = range.start;
                for e in range.clone() {
                    if h[[e, c]] > h[[best, c]] {
                        best = e;
                    }
                }
                output[[i, c]] = h[[best, c]];
                argmax[[i, c]] = best;
            }
        }

        self.cache = Some(EdgeConvCache {
            graph,
            pre_activations,
            argmax,
        });
        Ok(output)
    }

    /// Backward pass; the k-NN selection itself carries no gradient
    pub fn backward(&mut self, grad_output: &Array2<f64>) -> Result<Array2<f64>> {
        let cache = self
            .cache
            .take()
            .ok_or_else(|| Error::Model("EdgeConv::backward called before forward".to_string()))?;
        let n = cache.graph.num_nodes();
        let d = self.in_features;

        if grad_output.dim() != (n, self.out_features) {
            return Err(Error::shape(
                format!("({}, {})", n, self.out_features),
                format!("{:?}", grad_output.dim()),
            ));
        }

        let mut grad = Array2::<f64>::zeros((cache.graph.num_edges(), self.out_features));
        for i in 0..n {
            if cache.graph.degree(i) == 0 {
                continue;
            }
            for c in 0..self.out_features {
                grad[[cache.argmax[[i, c]], c]] += grad_output[[i, c]];
            }
        }

        for (layer, pre) in self
            .mlp
            .iter_mut()
            .zip(cache.pre_activations.iter())
            .rev()
        {
            let grad_pre = ActivationType::ReLU.backward_batch(pre, &grad);
            grad = layer.backward(&grad_pre)?;
        }

        let mut grad_x = Array2::<f64>::zeros((n, d));
        for (e, (j, i)) in cache.graph.edges().enumerate() {
            for c in 0..d {
                let g_center = grad[[e, c]];
                let g_diff = grad[[e, d + c]];
                grad_x[[i, c]] += g_center - g_diff;
                grad_x[[j, c]] += g_diff;
            }
        }
        Ok(grad_x)
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.mlp.iter_mut().flat_map(|l| l.parameters_mut()).collect()
    }

    pub fn num_parameters(&self) -> usize {
        self.mlp.iter().map(|l| l.num_parameters()).sum()
    }
}

/// DGCNN classifier architecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DgcnnConfig {
    pub input_dim: usize,
    /// Output width of each edge convolution
    pub conv_dims: Vec<usize>,
    /// Linear + ReLU blocks inside each edge convolution
    pub mlp_depth: usize,
    /// Neighbours used by every dynamic k-NN
    pub k: usize,
    pub num_classes: usize,
    pub seed: u64,
}

impl Default for DgcnnConfig {
    fn default() -> Self {
        Self {
            input_dim: PARTICLE_FEATURES,
            conv_dims: vec![32, 32, 64, 64],
            mlp_depth: 2,
            k: 8,
            num_classes: 2,
            seed: 42,
        }
    }
}

impl DgcnnConfig {
    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 || self.conv_dims.is_empty() || self.conv_dims.contains(&0) {
            return Err(Error::Config(
                "DGCNN needs at least one edge convolution with positive width".to_string(),
            ));
        }
        if self.k == 0 || self.mlp_depth == 0 {
            return Err(Error::Config("DGCNN k and mlp_depth must be positive".to_string()));
        }
        if self.num_classes < 2 {
            return Err(Error::Config("DGCNN needs at least two classes".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct DgcnnCache {
    segments: Vec<Range<usize>>,
    num_nodes: usize,
    max_argmax: Array2<usize>,
}

/// Stacked edge convolutions, max+mean readout and a linear head
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DgcnnClassifier {
    config: DgcnnConfig,
    convs: Vec<EdgeConv>,
    classifier: Linear,
    #[serde(skip)]
    cache: Option<DgcnnCache>,
}

impl DgcnnClassifier {
    pub fn new(config: DgcnnConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let mut convs = Vec::with_capacity(config.conv_dims.len());
        let mut current = config.input_dim;
        for &dim in &config.conv_dims {
            convs.push(EdgeConv::new(current, dim, config.k, config.mlp_depth, &mut rng));
            current = dim;
        }
        let classifier = Linear::new(2 * current, config.num_classes, &mut rng);

        Ok(Self {
            config,
            convs,
            classifier,
            cache: None,
        })
    }

    pub fn config(&self) -> &DgcnnConfig {
        &self.config
    }

    pub fn convs(&self) -> &[EdgeConv] {
        &self.convs
    }
}

impl GraphClassifier for DgcnnClassifier {
    fn name(&self) -> &'static str {
        "dgcnn"
    }

    fn forward(&mut self, batch: &GraphBatch) -> Result<Array2<f64>> {
        let mut h = batch.x.clone();
        for conv in &mut self.convs {
            h = conv.forward(&h, &batch.segments)?;
        }

        let (max_pooled, max_argmax) = max_pool(&h, &batch.segments);
        let mean_pooled = mean_pool(&h, &batch.segments);
        let pooled = concatenate![Axis(1), max_pooled, mean_pooled];
        let logits = self.classifier.forward(&pooled)?;

        self.cache = Some(DgcnnCache {
            segments: batch.segments.clone(),
            num_nodes: batch.num_nodes(),
            max_argmax,
        });
        Ok(logits)
    }

    fn backward(&mut self, grad_logits: &Array2<f64>) -> Result<()> {
        let cache = self
            .cache
            .take()
            .ok_or_else(|| Error::Model("DgcnnClassifier::backward called before forward".to_string()))?;

        let grad_pooled = self.classifier.backward(grad_logits)?;
        let width = grad_pooled.ncols() / 2;
        let grad_max = grad_pooled.slice(s![.., ..width]).to_owned();
        let grad_mean = grad_pooled.slice(s![.., width..]).to_owned();

        let mut grad =
            max_pool_backward(&grad_max, &cache.max_argmax, &cache.segments, cache.num_nodes);
        grad += &mean_pool_backward(&grad_mean, &cache.segments, cache.num_nodes);

        for conv in self.convs.iter_mut().rev() {
            grad = conv.backward(&grad)?;
        }
        Ok(())
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params: Vec<&mut Parameter> = self
            .convs
            .iter_mut()
            .flat_map(|c| c.parameters_mut())
            .collect();
        params.extend(self.classifier.parameters_mut());
        params
    }

    fn num_parameters(&self) -> usize {
        self.convs.iter().map(|c| c.num_parameters()).sum::<usize>()
            + self.classifier.num_parameters()
    }
}
