//! Graph Attention Network
//!
//! `GatConv` follows the GATv1 formulation: node `i` aggregates the
//! linearly transformed features of its neighbours and of itself,
//! weighted by
//!
//! ```text
//! alpha_ij = softmax_j( LeakyReLU( a_src . W x_j + a_dst . W x_i ) )
//! ```
//!
//! computed independently for every head. `GatClassifier` stacks three
//! of these layers with ELU in between, mean-pools every graph and
//! classifies the pooled vector with a linear head.

use ndarray::{s, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::GraphClassifier;
use crate::data::PARTICLE_FEATURES;
use crate::error::{Error, Result};
use crate::graph::{GraphBatch, SparseGraph};
use crate::nn::{
    leaky_relu, leaky_relu_derivative, mean_pool, mean_pool_backward, ActivationType, Linear,
    Parameter, ATTENTION_NEGATIVE_SLOPE,
};

/// What `GatConv::backward` needs from the last forward pass
#[derive(Debug, Clone)]
struct GatConvCache {
    input: Array2<f64>,
    z: Array2<f64>,
    /// Input graph plus self-loops
    graph: SparseGraph,
    /// Attention logits before LeakyReLU, (edges, heads)
    scores: Array2<f64>,
    /// Normalized attention, (edges, heads)
    alpha: Array2<f64>,
}

/// Multi-head graph attention convolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatConv {
    in_features: usize,
    /// Output width of a single head
    out_features: usize,
    num_heads: usize,
    /// Concatenate heads (true) or average them (false)
    concat: bool,
    negative_slope: f64,
    /// Shared projection for all heads, (in, heads * out)
    weight: Parameter,
    /// Source-side attention vectors, (heads, out)
    att_src: Parameter,
    /// Target-side attention vectors, (heads, out)
    att_dst: Parameter,
    bias: Parameter,
    #[serde(skip)]
    cache: Option<GatConvCache>,
}

impl GatConv {
    pub fn new<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        num_heads: usize,
        concat: bool,
        rng: &mut R,
    ) -> Self {
        let output_dim = if concat {
            out_features * num_heads
        } else {
            out_features
        };

        Self {
            in_features,
            out_features,
            num_heads,
            concat,
            negative_slope: ATTENTION_NEGATIVE_SLOPE,
            weight: Parameter::glorot(in_features, out_features * num_heads, rng),
            att_src: Parameter::glorot(num_heads, out_features, rng),
            att_dst: Parameter::glorot(num_heads, out_features, rng),
            bias: Parameter::zeros(1, output_dim),
            cache: None,
        }
    }

    /// Get output dimension
    pub fn output_dim(&self) -> usize {
        if self.concat {
            self.out_features * self.num_heads
        } else {
            self.out_features
        }
    }

    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    /// Forward pass over `graph` (self-loops are added here)
    pub fn forward(&mut self, x: &Array2<f64>, graph: &SparseGraph) -> Result<Array2<f64>> {
        let n = x.nrows();
        if x.ncols() != self.in_features {
            return Err(Error::shape(
                format!("{} input features", self.in_features),
                format!("{}", x.ncols()),
            ));
        }
        if graph.num_nodes() != n {
            return Err(Error::shape(
                format!("graph over {} nodes", n),
                format!("{} nodes", graph.num_nodes()),
            ));
        }

        let (heads, f) = (self.num_heads, self.out_features);
        let z = x.dot(&self.weight.value);

        // Per-node halves of the attention logit
        let mut s_src = Array2::<f64>::zeros((n, heads));
        let mut s_dst = Array2::<f64>::zeros((n, heads));
        for i in 0..n {
            for k in 0..heads {
                let zi = z.slice(s![i, k * f..(k + 1) * f]);
                s_src[[i, k]] = zi.dot(&self.att_src.value.row(k));
                s_dst[[i, k]] = zi.dot(&self.att_dst.value.row(k));
            }
        }

        let graph = graph.with_self_loops();
        let mut scores = Array2::<f64>::zeros((graph.num_edges(), heads));
        let mut alpha = Array2::<f64>::zeros((graph.num_edges(), heads));
        let mut aggregated = Array2::<f64>::zeros((n, heads * f));

        for i in 0..n {
            let range = graph.edge_range(i);
            let sources = graph.neighbors(i);

            for k in 0..heads {
                let mut max = f64::NEG_INFINITY;
                for (e, &j) in range.clone().zip(sources) {
                    let raw = s_src[[j, k]] + s_dst[[i, k]];
                    scores[[e, k]] = raw;
                    let activated = leaky_relu(raw, self.negative_slope);
                    alpha[[e, k]] = activated;
                    max = max.max(activated);
                }

                let mut sum = 0.0;
                for e in range.clone() {
                    let v = (alpha[[e, k]] - max).exp();
                    alpha[[e, k]] = v;
                    sum += v;
                }

                for (e, &j) in range.clone().zip(sources) {
                    alpha[[e, k]] /= sum;
                    let a = alpha[[e, k]];
                    for c in 0..f {
                        aggregated[[i, k * f + c]] += a * z[[j, k * f + c]];
                    }
                }
            }
        }

        let mut output = if self.concat {
            aggregated
        } else {
            let mut avg = Array2::<f64>::zeros((n, f));
            for k in 0..heads {
                avg += &aggregated.slice(s![.., k * f..(k + 1) * f]);
            }
            avg / heads as f64
        };
        output += &self.bias.value;

        self.cache = Some(GatConvCache {
            input: x.clone(),
            z,
            graph,
            scores,
            alpha,
        });
        Ok(output)
    }

    /// Backward pass; returns the gradient w.r.t. the layer input
    pub fn backward(&mut self, grad_output: &Array2<f64>) -> Result<Array2<f64>> {
        let cache = self.cache.take().ok_or_else(|| {
            Error::Model("GatConv::backward called before forward".to_string())
        })?;
        let (heads, f) = (self.num_heads, self.out_features);
        let n = cache.z.nrows();

        if grad_output.dim() != (n, self.output_dim()) {
            return Err(Error::shape(
                format!("({}, {})", n, self.output_dim()),
                format!("{:?}", grad_output.dim()),
            ));
        }

        self.bias
            .accumulate(&grad_output.sum_axis(Axis(0)).insert_axis(Axis(0)));

        let grad_heads = if self.concat {
            grad_output.clone()
        } else {
            let mut g = Array2::<f64>::zeros((n, heads * f));
            let share = grad_output / heads as f64;
            for k in 0..heads {
                g.slice_mut(s![.., k * f..(k + 1) * f]).assign(&share);
            }
            g
        };

        let z = &cache.z;
        let mut dz = Array2::<f64>::zeros((n, heads * f));
        let mut ds_src = Array2::<f64>::zeros((n, heads));
        let mut ds_dst = Array2::<f64>::zeros((n, heads));

        for i in 0..n {
            let range = cache.graph.edge_range(i);
            let sources = cache.graph.neighbors(i);

            for k in 0..heads {
                // d loss / d alpha for every incoming edge
                let mut d_alpha = Vec::with_capacity(sources.len());
                for (e, &j) in range.clone().zip(sources) {
                    let a = cache.alpha[[e, k]];
                    let mut d = 0.0;
                    for c in 0..f {
                        let g = grad_heads[[i, k * f + c]];
                        d += g * z[[j, k * f + c]];
                        dz[[j, k * f + c]] += a * g;
                    }
                    d_alpha.push(d);
                }

                // Softmax Jacobian
                let weighted: f64 = range
                    .clone()
                    .zip(&d_alpha)
                    .map(|(e, d)| cache.alpha[[e, k]] * d)
                    .sum();

                for ((e, &j), d) in range.clone().zip(sources).zip(&d_alpha) {
                    let d_logit = cache.alpha[[e, k]] * (d - weighted);
                    let d_raw =
                        d_logit * leaky_relu_derivative(cache.scores[[e, k]], self.negative_slope);
                    ds_src[[j, k]] += d_raw;
                    ds_dst[[i, k]] += d_raw;
                }
            }
        }

        let mut d_att_src = Array2::<f64>::zeros((heads, f));
        let mut d_att_dst = Array2::<f64>::zeros((heads, f));
        for node in 0..n {
            for k in 0..heads {
                let (gs, gd) = (ds_src[[node, k]], ds_dst[[node, k]]);
                for c in 0..f {
                    let col = k * f + c;
                    d_att_src[[k, c]] += gs * z[[node, col]];
                    d_att_dst[[k, c]] += gd * z[[node, col]];
                    dz[[node, col]] +=
                        gs * self.att_src.value[[k, c]] + gd * self.att_dst.value[[k, c]];
                }
            }
        }

        self.att_src.accumulate(&d_att_src);
        self.att_dst.accumulate(&d_att_dst);
        self.weight.accumulate(&cache.input.t().dot(&dz));

        Ok(dz.dot(&self.weight.value.t()))
    }

    /// Attention coefficients of the last forward pass
    ///
    /// Returns the self-looped graph and an `(edges, heads)` matrix aligned
    /// with its CSR edge order.
    pub fn attention(&self) -> Option<(&SparseGraph, &Array2<f64>)> {
        self.cache.as_ref().map(|c| (&c.graph, &c.alpha))
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![
            &mut self.weight,
            &mut self.att_src,
            &mut self.att_dst,
            &mut self.bias,
        ]
    }

    /// Get number of parameters
    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.att_src.len() + self.att_dst.len() + self.bias.len()
    }
}

/// GAT classifier architecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatConfig {
    pub input_dim: usize,
    /// Per-head width of every attention layer
    pub hidden_dim: usize,
    pub num_heads: usize,
    pub num_layers: usize,
    pub num_classes: usize,
    /// Seed for weight initialization
    pub seed: u64,
}

impl Default for GatConfig {
    fn default() -> Self {
        Self {
            input_dim: PARTICLE_FEATURES,
            hidden_dim: 16,
            num_heads: 4,
            num_layers: 3,
            num_classes: 2,
            seed: 42,
        }
    }
}

impl GatConfig {
    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 || self.hidden_dim == 0 {
            return Err(Error::Config("GAT dimensions must be positive".to_string()));
        }
        if self.num_heads == 0 || self.num_layers == 0 {
            return Err(Error::Config(
                "GAT needs at least one layer and one head".to_string(),
            ));
        }
        if self.num_classes < 2 {
            return Err(Error::Config("GAT needs at least two classes".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct GatClassifierCache {
    pre_activations: Vec<Array2<f64>>,
    segments: Vec<std::ops::Range<usize>>,
    num_nodes: usize,
}

/// Stacked attention layers, mean pooling and a linear head
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatClassifier {
    config: GatConfig,
    layers: Vec<GatConv>,
    classifier: Linear,
    #[serde(skip)]
    cache: Option<GatClassifierCache>,
}

impl GatClassifier {
    pub fn new(config: GatConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let mut layers = Vec::with_capacity(config.num_layers);
        let mut current = config.input_dim;
        for _ in 0..config.num_layers {
            let layer = GatConv::new(current, config.hidden_dim, config.num_heads, true, &mut rng);
            current = layer.output_dim();
            layers.push(layer);
        }
        let classifier = Linear::new(current, config.num_classes, &mut rng);

        Ok(Self {
            config,
            layers,
            classifier,
            cache: None,
        })
    }

    pub fn config(&self) -> &GatConfig {
        &self.config
    }

    pub fn layers(&self) -> &[GatConv] {
        &self.layers
    }

    /// Get number of layers
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

impl GraphClassifier for GatClassifier {
    fn name(&self) -> &'static str {
        "gat"
    }

    fn forward(&mut self, batch: &GraphBatch) -> Result<Array2<f64>> {
        let mut h = batch.x.clone();
        let mut pre_activations = Vec::with_capacity(self.layers.len());

        for layer in &mut self.layers {
            let pre = layer.forward(&h, &batch.edges)?;
            h = ActivationType::ELU.forward_batch(&pre);
            pre_activations.push(pre);
        }

        let pooled = mean_pool(&h, &batch.segments);
        let logits = self.classifier.forward(&pooled)?;

        self.cache = Some(GatClassifierCache {
            pre_activations,
            segments: batch.segments.clone(),
            num_nodes: batch.num_nodes(),
        });
        Ok(logits)
    }

    fn backward(&mut self, grad_logits: &Array2<f64>) -> Result<()> {
        let cache = self
            .cache
            .take()
            .ok_or_else(|| Error::Model("GatClassifier::backward called before forward".to_string()))?;

        let grad_pooled = self.classifier.backward(grad_logits)?;
        let mut grad = mean_pool_backward(&grad_pooled, &cache.segments, cache.num_nodes);

        for (layer, pre) in self
            .layers
            .iter_mut()
            .zip(cache.pre_activations.iter())
            .rev()
        {
            let grad_pre = ActivationType::ELU.backward_batch(pre, &grad);
            grad = layer.backward(&grad_pre)?;
        }
        Ok(())
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params: Vec<&mut Parameter> = self
            .layers
            .iter_mut()
            .flat_map(|l| l.parameters_mut())
            .collect();
        params.extend(self.classifier.parameters_mut());
        params
    }

    fn num_parameters(&self) -> usize {
        self.layers.iter().map(|l| l.num_parameters()).sum::<usize>()
            + self.classifier.num_parameters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Label;
    use crate::graph::{knn_single, JetGraph};
    use crate::nn::softmax_cross_entropy;
    use approx::assert_relative_eq;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    fn random_graph(n: usize, k: usize, rng: &mut StdRng) -> JetGraph {
        let x = Array2::random_using((n, PARTICLE_FEATURES), Uniform::new(-1.0, 1.0), rng);
        let edges = knn_single(x.view(), k);
        JetGraph {
            x,
            edges,
            label: Label::Quark,
        }
    }

    #[test]
    fn test_layer_forward_shapes() {
        let mut rng = StdRng::seed_from_u64(0);
        let g = random_graph(6, 3, &mut rng);

        let mut concat = GatConv::new(4, 8, 2, true, &mut rng);
        assert_eq!(concat.forward(&g.x, &g.edges).unwrap().dim(), (6, 16));

        let mut averaged = GatConv::new(4, 8, 2, false, &mut rng);
        assert_eq!(averaged.forward(&g.x, &g.edges).unwrap().dim(), (6, 8));
    }

    #[test]
    fn test_attention_sums_to_one() {
        let mut rng = StdRng::seed_from_u64(1);
        let g = random_graph(7, 3, &mut rng);
        let mut layer = GatConv::new(4, 5, 3, true, &mut rng);
        layer.forward(&g.x, &g.edges).unwrap();

        let (graph, alpha) = layer.attention().unwrap();
        assert_eq!(graph.num_edges(), g.num_edges() + 7);
        for i in 0..7 {
            for k in 0..3 {
                let total: f64 = graph.edge_range(i).map(|e| alpha[[e, k]]).sum();
                assert_relative_eq!(total, 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_isolated_node_attends_to_itself() {
        let mut rng = StdRng::seed_from_u64(2);
        let x = Array2::random_using((1, 4), Uniform::new(-1.0, 1.0), &mut rng);
        let mut layer = GatConv::new(4, 3, 2, true, &mut rng);
        let out = layer.forward(&x, &SparseGraph::new(1)).unwrap();

        let z = x.dot(&layer.weight.value);
        for c in 0..6 {
            assert_relative_eq!(out[[0, c]], z[[0, c]], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_layer_gradients_match_finite_differences() {
        let mut rng = StdRng::seed_from_u64(3);
        let g = random_graph(5, 2, &mut rng);
        let weights = Array2::random_using((5, 3), Uniform::new(-1.0, 1.0), &mut rng);

        for concat in [true, false] {
            let heads = 2;
            let out_dim = if concat { 3 * heads } else { 3 };
            let c = if concat {
                ndarray::concatenate![Axis(1), weights, weights]
            } else {
                weights.clone()
            };
            assert_eq!(c.ncols(), out_dim);

            let mut layer = GatConv::new(4, 3, heads, concat, &mut rng);
            layer.forward(&g.x, &g.edges).unwrap();
            let dx = layer.backward(&c).unwrap();
            let d_att = layer.att_src.grad().unwrap().clone();
            let dw = layer.weight.grad().unwrap().clone();

            let h = 1e-6;
            let loss = |layer: &mut GatConv, x: &Array2<f64>| {
                (layer.forward(x, &g.edges).unwrap() * &c).sum()
            };

            for &(i, j) in &[(0, 0), (3, 2), (4, 1)] {
                let mut xp = g.x.clone();
                xp[[i, j]] += h;
                let mut xm = g.x.clone();
                xm[[i, j]] -= h;
                let numeric = (loss(&mut layer, &xp) - loss(&mut layer, &xm)) / (2.0 * h);
                assert_relative_eq!(dx[[i, j]], numeric, epsilon = 1e-5);
            }

            for &(k, ch) in &[(0, 0), (1, 2)] {
                let original = layer.att_src.value[[k, ch]];
                layer.att_src.value[[k, ch]] = original + h;
                let plus = loss(&mut layer, &g.x);
                layer.att_src.value[[k, ch]] = original - h;
                let minus = loss(&mut layer, &g.x);
                layer.att_src.value[[k, ch]] = original;
                assert_relative_eq!(d_att[[k, ch]], (plus - minus) / (2.0 * h), epsilon = 1e-5);
            }

            let original = layer.weight.value[[2, 4]];
            layer.weight.value[[2, 4]] = original + h;
            let plus = loss(&mut layer, &g.x);
            layer.weight.value[[2, 4]] = original - h;
            let minus = loss(&mut layer, &g.x);
            layer.weight.value[[2, 4]] = original;
            assert_relative_eq!(dw[[2, 4]], (plus - minus) / (2.0 * h), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_classifier_logits_shape() {
        let mut rng = StdRng::seed_from_u64(4);
        let a = random_graph(6, 3, &mut rng);
        let b = random_graph(3, 3, &mut rng);
        let batch = GraphBatch::from_graphs(&[&a, &b]).unwrap();

        let mut model = GatClassifier::new(GatConfig::default()).unwrap();
        assert_eq!(model.num_layers(), 3);
        let logits = model.forward(&batch).unwrap();
        assert_eq!(logits.dim(), (2, 2));
        assert!(logits.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_classifier_gradients_match_finite_differences() {
        let mut rng = StdRng::seed_from_u64(5);
        let a = random_graph(5, 3, &mut rng);
        let mut b = random_graph(4, 2, &mut rng);
        b.label = Label::Gluon;
        let batch = GraphBatch::from_graphs(&[&a, &b]).unwrap();

        let config = GatConfig {
            hidden_dim: 3,
            num_heads: 2,
            ..Default::default()
        };
        let mut model = GatClassifier::new(config).unwrap();
        for layer in &mut model.layers {
            let dim = layer.bias.dim();
            layer.bias.value = Array2::random_using(dim, Uniform::new(0.01, 0.05), &mut rng);
        }
        model.classifier.bias.value = Array2::random_using((1, 2), Uniform::new(0.01, 0.05), &mut rng);

        let logits = model.forward(&batch).unwrap();
        let (_, grad) = softmax_cross_entropy(&logits, &batch.labels).unwrap();
        model.zero_grad();
        model.backward(&grad).unwrap();
        let analytic: Vec<Array2<f64>> = model
            .parameters_mut()
            .iter()
            .map(|p| p.grad().unwrap().clone())
            .collect();

        let h = 1e-6;
        let loss = |model: &mut GatClassifier| {
            let logits = model.forward(&batch).unwrap();
            softmax_cross_entropy(&logits, &batch.labels).unwrap().0
        };

        // Every layer weight, attention vector and bias, plus the head
        for (p, expected) in analytic.iter().enumerate() {
            let (rows, cols) = expected.dim();
            for &(r, c) in &[(0, 0), (rows - 1, cols - 1)] {
                let original = model.parameters_mut()[p].value[[r, c]];
                model.parameters_mut()[p].value[[r, c]] = original + h;
                let plus = loss(&mut model);
                model.parameters_mut()[p].value[[r, c]] = original - h;
                let minus = loss(&mut model);
                model.parameters_mut()[p].value[[r, c]] = original;
                assert_relative_eq!(
                    expected[[r, c]],
                    (plus - minus) / (2.0 * h),
                    epsilon = 1e-6,
                    max_relative = 1e-4
                );
            }
        }
    }

    #[test]
    fn test_backward_requires_forward() {
        let mut model = GatClassifier::new(GatConfig::default()).unwrap();
        assert!(matches!(
            model.backward(&Array2::zeros((1, 2))),
            Err(Error::Model(_))
        ));
    }

    #[test]
    fn test_invalid_config() {
        let config = GatConfig {
            num_heads: 0,
            ..Default::default()
        };
        assert!(GatClassifier::new(config).is_err());
    }
}
