//! Jet data: types, loading, synthetic generation and preprocessing

mod dataset;
mod jet;
mod loader;
mod normalize;
mod synthetic;

pub use dataset::{split_shuffled, BatchSampler, JetDataset};
pub use jet::{Jet, Label, Particle, PARTICLE_FEATURES};
pub use loader::JetLoader;
pub use normalize::{remove_padding, standardize_columns, FeatureNormalizer, NormalizationScope};
pub use synthetic::SyntheticJets;
