//! Synthetic quark/gluon jets
//!
//! Offline stand-in for the public Pythia quark/gluon sample. Jets are
//! drawn in the 500-550 GeV window with |y| < 1.7 like the real sample.
//! Gluon jets radiate more: higher multiplicity, softer fragmentation and a
//! wider angular spread than quark jets.

use std::f64::consts::PI;

use ndarray_rand::rand_distr::{Distribution, Exp1, Normal, Poisson, Uniform};
use rand::distributions::WeightedIndex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::jet::{Jet, Label, Particle};
use crate::error::{Error, Result};

/// Particle ids and their relative abundance inside a jet
const PID_TABLE: [(f64, f64); 12] = [
    (22.0, 0.28),
    (211.0, 0.20),
    (-211.0, 0.20),
    (130.0, 0.06),
    (321.0, 0.05),
    (-321.0, 0.05),
    (2112.0, 0.03),
    (-2112.0, 0.03),
    (2212.0, 0.03),
    (-2212.0, 0.03),
    (11.0, 0.02),
    (-11.0, 0.02),
];

/// Shape parameters of one jet class
#[derive(Debug, Clone, Copy)]
struct ClassShape {
    mean_multiplicity: f64,
    /// Exponent applied to the momentum-sharing weights; larger means harder
    hardness: f64,
    angular_width: f64,
}

const QUARK: ClassShape = ClassShape {
    mean_multiplicity: 16.0,
    hardness: 2.5,
    angular_width: 0.06,
};

const GLUON: ClassShape = ClassShape {
    mean_multiplicity: 30.0,
    hardness: 1.3,
    angular_width: 0.14,
};

/// Deterministic generator of labeled, zero-padded jets
pub struct SyntheticJets {
    rng: StdRng,
    max_particles: usize,
}

impl SyntheticJets {
    pub fn new(max_particles: usize, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max_particles,
        }
    }

    /// Generate `n` jets, half of each class, in shuffled order
    pub fn generate(n: usize, max_particles: usize, seed: u64) -> Result<Vec<Jet>> {
        if max_particles == 0 {
            return Err(Error::Config("max_particles must be positive".to_string()));
        }
        let mut generator = Self::new(max_particles, seed);

        let mut jets: Vec<Jet> = (0..n)
            .map(|i| {
                let label = if i % 2 == 0 { Label::Quark } else { Label::Gluon };
                generator.jet(label)
            })
            .collect::<Result<_>>()?;

        jets.shuffle(&mut generator.rng);
        Ok(jets)
    }

    /// Draw one jet of the given class
    pub fn jet(&mut self, label: Label) -> Result<Jet> {
        let shape = match label {
            Label::Quark => QUARK,
            Label::Gluon => GLUON,
        };

        let poisson = Poisson::new(shape.mean_multiplicity)
            .map_err(|e| Error::Config(format!("multiplicity distribution: {e}")))?;
        let count = (poisson.sample(&mut self.rng) as usize + 2).min(self.max_particles);

        let jet_pt = Uniform::new(500.0, 550.0).sample(&mut self.rng);
        let jet_y = Uniform::new(-1.7, 1.7).sample(&mut self.rng);
        let jet_phi = Uniform::new(0.0, 2.0 * PI).sample(&mut self.rng);

        let weights: Vec<f64> = (0..count)
            .map(|_| {
                let w: f64 = Exp1.sample(&mut self.rng);
                w.powf(shape.hardness)
            })
            .collect();
        let total: f64 = weights.iter().sum::<f64>().max(f64::MIN_POSITIVE);

        let pid_index = WeightedIndex::new(PID_TABLE.iter().map(|(_, w)| *w))
            .map_err(|e| Error::Config(format!("pid distribution: {e}")))?;

        let mut particles = Vec::with_capacity(count);
        for weight in weights {
            let fraction = weight / total;
            // Softer particles sit further from the axis
            let spread = shape.angular_width * (1.0 + (0.05 / (fraction + 0.01)).sqrt());
            let offset = Normal::new(0.0, spread)
                .map_err(|e| Error::Config(format!("angular distribution: {e}")))?;

            let pt = (jet_pt * fraction).max(1e-3);
            let y = jet_y + offset.sample(&mut self.rng);
            let phi = (jet_phi + offset.sample(&mut self.rng)).rem_euclid(2.0 * PI);
            let pid = PID_TABLE[pid_index.sample(&mut self.rng)].0;
            particles.push(Particle::new(pt, y, phi, pid));
        }

        particles.sort_by(|a, b| b.pt.total_cmp(&a.pt));
        Ok(Jet::new(particles, label).padded_to(self.max_particles))
    }
}
