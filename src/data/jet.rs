//! Jet and particle types

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Number of features carried by every particle: pt, rapidity, phi, pid
pub const PARTICLE_FEATURES: usize = 4;

/// Jet class
///
/// Encoded the way the public quark/gluon dataset does: gluon = 0, quark = 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Gluon,
    Quark,
}

impl Label {
    /// Class index used by the classifiers
    pub fn index(self) -> usize {
        match self {
            Label::Gluon => 0,
            Label::Quark => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Label::Gluon),
            1 => Some(Label::Quark),
            _ => None,
        }
    }

    /// Parse a raw dataset value (0.0 or 1.0)
    pub fn from_value(value: f64) -> Option<Self> {
        if value == 0.0 {
            Some(Label::Gluon)
        } else if value == 1.0 {
            Some(Label::Quark)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Label::Gluon => "gluon",
            Label::Quark => "quark",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single reconstructed particle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Particle {
    /// Transverse momentum
    pub pt: f64,
    /// Rapidity
    pub rapidity: f64,
    /// Azimuthal angle
    pub phi: f64,
    /// PDG particle id
    pub pid: f64,
}

impl Particle {
    pub fn new(pt: f64, rapidity: f64, phi: f64, pid: f64) -> Self {
        Self {
            pt,
            rapidity,
            phi,
            pid,
        }
    }

    pub fn to_array(&self) -> [f64; PARTICLE_FEATURES] {
        [self.pt, self.rapidity, self.phi, self.pid]
    }

    pub fn from_row(row: ArrayView1<f64>) -> Self {
        Self::new(row[0], row[1], row[2], row[3])
    }

    /// Padding rows are (near) all-zero
    pub fn is_padding(&self, epsilon: f64) -> bool {
        self.to_array().iter().map(|v| v.abs()).sum::<f64>() <= epsilon
    }
}

/// A labeled jet: a zero-padded, fixed-size array of particles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jet {
    pub particles: Vec<Particle>,
    pub label: Label,
}

impl Jet {
    pub fn new(particles: Vec<Particle>, label: Label) -> Self {
        Self { particles, label }
    }

    /// Slot count including padding
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Number of non-padding particles
    pub fn multiplicity(&self, epsilon: f64) -> usize {
        self.particles
            .iter()
            .filter(|p| !p.is_padding(epsilon))
            .count()
    }

    /// Feature matrix of shape (slots, 4), padding included
    pub fn feature_matrix(&self) -> Array2<f64> {
        let mut matrix = Array2::zeros((self.particles.len(), PARTICLE_FEATURES));
        for (i, particle) in self.particles.iter().enumerate() {
            for (j, value) in particle.to_array().into_iter().enumerate() {
                matrix[[i, j]] = value;
            }
        }
        matrix
    }

    /// Pad with zero particles (or truncate) to exactly `slots` entries
    pub fn padded_to(mut self, slots: usize) -> Self {
        self.particles.resize(slots, Particle::default());
        self
    }
}
