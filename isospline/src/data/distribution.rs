use std::fmt::{self, Display, Formatter};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Isotope distribution over nominal masses.
///
/// # Description
///
/// Each peak is a pair of `(nominal_mass, probability)`, ordered by nominal mass.
/// Peak `i` belongs to isotope `i`, i.e. the molecule carrying `i` extra neutrons.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct IsotopeDistribution {
    pub peaks: Vec<(u32, f64)>,
}

impl IsotopeDistribution {
    /// Constructs a new `IsotopeDistribution`.
    ///
    /// # Arguments
    ///
    /// * `peaks` - pairs of nominal mass and probability, ascending in mass
    ///
    pub fn new(peaks: Vec<(u32, f64)>) -> Self {
        IsotopeDistribution { peaks }
    }

    /// Builds a distribution from per-isotope probabilities, labelling isotope `i`
    /// with `nominal_mass + i`, saturating at `u32::MAX`.
    pub fn from_probabilities(nominal_mass: u32, probabilities: Vec<f64>) -> Self {
        let peaks = probabilities
            .into_iter()
            .enumerate()
            .map(|(i, p)| (nominal_mass.saturating_add(i as u32), p))
            .collect();
        IsotopeDistribution { peaks }
    }

    /// Nominal mass label for an average mass, `round(mass)` clamped at zero.
    pub fn nominal_mass(average_weight: f64) -> u32 {
        if average_weight <= 0.0 {
            0
        } else {
            average_weight.round() as u32
        }
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn probabilities(&self) -> Vec<f64> {
        self.peaks.iter().map(|&(_, p)| p).collect()
    }

    pub fn total_probability(&self) -> f64 {
        self.peaks.iter().map(|&(_, p)| p).sum()
    }

    /// Probability of isotope `isotope`, zero if the distribution is shorter.
    pub fn probability(&self, isotope: usize) -> f64 {
        self.peaks.get(isotope).map_or(0.0, |&(_, p)| p)
    }

    /// Scales all probabilities so they sum to one; a distribution with zero mass is left as is.
    pub fn renormalize(&mut self) {
        let total = self.total_probability();
        if total > 0.0 {
            for peak in self.peaks.iter_mut() {
                peak.1 /= total;
            }
        }
    }

    /// Drops all isotopes from index `depth` on.
    pub fn truncate(&mut self, depth: usize) {
        self.peaks.truncate(depth);
    }
}

impl Display for IsotopeDistribution {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let peaks: Vec<String> = self.peaks.iter().map(|(m, p)| format!("{}: {:.6}", m, p)).collect();
        write!(f, "IsotopeDistribution([{}])", peaks.join(", "))
    }
}
