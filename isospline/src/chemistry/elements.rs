use serde::{Deserialize, Serialize};

/// Elements that make up peptide sum formulas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Element {
    C,
    H,
    N,
    O,
    S,
}

impl Element {
    pub fn symbol(&self) -> &'static str {
        match self {
            Element::C => "C",
            Element::H => "H",
            Element::N => "N",
            Element::O => "O",
            Element::S => "S",
        }
    }

    /// isotope averaged atomic weight (IUPAC)
    pub fn average_weight(&self) -> f64 {
        match self {
            Element::C => 12.0107,
            Element::H => 1.00794,
            Element::N => 14.0067,
            Element::O => 15.9994,
            Element::S => 32.065,
        }
    }

    /// Natural abundances indexed by nominal mass offset from the lightest isotope.
    ///
    /// Offsets without a stable isotope carry zero abundance, so index `k` is always
    /// the probability of `k` extra neutrons.
    pub fn nominal_abundances(&self) -> &'static [f64] {
        match self {
            Element::C => &[0.9893, 0.0107],
            Element::H => &[0.999885, 0.000115],
            Element::N => &[0.99632, 0.00368],
            Element::O => &[0.99757, 0.00038, 0.00205],
            Element::S => &[0.9493, 0.0076, 0.0429, 0.0, 0.0002],
        }
    }
}
