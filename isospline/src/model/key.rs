use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Identity of a precursor isotope model.
///
/// Ordered by isotope first, then sulfur count. `num_sulfur == None` marks a
/// sulfur independent model and sorts before every sulfur specific one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    pub isotope: u32,
    pub num_sulfur: Option<u32>,
}

impl ModelKey {
    pub fn new(isotope: u32, num_sulfur: Option<u32>) -> Self {
        ModelKey { isotope, num_sulfur }
    }

    pub fn is_sulfur_specific(&self) -> bool {
        self.num_sulfur.is_some()
    }
}

impl Display for ModelKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.num_sulfur {
            Some(s) => write!(f, "isotope {} (S={})", self.isotope, s),
            None => write!(f, "isotope {}", self.isotope),
        }
    }
}

/// Identity of a fragment isotope model.
///
/// Field order is the ordering: precursor isotope, fragment isotope, then the
/// sulfur and selenium counts of fragment and complement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FragmentModelKey {
    pub precursor_isotope: u32,
    pub fragment_isotope: u32,
    pub num_sulfur: u32,
    pub num_comp_sulfur: u32,
    pub num_selenium: u32,
    pub num_comp_selenium: u32,
}

impl FragmentModelKey {
    pub fn new(precursor_isotope: u32, fragment_isotope: u32) -> Self {
        FragmentModelKey {
            precursor_isotope,
            fragment_isotope,
            ..Default::default()
        }
    }
}

/// translate an (isotope, sulfur) pair into a position of a dense model vector
///
/// Arguments:
///
/// * `isotope` - isotope index
/// * `num_sulfur` - number of sulfur atoms
/// * `max_isotope` - largest isotope index stored per sulfur count
///
/// Returns:
///
/// * `usize` - `isotope + num_sulfur * (max_isotope + 1)`
///
/// # Examples
///
/// ```
/// use isospline::model::key::dense_index;
///
/// assert_eq!(dense_index(3, 0, 20), 3);
/// assert_eq!(dense_index(3, 2, 20), 45);
/// ```
pub fn dense_index(isotope: u32, num_sulfur: u32, max_isotope: u32) -> usize {
    isotope as usize + num_sulfur as usize * (max_isotope as usize + 1)
}
