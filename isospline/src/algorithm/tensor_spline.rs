use bincode::{Decode, Encode};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::chemistry::constants::BICUBIC_PATCH_COEFFICIENTS;
use crate::error::{IsotopeSplineError, Result};

/// Value returned by [`TensorProductSpline::evaluate_fragment`] outside the model domain.
pub const OUT_OF_BOUNDS: f64 = -1.0;

/// Bicubic tensor-product spline over a (precursor mass, fragment mass) grid.
///
/// # Description
///
/// Coefficients live in one flat buffer of `(n_precursor - 1) * (n_fragment - 1)` patches
/// of 16 values each. Patch `(p, f)` starts at `(p * (n_fragment - 1) + f) * 16`.
/// Within a patch, coefficient `4 * i + j` multiplies `x^(3 - i) * y^(3 - j)`, where
/// `x` is the offset in fragment mass and `y` the offset in precursor mass.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct TensorProductSpline {
    breaks_precursor: Vec<f64>,
    breaks_fragment: Vec<f64>,
    coefficients: Vec<f64>,
}

impl TensorProductSpline {
    pub fn new(breaks_precursor: Vec<f64>, breaks_fragment: Vec<f64>, coefficients: Vec<f64>) -> Result<Self> {
        for (name, breaks) in [("precursor", &breaks_precursor), ("fragment", &breaks_fragment)] {
            if breaks.len() < 2 {
                return Err(IsotopeSplineError::InvalidArgument(format!(
                    "{} breaks need at least two points, got {}",
                    name,
                    breaks.len()
                )));
            }
            if !breaks.iter().tuple_windows().all(|(lo, hi)| lo < hi) {
                return Err(IsotopeSplineError::InvalidArgument(format!(
                    "{} breaks must be strictly ascending",
                    name
                )));
            }
        }

        let expected = (breaks_precursor.len() - 1) * (breaks_fragment.len() - 1) * BICUBIC_PATCH_COEFFICIENTS;
        if coefficients.len() != expected {
            return Err(IsotopeSplineError::LengthMismatch {
                element: "coefficients".to_string(),
                expected,
                found: coefficients.len(),
            });
        }

        Ok(TensorProductSpline {
            breaks_precursor,
            breaks_fragment,
            coefficients,
        })
    }

    pub fn breaks_precursor(&self) -> &[f64] {
        &self.breaks_precursor
    }

    pub fn breaks_fragment(&self) -> &[f64] {
        &self.breaks_fragment
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// True if `evaluate_fragment` yields a computed value for these masses.
    ///
    /// Edge patches at the first and the last two break points are excluded.
    pub fn in_bounds(&self, precursor_mass: f64, fragment_mass: f64) -> bool {
        fragment_mass < precursor_mass
            && strictly_inside(&self.breaks_fragment, fragment_mass)
            && strictly_inside(&self.breaks_precursor, precursor_mass)
    }

    /// evaluate the bicubic surface for a precursor and fragment mass
    ///
    /// Arguments:
    ///
    /// * `precursor_mass` - average mass of the precursor
    /// * `fragment_mass` - average mass of the fragment
    ///
    /// Returns:
    ///
    /// * `f64` - the surface value, or [`OUT_OF_BOUNDS`] outside the model domain
    ///
    pub fn evaluate_fragment(&self, precursor_mass: f64, fragment_mass: f64) -> f64 {
        if !self.in_bounds(precursor_mass, fragment_mass) {
            return OUT_OF_BOUNDS;
        }

        let p = last_break_at_or_below(&self.breaks_precursor, precursor_mass);
        let f = last_break_at_or_below(&self.breaks_fragment, fragment_mass);
        let c = self.patch(p, f);

        let x = fragment_mass - self.breaks_fragment[f];
        let y = precursor_mass - self.breaks_precursor[p];

        c[15] + y * (c[14] + y * (c[13] + y * c[12]))
            + x * (c[11] + y * (c[10] + y * (c[9] + y * c[8]))
                + x * (c[7] + y * (c[6] + y * (c[5] + y * c[4]))
                    + x * (c[3] + y * (c[2] + y * (c[1] + y * c[0])))))
    }

    fn patch(&self, p: usize, f: usize) -> &[f64] {
        let offset = (p * (self.breaks_fragment.len() - 1) + f) * BICUBIC_PATCH_COEFFICIENTS;
        &self.coefficients[offset..offset + BICUBIC_PATCH_COEFFICIENTS]
    }
}

fn strictly_inside(breaks: &[f64], value: f64) -> bool {
    value > breaks[0] && value < breaks[breaks.len() - 2]
}

fn last_break_at_or_below(breaks: &[f64], value: f64) -> usize {
    breaks.partition_point(|&b| b <= value) - 1
}
