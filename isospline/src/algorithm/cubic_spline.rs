use bincode::{Decode, Encode};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{IsotopeSplineError, Result};

/// Piecewise cubic polynomial over an ascending knot sequence.
///
/// # Description
///
/// Segment `i` covers `[knots[i], knots[i + 1])` and evaluates
/// `d[i] + c[i] * t + b[i] * t^2 + a[i] * t^3` with `t = x - knots[i]`.
/// The last segment is closed on the right so the final knot is still evaluable.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct CubicSpline {
    knots: Vec<f64>,
    a: Vec<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
}

impl CubicSpline {
    /// Constructs a new `CubicSpline`.
    ///
    /// # Arguments
    ///
    /// * `knots` - strictly ascending segment boundaries, at least two
    /// * `a` - cubic coefficients, one per segment
    /// * `b` - quadratic coefficients, one per segment
    /// * `c` - linear coefficients, one per segment
    /// * `d` - constant coefficients, one per segment
    ///
    /// # Returns
    ///
    /// * `Result<CubicSpline>` - the spline, or an error if the arrays are inconsistent
    ///
    pub fn new(knots: Vec<f64>, a: Vec<f64>, b: Vec<f64>, c: Vec<f64>, d: Vec<f64>) -> Result<Self> {
        if knots.len() < 2 {
            return Err(IsotopeSplineError::InvalidArgument(format!(
                "a cubic spline needs at least two knots, got {}",
                knots.len()
            )));
        }

        if !knots.iter().tuple_windows().all(|(lo, hi)| lo < hi) {
            return Err(IsotopeSplineError::InvalidArgument(
                "spline knots must be strictly ascending".to_string(),
            ));
        }

        let segments = knots.len() - 1;
        for (name, coefficients) in [("a", &a), ("b", &b), ("c", &c), ("d", &d)] {
            if coefficients.len() != segments {
                return Err(IsotopeSplineError::LengthMismatch {
                    element: format!("coefficients.{}", name),
                    expected: segments,
                    found: coefficients.len(),
                });
            }
        }

        Ok(CubicSpline { knots, a, b, c, d })
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    pub fn num_segments(&self) -> usize {
        self.knots.len() - 1
    }

    pub fn min_x(&self) -> f64 {
        self.knots[0]
    }

    pub fn max_x(&self) -> f64 {
        self.knots[self.knots.len() - 1]
    }

    /// Coefficients of segment `i` in increasing order of power, `[d, c, b, a]`.
    pub fn segment_coefficients(&self, i: usize) -> [f64; 4] {
        [self.d[i], self.c[i], self.b[i], self.a[i]]
    }

    /// check if `x` lies within the knot range, both ends inclusive
    pub fn in_bounds(&self, x: f64) -> bool {
        x >= self.min_x() && x <= self.max_x()
    }

    /// evaluate the spline at `x`
    ///
    /// Arguments:
    ///
    /// * `x` - query point, callers must check `in_bounds` first
    ///
    /// Returns:
    ///
    /// * `f64` - spline value at `x`
    ///
    /// # Examples
    ///
    /// ```
    /// use isospline::algorithm::cubic_spline::CubicSpline;
    ///
    /// // f(x) = 1 + 2 t on [0, 1), then constant 3 on [1, 2]
    /// let spline = CubicSpline::new(
    ///     vec![0.0, 1.0, 2.0],
    ///     vec![0.0, 0.0],
    ///     vec![0.0, 0.0],
    ///     vec![2.0, 0.0],
    ///     vec![1.0, 3.0],
    /// ).unwrap();
    /// assert_eq!(spline.eval(0.5), 2.0);
    /// assert_eq!(spline.eval(2.0), 3.0);
    /// ```
    pub fn eval(&self, x: f64) -> f64 {
        let i = self.segment_index(x);
        let t = x - self.knots[i];
        self.d[i] + t * (self.c[i] + t * (self.b[i] + t * self.a[i]))
    }

    // index of the last knot <= x, clamped to the valid segment range
    fn segment_index(&self, x: f64) -> usize {
        let upper = self.knots.partition_point(|&k| k <= x);
        upper.saturating_sub(1).min(self.num_segments() - 1)
    }
}
