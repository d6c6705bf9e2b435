use std::collections::BTreeSet;

use crate::chemistry::constants::{
    AVERAGINE_C, AVERAGINE_H, AVERAGINE_N, AVERAGINE_O, AVERAGINE_RESIDUE_MASS, AVERAGINE_S,
};
use crate::chemistry::elements::Element;
use crate::data::distribution::IsotopeDistribution;

// tail entries below this are dropped when no isotope limit is set
const ABUNDANCE_THRESHOLD: f64 = 1e-12;

/// Exact isotope distribution estimates used outside the trained spline domain.
pub trait IsotopeEstimator: Send + Sync {
    /// isotope distribution of an averagine peptide of the given average mass
    ///
    /// A `max_depth` of zero means no limit on the number of isotopes.
    fn estimate_from_peptide_weight(&self, average_weight: f64, max_depth: u32) -> IsotopeDistribution;

    /// isotope distribution of an averagine peptide with a fixed number of sulfur atoms
    fn estimate_from_peptide_weight_and_s(&self, average_weight: f64, num_sulfur: u32, max_depth: u32) -> IsotopeDistribution;
}

/// Averagine based estimator that convolves element isotope patterns on nominal masses.
#[derive(Clone, Copy, Debug, Default)]
pub struct CoarseIsotopeEstimator;

impl IsotopeEstimator for CoarseIsotopeEstimator {
    fn estimate_from_peptide_weight(&self, average_weight: f64, max_depth: u32) -> IsotopeDistribution {
        let composition = averagine_composition(average_weight);
        composition_to_distribution(average_weight, &composition, max_depth as usize)
    }

    fn estimate_from_peptide_weight_and_s(&self, average_weight: f64, num_sulfur: u32, max_depth: u32) -> IsotopeDistribution {
        let composition = averagine_composition_with_sulfur(average_weight, num_sulfur);
        composition_to_distribution(average_weight, &composition, max_depth as usize)
    }
}

/// convolve two isotope distributions given on nominal mass offsets
///
/// Arguments:
///
/// * `dist_a` - first distribution, index `k` is the abundance of `k` extra neutrons
/// * `dist_b` - second distribution, same layout
/// * `max_isotope` - maximum number of isotopes to keep, 0 keeps all
///
/// Returns:
///
/// * `Vec<f64>` - combined distribution
///
/// # Examples
///
/// ```
/// use isospline::algorithm::isotope::convolve;
///
/// let dist_a = vec![0.5, 0.5];
/// let dist_b = vec![0.5, 0.5];
/// let result = convolve(&dist_a, &dist_b, 0);
/// assert_eq!(result, vec![0.25, 0.5, 0.25]);
/// ```
pub fn convolve(dist_a: &[f64], dist_b: &[f64], max_isotope: usize) -> Vec<f64> {
    if dist_a.is_empty() || dist_b.is_empty() {
        return Vec::new();
    }

    let mut len = dist_a.len() + dist_b.len() - 1;
    if max_isotope != 0 {
        len = len.min(max_isotope);
    }

    let mut result = vec![0.0; len];
    for (i, &abundance_a) in dist_a.iter().enumerate().take(len) {
        for (j, &abundance_b) in dist_b.iter().enumerate().take(len - i) {
            result[i + j] += abundance_a * abundance_b;
        }
    }

    if max_isotope == 0 {
        while result.len() > 1 && result[result.len() - 1] < ABUNDANCE_THRESHOLD {
            result.pop();
        }
    }

    result
}

/// convolve a distribution with itself n times
///
/// Arguments:
///
/// * `dist` - distribution on nominal mass offsets
/// * `n` - number of copies, e.g. the atom count of an element
/// * `max_isotope` - maximum number of isotopes to keep, 0 keeps all
///
/// Returns:
///
/// * `Vec<f64>` - distribution of `n` independent copies
///
/// # Examples
///
/// ```
/// use isospline::algorithm::isotope::convolve_pow;
///
/// let dist = vec![0.5, 0.5];
/// let result = convolve_pow(&dist, 2, 0);
/// assert_eq!(result, vec![0.25, 0.5, 0.25]);
/// ```
pub fn convolve_pow(dist: &[f64], n: u32, max_isotope: usize) -> Vec<f64> {
    let mut result = vec![1.0];
    let mut base = dist.to_vec();
    let mut n = n;

    // square and multiply
    while n > 0 {
        if n & 1 == 1 {
            result = convolve(&result, &base, max_isotope);
        }
        n >>= 1;
        if n > 0 {
            base = convolve(&base, &base, max_isotope);
        }
    }

    result
}

/// estimate an averagine sum formula for a peptide of the given average mass
///
/// Carbon, nitrogen, oxygen and sulfur counts are rounded, hydrogen fills up the
/// remaining mass. Non-positive masses give an empty formula.
pub fn averagine_composition(average_weight: f64) -> Vec<(Element, u32)> {
    if average_weight <= 0.0 {
        return Vec::new();
    }

    let residues = average_weight / AVERAGINE_RESIDUE_MASS;
    let heavy = [
        (Element::C, AVERAGINE_C),
        (Element::N, AVERAGINE_N),
        (Element::O, AVERAGINE_O),
        (Element::S, AVERAGINE_S),
    ];
    fill_with_hydrogen(average_weight, residues, &heavy, Vec::new())
}

/// estimate an averagine sum formula with a fixed number of sulfur atoms
///
/// The mass left after the sulfur atoms is spread over C, H, N and O in averagine ratios.
pub fn averagine_composition_with_sulfur(average_weight: f64, num_sulfur: u32) -> Vec<(Element, u32)> {
    if average_weight <= 0.0 {
        return Vec::new();
    }

    let sulfur = vec![(Element::S, num_sulfur)];
    let remaining = average_weight - num_sulfur as f64 * Element::S.average_weight();
    if remaining <= 0.0 {
        return sulfur;
    }

    let residue_mass_without_s = AVERAGINE_RESIDUE_MASS - AVERAGINE_S * Element::S.average_weight();
    let residues = remaining / residue_mass_without_s;
    let heavy = [
        (Element::C, AVERAGINE_C),
        (Element::N, AVERAGINE_N),
        (Element::O, AVERAGINE_O),
    ];
    fill_with_hydrogen(remaining, residues, &heavy, sulfur)
}

fn fill_with_hydrogen(
    mass: f64,
    residues: f64,
    heavy: &[(Element, f64)],
    mut composition: Vec<(Element, u32)>,
) -> Vec<(Element, u32)> {
    let mut heavy_mass = 0.0;
    for &(element, per_residue) in heavy {
        let count = (per_residue * residues).round().max(0.0) as u32;
        heavy_mass += count as f64 * element.average_weight();
        composition.push((element, count));
    }

    let hydrogen = ((mass - heavy_mass) / Element::H.average_weight()).round().max(0.0) as u32;
    composition.push((Element::H, hydrogen));
    composition
}

/// isotope distribution of a sum formula, labelled with the nominal mass of `average_weight`
///
/// Arguments:
///
/// * `average_weight` - mass used for the nominal mass labels
/// * `composition` - atom counts per element
/// * `max_depth` - number of isotopes to report, 0 reports all above the abundance threshold
///
/// Returns:
///
/// * `IsotopeDistribution` - normalized distribution with exactly `max_depth` peaks if `max_depth > 0`
///
pub fn composition_to_distribution(average_weight: f64, composition: &[(Element, u32)], max_depth: usize) -> IsotopeDistribution {
    let mut probabilities = vec![1.0];

    for &(element, count) in composition {
        if count == 0 {
            continue;
        }
        let element_distribution = convolve_pow(element.nominal_abundances(), count, max_depth);
        probabilities = convolve(&probabilities, &element_distribution, max_depth);
    }

    if max_depth != 0 {
        probabilities.resize(max_depth, 0.0);
    }

    let mut distribution = IsotopeDistribution::from_probabilities(
        IsotopeDistribution::nominal_mass(average_weight),
        probabilities,
    );
    distribution.renormalize();
    distribution
}

/// Calculates the isotope distribution of a fragment given the isotope distribution of the fragment,
/// the isotope distribution of the complementary fragment, and the transmitted precursor isotopes.
///
/// Isotope `i` of the fragment is observed with probability
/// `fragment[i] * sum(complement[p - i] for p in precursor_isotopes if p >= i)`.
/// The result is a conditional distribution and is not renormalized.
///
/// Arguments:
///
/// * `fragment_isotope_dist` - isotope distribution of the fragment
/// * `comp_fragment_isotope_dist` - isotope distribution of the complementary fragment
/// * `precursor_isotopes` - isotopes of the precursor that were isolated
/// * `max_isotope` - maximum number of fragment isotopes to report, 0 reports all
///
/// Returns:
///
/// * `IsotopeDistribution` - fragment isotope distribution conditioned on the isolated precursor isotopes
///
pub fn calculate_transmission_dependent_fragment_isotope_distribution(
    fragment_isotope_dist: &IsotopeDistribution,
    comp_fragment_isotope_dist: &IsotopeDistribution,
    precursor_isotopes: &BTreeSet<u32>,
    max_isotope: usize,
) -> IsotopeDistribution {
    if fragment_isotope_dist.is_empty() || comp_fragment_isotope_dist.is_empty() {
        return IsotopeDistribution::default();
    }

    let mut r_max = fragment_isotope_dist.len();
    if max_isotope != 0 && r_max > max_isotope {
        r_max = max_isotope;
    }

    let nominal_mass = fragment_isotope_dist.peaks[0].0;
    let mut result = IsotopeDistribution::from_probabilities(nominal_mass, vec![0.0; r_max]);

    for (i, &(_, probability)) in fragment_isotope_dist.peaks.iter().enumerate().take(r_max) {
        let mut transmitted = 0.0;
        for &precursor in precursor_isotopes {
            let precursor = precursor as usize;
            if precursor >= i && (precursor - i) < comp_fragment_isotope_dist.len() {
                transmitted += comp_fragment_isotope_dist.peaks[precursor - i].1;
            }
        }
        result.peaks[i].1 = transmitted * probability;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convolve_truncates() {
        let result = convolve(&[0.5, 0.5], &[0.5, 0.5], 2);
        assert_eq!(result, vec![0.25, 0.5]);
    }

    #[test]
    fn test_convolve_pow_zero_is_delta() {
        assert_eq!(convolve_pow(&[0.9, 0.1], 0, 0), vec![1.0]);
    }

    #[test]
    fn test_convolve_pow_matches_binomial() {
        // carbon only: P(k) = C(n, k) p^k q^(n - k)
        let n = 50;
        let result = convolve_pow(Element::C.nominal_abundances(), n, 3);
        let q: f64 = 0.9893;
        let p: f64 = 0.0107;
        let expected = [
            q.powi(50),
            50.0 * p * q.powi(49),
            1225.0 * p.powi(2) * q.powi(48),
        ];
        for (r, e) in result.iter().zip(expected.iter()) {
            assert!((r - e).abs() < 1e-12);
        }
    }

    #[test]
    fn test_averagine_composition_mass() {
        let composition = averagine_composition(2000.0);
        let mass: f64 = composition.iter().map(|(e, n)| e.average_weight() * *n as f64).sum();
        assert!((mass - 2000.0).abs() < 1.0);
    }

    #[test]
    fn test_sulfur_composition_keeps_sulfur_count() {
        let composition = averagine_composition_with_sulfur(3000.0, 4);
        assert!(composition.contains(&(Element::S, 4)));
        let mass: f64 = composition.iter().map(|(e, n)| e.average_weight() * *n as f64).sum();
        assert!((mass - 3000.0).abs() < 1.0);
    }

    #[test]
    fn test_estimate_has_requested_depth_and_sums_to_one() {
        let estimator = CoarseIsotopeEstimator;
        let dist = estimator.estimate_from_peptide_weight(1500.0, 5);
        assert_eq!(dist.len(), 5);
        assert_eq!(dist.peaks[0].0, 1500);
        assert!((dist.total_probability() - 1.0).abs() < 1e-12);
        // monoisotopic peak dominates at this mass
        assert!(dist.probability(0) > dist.probability(1));
    }

    #[test]
    fn test_estimate_heavy_peptide_shifts_maximum() {
        let estimator = CoarseIsotopeEstimator;
        let dist = estimator.estimate_from_peptide_weight(6000.0, 6);
        assert!(dist.probability(2) > dist.probability(0));
    }

    #[test]
    fn test_more_sulfur_raises_second_isotope() {
        let estimator = CoarseIsotopeEstimator;
        let low = estimator.estimate_from_peptide_weight_and_s(2000.0, 0, 4);
        let high = estimator.estimate_from_peptide_weight_and_s(2000.0, 5, 4);
        assert!(high.probability(2) > low.probability(2));
    }

    #[test]
    fn test_zero_mass_is_delta() {
        let estimator = CoarseIsotopeEstimator;
        let dist = estimator.estimate_from_peptide_weight(0.0, 3);
        assert_eq!(dist.peaks, vec![(0, 1.0), (1, 0.0), (2, 0.0)]);
    }

    #[test]
    fn test_extreme_masses_do_not_overflow_labels() {
        let estimator = CoarseIsotopeEstimator;
        for mass in [5.0e9, f64::INFINITY] {
            let dist = estimator.estimate_from_peptide_weight(mass, 3);
            assert_eq!(dist.len(), 3);
            assert!(dist.peaks.iter().all(|&(label, _)| label == u32::MAX));
            let dist = estimator.estimate_from_peptide_weight_and_s(mass, 2, 3);
            assert_eq!(dist.len(), 3);
        }
    }

    #[test]
    fn test_unlimited_depth_is_trimmed() {
        let estimator = CoarseIsotopeEstimator;
        let dist = estimator.estimate_from_peptide_weight(1000.0, 0);
        assert!(dist.len() > 3);
        assert!(dist.len() < 200);
        assert!((dist.total_probability() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_transmission_dependent_distribution() {
        let fragment = IsotopeDistribution::from_probabilities(500, vec![0.6, 0.3, 0.1]);
        let complement = IsotopeDistribution::from_probabilities(700, vec![0.5, 0.4, 0.1]);
        let isotopes: BTreeSet<u32> = [0, 1].into_iter().collect();

        let result = calculate_transmission_dependent_fragment_isotope_distribution(&fragment, &complement, &isotopes, 0);

        assert_eq!(result.len(), 3);
        assert_eq!(result.peaks[0].0, 500);
        // i = 0: p = 0 -> c[0], p = 1 -> c[1]
        assert!((result.probability(0) - 0.6 * (0.5 + 0.4)).abs() < 1e-12);
        // i = 1: p = 1 -> c[0]
        assert!((result.probability(1) - 0.3 * 0.5).abs() < 1e-12);
        assert_eq!(result.probability(2), 0.0);
    }

    #[test]
    fn test_transmission_with_delta_complement_selects_isotopes() {
        let fragment = IsotopeDistribution::from_probabilities(900, vec![0.5, 0.3, 0.2]);
        let complement = IsotopeDistribution::from_probabilities(0, vec![1.0, 0.0, 0.0]);
        let isotopes: BTreeSet<u32> = [0, 2].into_iter().collect();

        let result = calculate_transmission_dependent_fragment_isotope_distribution(&fragment, &complement, &isotopes, 0);
        assert_eq!(result.probabilities(), vec![0.5, 0.0, 0.2]);
    }
}
