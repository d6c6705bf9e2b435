use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, trace};

use crate::algorithm::cubic_spline::CubicSpline;
use crate::algorithm::isotope::{
    calculate_transmission_dependent_fragment_isotope_distribution, CoarseIsotopeEstimator, IsotopeEstimator,
};
use crate::config::IsotopeSplineConfig;
use crate::data::distribution::IsotopeDistribution;
use crate::error::{IsotopeSplineError, Result};
use crate::io::spline_xml::load_models_from_path;
use crate::model::collection::ModelCollection;

/// Spline backed isotope distributions with an exact fallback outside the trained domain.
///
/// # Description
///
/// A query is answered either entirely from the spline models or entirely from the
/// fallback estimator. Splines are used only when every model needed for the
/// requested depth contains the queried mass.
///
#[derive(Clone, Debug)]
pub struct IsotopeSplineStore<E: IsotopeEstimator = CoarseIsotopeEstimator> {
    collection: ModelCollection,
    estimator: E,
    min_mass: f64,
    max_mass: f64,
}

impl IsotopeSplineStore<CoarseIsotopeEstimator> {
    pub fn new(collection: ModelCollection) -> Self {
        IsotopeSplineStore::with_estimator(collection, CoarseIsotopeEstimator)
    }

    /// read models from a document, or from a bincode snapshot if the file ends in `.bin`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let collection = match path.extension().and_then(|e| e.to_str()) {
            Some("bin") => ModelCollection::load_binary(path)?,
            _ => load_models_from_path(path)?,
        };
        Ok(IsotopeSplineStore::new(collection))
    }

    pub fn from_config(config: &IsotopeSplineConfig) -> Result<Self> {
        IsotopeSplineStore::load(config.resolve_model_path())
    }
}

impl<E: IsotopeEstimator> IsotopeSplineStore<E> {
    pub fn with_estimator(collection: ModelCollection, estimator: E) -> Self {
        let (min_mass, max_mass) = collection.mass_range();
        debug!(
            "Isotope spline store covers {:.2} to {:.2} Da, depth {}, sulfur up to {}",
            min_mass,
            max_mass,
            collection.max_depth(),
            collection.max_sulfur()
        );
        IsotopeSplineStore {
            collection,
            estimator,
            min_mass,
            max_mass,
        }
    }

    pub fn min_mass(&self) -> f64 {
        self.min_mass
    }

    pub fn max_mass(&self) -> f64 {
        self.max_mass
    }

    /// largest number of isotopes a spline estimate can cover
    pub fn max_depth(&self) -> u32 {
        self.collection.max_depth()
    }

    pub fn max_sulfur(&self) -> u32 {
        self.collection.max_sulfur()
    }

    pub fn collection(&self) -> &ModelCollection {
        &self.collection
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// check whether the first `depth` isotope models all contain `mass`
    ///
    /// Arguments:
    ///
    /// * `mass` - average mass of the peptide
    /// * `depth` - number of isotopes requested, starting at the monoisotopic peak
    ///
    /// Returns:
    ///
    /// * `bool` - false for `depth == 0`, `depth > max_depth` or any model not containing `mass`
    ///
    pub fn in_model_bounds(&self, mass: f64, depth: u32) -> bool {
        if !self.depth_supported(depth) || mass < self.min_mass || mass > self.max_mass {
            return false;
        }
        (0..depth).all(|isotope| self.collection.model(isotope).map_or(false, |m| m.in_bounds(mass)))
    }

    /// as [`IsotopeSplineStore::in_model_bounds`] for the models trained on exactly `num_sulfur` sulfur atoms
    ///
    /// Only the slice for `num_sulfur` is consulted, other sulfur counts may cover a different mass range.
    pub fn in_model_bounds_with_sulfur(&self, mass: f64, depth: u32, num_sulfur: u32) -> bool {
        if num_sulfur > self.max_sulfur() || !self.depth_supported(depth) {
            return false;
        }
        (0..depth).all(|isotope| {
            self.collection
                .sulfur_model(isotope, num_sulfur)
                .map_or(false, |m| m.in_bounds(mass))
        })
    }

    /// isotope distribution of a peptide with the given average mass
    ///
    /// Arguments:
    ///
    /// * `mass` - average mass of the peptide
    /// * `depth` - number of isotopes
    ///
    /// Returns:
    ///
    /// * `IsotopeDistribution` - renormalized spline estimate, or the fallback estimate if out of bounds
    ///
    pub fn estimate_from_peptide_weight(&self, mass: f64, depth: u32) -> IsotopeDistribution {
        if !self.in_model_bounds(mass, depth) {
            debug!("Mass {:.4} at depth {} is outside the spline models, using fallback", mass, depth);
            return self.estimator.estimate_from_peptide_weight(mass, depth);
        }

        trace!("Evaluating {} spline models at {:.4}", depth, mass);
        spline_distribution(mass, (0..depth).filter_map(|i| self.collection.model(i)))
    }

    pub fn estimate_from_peptide_weight_and_s(&self, mass: f64, num_sulfur: u32, depth: u32) -> IsotopeDistribution {
        if !self.in_model_bounds_with_sulfur(mass, depth, num_sulfur) {
            debug!(
                "Mass {:.4} with {} sulfur at depth {} is outside the spline models, using fallback",
                mass, num_sulfur, depth
            );
            return self.estimator.estimate_from_peptide_weight_and_s(mass, num_sulfur, depth);
        }

        trace!("Evaluating {} sulfur specific models at {:.4} (S={})", depth, mass, num_sulfur);
        spline_distribution(
            mass,
            (0..depth).filter_map(|i| self.collection.sulfur_model(i, num_sulfur)),
        )
    }

    /// isotope distribution of a fragment when only some precursor isotopes were isolated
    ///
    /// Arguments:
    ///
    /// * `precursor_mass` - average mass of the precursor
    /// * `fragment_mass` - average mass of the fragment
    /// * `precursor_isotopes` - isolated precursor isotopes, must not be empty
    ///
    /// Returns:
    ///
    /// * `Result<IsotopeDistribution>` - conditional fragment distribution with `max(precursor_isotopes) + 1` peaks
    ///
    pub fn estimate_for_fragment_from_peptide_weight(
        &self,
        precursor_mass: f64,
        fragment_mass: f64,
        precursor_isotopes: &BTreeSet<u32>,
    ) -> Result<IsotopeDistribution> {
        let depth = fragment_depth(precursor_mass, fragment_mass, precursor_isotopes)?;

        let fragment = self.estimate_from_peptide_weight(fragment_mass, depth);
        let complement = self.estimate_from_peptide_weight(precursor_mass - fragment_mass, depth);

        Ok(calculate_transmission_dependent_fragment_isotope_distribution(
            &fragment,
            &complement,
            precursor_isotopes,
            depth as usize,
        ))
    }

    /// sulfur aware analogue of [`IsotopeSplineStore::estimate_for_fragment_from_peptide_weight`]
    ///
    /// The complementary fragment carries `precursor_sulfur - fragment_sulfur` sulfur atoms.
    pub fn estimate_for_fragment_from_peptide_weight_and_s(
        &self,
        precursor_mass: f64,
        precursor_sulfur: u32,
        fragment_mass: f64,
        fragment_sulfur: u32,
        precursor_isotopes: &BTreeSet<u32>,
    ) -> Result<IsotopeDistribution> {
        let depth = fragment_depth(precursor_mass, fragment_mass, precursor_isotopes)?;
        let complement_sulfur = precursor_sulfur.checked_sub(fragment_sulfur).ok_or_else(|| {
            IsotopeSplineError::InvalidArgument(format!(
                "fragment sulfur count {} exceeds precursor sulfur count {}",
                fragment_sulfur, precursor_sulfur
            ))
        })?;

        let fragment = self.estimate_from_peptide_weight_and_s(fragment_mass, fragment_sulfur, depth);
        let complement =
            self.estimate_from_peptide_weight_and_s(precursor_mass - fragment_mass, complement_sulfur, depth);

        Ok(calculate_transmission_dependent_fragment_isotope_distribution(
            &fragment,
            &complement,
            precursor_isotopes,
            depth as usize,
        ))
    }

    /// estimate many independent masses in parallel
    ///
    /// Arguments:
    ///
    /// * `masses` - average masses
    /// * `depth` - number of isotopes per estimate
    /// * `num_threads` - size of the rayon thread pool
    ///
    /// Returns:
    ///
    /// * `Result<Vec<IsotopeDistribution>>` - one distribution per mass, in input order
    ///
    pub fn estimate_from_peptide_weights(&self, masses: &[f64], depth: u32, num_threads: usize) -> Result<Vec<IsotopeDistribution>> {
        if num_threads == 0 {
            return Err(IsotopeSplineError::InvalidArgument("num_threads must be at least 1".to_string()));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| IsotopeSplineError::ThreadPool(e.to_string()))?;

        let distributions = pool.install(|| {
            masses
                .par_iter()
                .map(|&mass| self.estimate_from_peptide_weight(mass, depth))
                .collect()
        });

        Ok(distributions)
    }

    fn depth_supported(&self, depth: u32) -> bool {
        depth != 0 && depth <= self.max_depth()
    }
}

fn spline_distribution<'a>(mass: f64, models: impl Iterator<Item = &'a CubicSpline>) -> IsotopeDistribution {
    let probabilities = models.map(|model| model.eval(mass).max(0.0)).collect();
    let mut distribution =
        IsotopeDistribution::from_probabilities(IsotopeDistribution::nominal_mass(mass), probabilities);
    distribution.renormalize();
    distribution
}

fn fragment_depth(precursor_mass: f64, fragment_mass: f64, precursor_isotopes: &BTreeSet<u32>) -> Result<u32> {
    let max_isotope = precursor_isotopes
        .last()
        .ok_or_else(|| IsotopeSplineError::InvalidArgument("precursor isotope set is empty".to_string()))?;
    if fragment_mass > precursor_mass {
        return Err(IsotopeSplineError::InvalidArgument(format!(
            "fragment mass {} exceeds precursor mass {}",
            fragment_mass, precursor_mass
        )));
    }
    max_isotope.checked_add(1).ok_or_else(|| {
        IsotopeSplineError::InvalidArgument(format!("precursor isotope {} is too large", max_isotope))
    })
}

static SHARED_STORE: OnceLock<Result<Arc<IsotopeSplineStore>>> = OnceLock::new();

/// process wide store, loaded once on first use
///
/// Concurrent first callers block until one of them has finished loading. A failed
/// load is kept, so every later call returns the same error. The configuration is
/// only consulted by the call that performs the load.
pub fn shared_store(config: &IsotopeSplineConfig) -> Result<Arc<IsotopeSplineStore>> {
    SHARED_STORE
        .get_or_init(|| IsotopeSplineStore::from_config(config).map(Arc::new))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::key::ModelKey;
    use std::collections::BTreeMap;

    const KNOTS: [f64; 4] = [334.0, 3000.0, 6000.0, 9992.5];

    // isotope i has constant value 1 / (i + 1), sulfur models 1 / (i + s + 1)
    fn store(max_isotope: u32, max_sulfur: u32) -> IsotopeSplineStore {
        let constant = |value: f64| {
            CubicSpline::new(KNOTS.to_vec(), vec![0.0; 3], vec![0.0; 3], vec![0.0; 3], vec![value; 3]).unwrap()
        };
        let mut keyed = BTreeMap::new();
        for i in 0..=max_isotope {
            keyed.insert(ModelKey::new(i, None), constant(1.0 / (i + 1) as f64));
            for s in 0..=max_sulfur {
                keyed.insert(ModelKey::new(i, Some(s)), constant(1.0 / (i + s + 1) as f64));
            }
        }
        IsotopeSplineStore::new(ModelCollection::from_keyed(max_isotope, max_sulfur, keyed).unwrap())
    }

    fn isotopes(values: &[u32]) -> BTreeSet<u32> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_bounds_follow_knots() {
        let store = store(20, 2);
        assert_eq!(store.min_mass(), 334.0);
        assert_eq!(store.max_mass(), 9992.5);
        assert!(!store.in_model_bounds(333.0, 1));
        assert!(store.in_model_bounds(334.0, 1));
        assert!(store.in_model_bounds(5000.0, 1));
        assert!(store.in_model_bounds(9992.0, 1));
        assert!(!store.in_model_bounds(9993.0, 1));
    }

    #[test]
    fn test_depth_bounds() {
        let store = store(20, 2);
        assert_eq!(store.max_depth(), 21);
        assert!(!store.in_model_bounds(5000.0, 0));
        assert!(store.in_model_bounds(5000.0, 21));
        assert!(!store.in_model_bounds(5000.0, 22));
    }

    #[test]
    fn test_sulfur_bounds() {
        let store = store(4, 2);
        assert!(store.in_model_bounds_with_sulfur(5000.0, 5, 2));
        assert!(!store.in_model_bounds_with_sulfur(5000.0, 5, 3));
        assert!(!store.in_model_bounds_with_sulfur(5000.0, 6, 0));
        assert!(!store.in_model_bounds_with_sulfur(100.0, 1, 0));
    }

    #[test]
    fn test_sulfur_bounds_use_only_the_requested_slice() {
        let wide = CubicSpline::new(KNOTS.to_vec(), vec![0.0; 3], vec![0.0; 3], vec![0.0; 3], vec![0.5; 3]).unwrap();
        let narrow = CubicSpline::new(vec![2000.0, 3000.0], vec![0.0], vec![0.0], vec![0.0], vec![0.5]).unwrap();
        let mut keyed = BTreeMap::new();
        for i in 0..=1 {
            keyed.insert(ModelKey::new(i, None), wide.clone());
            keyed.insert(ModelKey::new(i, Some(0)), wide.clone());
            keyed.insert(ModelKey::new(i, Some(1)), narrow.clone());
        }
        let store = IsotopeSplineStore::new(ModelCollection::from_keyed(1, 1, keyed).unwrap());

        assert!(store.in_model_bounds_with_sulfur(5000.0, 2, 0));
        assert!(!store.in_model_bounds_with_sulfur(5000.0, 2, 1));
        assert!(store.in_model_bounds_with_sulfur(2500.0, 2, 1));
        assert_eq!(store.estimate_from_peptide_weight_and_s(5000.0, 0, 2).probabilities(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_spline_estimate_is_normalized() {
        let store = store(4, 0);
        let dist = store.estimate_from_peptide_weight(1500.4, 3);
        assert_eq!(dist.len(), 3);
        assert_eq!(dist.peaks[0].0, 1500);
        assert_eq!(dist.peaks[2].0, 1502);
        assert!((dist.total_probability() - 1.0).abs() < 1e-12);
        // 1 : 1/2 : 1/3
        assert!((dist.probability(0) - 6.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_spline_values_are_clamped() {
        let negative = CubicSpline::new(vec![100.0, 1000.0], vec![0.0], vec![0.0], vec![0.0], vec![-0.1]).unwrap();
        let positive = CubicSpline::new(vec![100.0, 1000.0], vec![0.0], vec![0.0], vec![0.0], vec![0.8]).unwrap();
        let mut keyed = BTreeMap::new();
        keyed.insert(ModelKey::new(0, None), positive.clone());
        keyed.insert(ModelKey::new(1, None), negative);
        keyed.insert(ModelKey::new(0, Some(0)), positive.clone());
        keyed.insert(ModelKey::new(1, Some(0)), positive);
        let store = IsotopeSplineStore::new(ModelCollection::from_keyed(1, 0, keyed).unwrap());

        let dist = store.estimate_from_peptide_weight(500.0, 2);
        assert_eq!(dist.probabilities(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_out_of_bounds_delegates_to_fallback() {
        let store = store(20, 2);
        let fallback = CoarseIsotopeEstimator;
        for (mass, depth) in [(333.0, 3), (9993.0, 3), (5000.0, 22), (5000.0, 0)] {
            assert_eq!(
                store.estimate_from_peptide_weight(mass, depth),
                fallback.estimate_from_peptide_weight(mass, depth)
            );
        }
        assert_eq!(
            store.estimate_from_peptide_weight_and_s(5000.0, 3, 4),
            fallback.estimate_from_peptide_weight_and_s(5000.0, 3, 4)
        );
    }

    #[test]
    fn test_sulfur_estimate_uses_sulfur_models() {
        let store = store(3, 2);
        let dist = store.estimate_from_peptide_weight_and_s(2000.0, 1, 2);
        // 1/2 : 1/3
        assert!((dist.probability(0) - 0.6).abs() < 1e-12);
        assert!((dist.probability(1) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_fragment_identity_at_precursor_mass() {
        let store = store(6, 0);
        let set = isotopes(&[0, 2]);
        let fragment = store.estimate_for_fragment_from_peptide_weight(2500.0, 2500.0, &set).unwrap();
        let precursor = store.estimate_from_peptide_weight(2500.0, 3);

        assert_eq!(fragment.len(), 3);
        assert_eq!(fragment.probability(0), precursor.probability(0));
        assert_eq!(fragment.probability(1), 0.0);
        assert_eq!(fragment.probability(2), precursor.probability(2));
    }

    #[test]
    fn test_fragment_rejects_invalid_arguments() {
        let store = store(4, 2);
        let empty = BTreeSet::new();
        assert!(matches!(
            store.estimate_for_fragment_from_peptide_weight(2000.0, 1000.0, &empty),
            Err(IsotopeSplineError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.estimate_for_fragment_from_peptide_weight(1000.0, 2000.0, &isotopes(&[0])),
            Err(IsotopeSplineError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.estimate_for_fragment_from_peptide_weight_and_s(2000.0, 1, 1000.0, 2, &isotopes(&[0])),
            Err(IsotopeSplineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_fragment_rejects_largest_isotope_index() {
        let store = store(4, 2);
        let set = isotopes(&[0, u32::MAX]);
        assert!(matches!(
            store.estimate_for_fragment_from_peptide_weight(500.0, 200.0, &set),
            Err(IsotopeSplineError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.estimate_for_fragment_from_peptide_weight_and_s(500.0, 1, 200.0, 0, &set),
            Err(IsotopeSplineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_fragment_with_sulfur() {
        let store = store(4, 2);
        let set = isotopes(&[0, 1]);
        let dist = store
            .estimate_for_fragment_from_peptide_weight_and_s(3000.0, 2, 1500.0, 1, &set)
            .unwrap();
        let fragment = store.estimate_from_peptide_weight_and_s(1500.0, 1, 2);
        let complement = store.estimate_from_peptide_weight_and_s(1500.0, 1, 2);

        let expected_0 = fragment.probability(0) * (complement.probability(0) + complement.probability(1));
        let expected_1 = fragment.probability(1) * complement.probability(0);
        assert!((dist.probability(0) - expected_0).abs() < 1e-12);
        assert!((dist.probability(1) - expected_1).abs() < 1e-12);
    }

    #[test]
    fn test_batch_matches_single_queries() {
        let store = store(5, 0);
        let masses = [200.0, 1000.0, 4500.5, 9992.5, 12000.0];
        let batch = store.estimate_from_peptide_weights(&masses, 4, 2).unwrap();
        for (mass, dist) in masses.iter().zip(batch.iter()) {
            assert_eq!(*dist, store.estimate_from_peptide_weight(*mass, 4));
        }
        assert!(matches!(
            store.estimate_from_peptide_weights(&masses, 4, 0),
            Err(IsotopeSplineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = IsotopeSplineStore::load("/nonexistent/IsotopeSplines.xml");
        assert!(matches!(result, Err(IsotopeSplineError::Io { .. })));
    }
}
