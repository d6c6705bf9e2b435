use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::algorithm::tensor_spline::TensorProductSpline;
use crate::config::FragmentModelConfig;
use crate::data::distribution::IsotopeDistribution;
use crate::error::{IsotopeSplineError, Result};
use crate::io::spline_xml::load_fragment_models_from_path;
use crate::model::key::FragmentModelKey;

/// Tensor-product models as read from a `fragmentModels` document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FragmentModelSet {
    pub max_isotope: u32,
    pub models: BTreeMap<FragmentModelKey, TensorProductSpline>,
}

/// Sulfur and selenium content of a fragment and its complement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FragmentComposition {
    pub num_sulfur: u32,
    pub num_comp_sulfur: u32,
    pub num_selenium: u32,
    pub num_comp_selenium: u32,
}

impl FragmentComposition {
    fn key(&self, precursor_isotope: u32, fragment_isotope: u32) -> FragmentModelKey {
        FragmentModelKey {
            precursor_isotope,
            fragment_isotope,
            num_sulfur: self.num_sulfur,
            num_comp_sulfur: self.num_comp_sulfur,
            num_selenium: self.num_selenium,
            num_comp_selenium: self.num_comp_selenium,
        }
    }
}

/// Fragment isotope distributions evaluated directly from bicubic surfaces over
/// precursor and fragment mass.
#[derive(Clone, Debug)]
pub struct FragmentIsotopeModel {
    set: FragmentModelSet,
    config: FragmentModelConfig,
}

impl FragmentIsotopeModel {
    pub fn new(set: FragmentModelSet, config: FragmentModelConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            "Fragment isotope model with {} surfaces, precursor {}..{} Da, fragment {}..{} Da",
            set.models.len(),
            config.min_precursor_mass,
            config.max_precursor_mass,
            config.min_fragment_mass,
            config.max_fragment_mass
        );
        Ok(FragmentIsotopeModel { set, config })
    }

    pub fn load(config: &FragmentModelConfig) -> Result<Self> {
        let set = load_fragment_models_from_path(config.resolve_model_path())?;
        FragmentIsotopeModel::new(set, config.clone())
    }

    pub fn max_isotope(&self) -> u32 {
        self.set.max_isotope
    }

    pub fn len(&self) -> usize {
        self.set.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.models.is_empty()
    }

    pub fn model(&self, key: &FragmentModelKey) -> Option<&TensorProductSpline> {
        self.set.models.get(key)
    }

    /// True if both masses are inside the trained range and a surface exists for
    /// every `(p, f)` with `p` in `precursor_isotopes` and `f <= p`.
    pub fn in_model_bounds(
        &self,
        precursor_mass: f64,
        fragment_mass: f64,
        precursor_isotopes: &BTreeSet<u32>,
        composition: &FragmentComposition,
    ) -> bool {
        let config = &self.config;
        let Some(&largest) = precursor_isotopes.last() else {
            return false;
        };
        if largest > self.set.max_isotope || fragment_mass >= precursor_mass {
            return false;
        }
        if precursor_mass < config.min_precursor_mass || precursor_mass > config.max_precursor_mass {
            return false;
        }
        if fragment_mass < config.min_fragment_mass || fragment_mass > config.max_fragment_mass {
            return false;
        }
        precursor_isotopes
            .iter()
            .all(|&p| (0..=p).all(|f| self.set.models.contains_key(&composition.key(p, f))))
    }

    /// conditional fragment isotope distribution for the isolated precursor isotopes
    ///
    /// Arguments:
    ///
    /// * `precursor_mass` - average mass of the precursor
    /// * `fragment_mass` - average mass of the fragment
    /// * `precursor_isotopes` - isolated precursor isotopes, not empty and at most `max_isotope`
    /// * `composition` - sulfur and selenium counts selecting the surfaces
    ///
    /// Returns:
    ///
    /// * `Result<IsotopeDistribution>` - `max(precursor_isotopes) + 1` peaks, surfaces that are missing
    ///   or out of their domain contribute zero
    ///
    pub fn approximate_isotope_distribution(
        &self,
        precursor_mass: f64,
        fragment_mass: f64,
        precursor_isotopes: &BTreeSet<u32>,
        composition: &FragmentComposition,
    ) -> Result<IsotopeDistribution> {
        let largest = *precursor_isotopes
            .last()
            .ok_or_else(|| IsotopeSplineError::InvalidArgument("precursor isotope set is empty".to_string()))?;
        if fragment_mass > precursor_mass {
            return Err(IsotopeSplineError::InvalidArgument(format!(
                "fragment mass {} exceeds precursor mass {}",
                fragment_mass, precursor_mass
            )));
        }
        if largest > self.set.max_isotope {
            return Err(IsotopeSplineError::InvalidArgument(format!(
                "precursor isotope {} exceeds the modelled maximum {}",
                largest, self.set.max_isotope
            )));
        }

        let mut probabilities = vec![0.0; largest as usize + 1];
        for &p in precursor_isotopes {
            for f in 0..=p {
                match self.set.models.get(&composition.key(p, f)) {
                    Some(model) => {
                        probabilities[f as usize] += model.evaluate_fragment(precursor_mass, fragment_mass).max(0.0);
                    }
                    None => trace!("No fragment surface for precursor isotope {} fragment isotope {}", p, f),
                }
            }
        }

        Ok(IsotopeDistribution::from_probabilities(
            IsotopeDistribution::nominal_mass(fragment_mass),
            probabilities,
        ))
    }
}
