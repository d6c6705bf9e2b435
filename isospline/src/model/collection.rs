use std::collections::BTreeMap;
use std::path::Path;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::algorithm::cubic_spline::CubicSpline;
use crate::error::{IsotopeSplineError, Result};
use crate::model::key::{dense_index, ModelKey};

/// Precursor isotope models in dense, index addressable form.
///
/// # Description
///
/// `models[i]` approximates the probability of isotope `i` for any sulfur content.
/// `sulfur_specific[dense_index(i, s, max_isotope)]` is the model for isotope `i`
/// conditioned on exactly `s` sulfur atoms. Both vectors are complete for
/// `0..=max_isotope` and `0..=max_sulfur`.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct ModelCollection {
    max_isotope: u32,
    max_sulfur: u32,
    models: Vec<CubicSpline>,
    sulfur_specific: Vec<CubicSpline>,
}

impl ModelCollection {
    /// Builds the dense vectors from keyed models.
    ///
    /// Every sulfur independent isotope `0..=max_isotope` and every sulfur specific
    /// pair up to `max_sulfur` must be present; keys beyond the declared bounds are rejected.
    pub fn from_keyed(max_isotope: u32, max_sulfur: u32, mut keyed: BTreeMap<ModelKey, CubicSpline>) -> Result<Self> {
        if let Some(key) = keyed
            .keys()
            .find(|k| k.isotope > max_isotope || k.num_sulfur.map_or(false, |s| s > max_sulfur))
        {
            return Err(IsotopeSplineError::parse(
                0,
                format!(
                    "model {} exceeds the declared bounds (maxIsotope {}, maxSulfur {})",
                    key, max_isotope, max_sulfur
                ),
            ));
        }

        let mut models = Vec::with_capacity(max_isotope as usize + 1);
        for isotope in 0..=max_isotope {
            let spline = keyed
                .remove(&ModelKey::new(isotope, None))
                .ok_or(IsotopeSplineError::MissingModel { isotope, num_sulfur: None })?;
            models.push(spline);
        }

        // sulfur major, so the vector position equals dense_index
        let mut sulfur_specific = Vec::with_capacity((max_sulfur as usize + 1) * (max_isotope as usize + 1));
        for num_sulfur in 0..=max_sulfur {
            for isotope in 0..=max_isotope {
                let spline = keyed
                    .remove(&ModelKey::new(isotope, Some(num_sulfur)))
                    .ok_or(IsotopeSplineError::MissingModel {
                        isotope,
                        num_sulfur: Some(num_sulfur),
                    })?;
                sulfur_specific.push(spline);
            }
        }

        Ok(ModelCollection {
            max_isotope,
            max_sulfur,
            models,
            sulfur_specific,
        })
    }

    pub fn max_isotope(&self) -> u32 {
        self.max_isotope
    }

    pub fn max_sulfur(&self) -> u32 {
        self.max_sulfur
    }

    /// number of isotopes a single query can request
    pub fn max_depth(&self) -> u32 {
        self.max_isotope + 1
    }

    pub fn model(&self, isotope: u32) -> Option<&CubicSpline> {
        self.models.get(isotope as usize)
    }

    pub fn sulfur_model(&self, isotope: u32, num_sulfur: u32) -> Option<&CubicSpline> {
        if isotope > self.max_isotope || num_sulfur > self.max_sulfur {
            return None;
        }
        self.sulfur_specific.get(dense_index(isotope, num_sulfur, self.max_isotope))
    }

    /// largest isotope index as implied by the populated vectors
    pub fn derived_max_isotope(&self) -> u32 {
        self.models.len().saturating_sub(1) as u32
    }

    /// largest sulfur count as implied by the populated vectors
    pub fn derived_max_sulfur(&self) -> u32 {
        let per_sulfur = self.models.len().max(1);
        (self.sulfur_specific.len() / per_sulfur).saturating_sub(1) as u32
    }

    /// all models with their keys, in key order
    pub fn iter(&self) -> impl Iterator<Item = (ModelKey, &CubicSpline)> + '_ {
        let per_sulfur = self.max_isotope as usize + 1;
        let independent = self
            .models
            .iter()
            .enumerate()
            .map(|(i, m)| (ModelKey::new(i as u32, None), m));
        let specific = self.sulfur_specific.iter().enumerate().map(move |(index, m)| {
            let isotope = (index % per_sulfur) as u32;
            let num_sulfur = (index / per_sulfur) as u32;
            (ModelKey::new(isotope, Some(num_sulfur)), m)
        });
        let mut all: Vec<_> = independent.chain(specific).collect();
        all.sort_by_key(|(key, _)| *key);
        all.into_iter()
    }

    pub fn len(&self) -> usize {
        self.models.len() + self.sulfur_specific.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mass range in which every sulfur independent model is defined, `(min, max)`.
    pub fn mass_range(&self) -> (f64, f64) {
        knot_intersection(self.models.iter())
    }

    /// write the collection as a bincode snapshot
    pub fn save_binary(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| IsotopeSplineError::Serialization(e.to_string()))?;
        std::fs::write(path, &bytes).map_err(|e| IsotopeSplineError::io(path, &e))?;
        info!("Wrote {} models ({} bytes) to {}", self.len(), bytes.len(), path.display());
        Ok(())
    }

    /// read a collection written by [`ModelCollection::save_binary`]
    pub fn load_binary(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| IsotopeSplineError::io(path, &e))?;
        let (collection, _): (ModelCollection, usize) = bincode::decode_from_slice(&bytes, bincode::config::standard())
            .map_err(|e| IsotopeSplineError::Serialization(e.to_string()))?;
        info!("Read {} models from snapshot {}", collection.len(), path.display());
        Ok(collection)
    }
}

fn knot_intersection<'a>(models: impl Iterator<Item = &'a CubicSpline>) -> (f64, f64) {
    models.fold((f64::NEG_INFINITY, f64::INFINITY), |(lo, hi), m| {
        (lo.max(m.min_x()), hi.min(m.max_x()))
    })
}
