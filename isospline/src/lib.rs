//! Spline-approximated isotope distributions for peptides and their fragments.
//!
//! Precomputed cubic and tensor-product spline models give fast isotope envelopes
//! for an average mass. Queries outside the trained domain are answered by the
//! exact coarse estimator in [`algorithm::isotope`].

pub mod error;
pub mod config;

// chemistry module
pub mod chemistry {
    pub mod constants;
    pub mod elements;
}

// algorithm module
pub mod algorithm {
    pub mod cubic_spline;
    pub mod tensor_spline;
    pub mod isotope;
}

// data module
pub mod data {
    pub mod distribution;
}

// io module
pub mod io {
    pub mod binary_array;
    pub mod spline_xml;
}

// model module
pub mod model {
    pub mod key;
    pub mod collection;
    pub mod store;
    pub mod fragment;
}

pub use config::{FragmentModelConfig, IsotopeSplineConfig};
pub use data::distribution::IsotopeDistribution;
pub use error::{IsotopeSplineError, Result};
pub use model::store::{shared_store, IsotopeSplineStore};
