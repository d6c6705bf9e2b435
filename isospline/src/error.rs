use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IsotopeSplineError>;

/// Errors raised while loading spline models or validating caller input.
///
/// Out-of-domain queries are not errors, they are answered by the fallback estimator.
/// The type is `Clone` so a failed shared load can be reported to every caller.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum IsotopeSplineError {
    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("parse error at byte {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("only splines of order 4 are supported, found order {0}")]
    UnsupportedOrder(u32),

    #[error("length mismatch in <{element}>: expected {expected} values, found {found}")]
    LengthMismatch {
        element: String,
        expected: usize,
        found: usize,
    },

    #[error("model for isotope {isotope} (sulfur {num_sulfur:?}) is missing")]
    MissingModel {
        isotope: u32,
        num_sulfur: Option<u32>,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),
}

impl IsotopeSplineError {
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        IsotopeSplineError::Parse {
            position,
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        IsotopeSplineError::Io {
            path: path.into(),
            message: error.to_string(),
        }
    }

    /// True for every error class that marks a model document as unusable.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            IsotopeSplineError::Parse { .. }
                | IsotopeSplineError::UnsupportedOrder(_)
                | IsotopeSplineError::LengthMismatch { .. }
                | IsotopeSplineError::MissingModel { .. }
        )
    }
}
