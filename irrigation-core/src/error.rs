//! Error types for the computation core.

use crate::model::Variable;

/// Error type for all fallible operations of the geo, ETP and water balance modules.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// Returned when a parameter lies outside its physical or geometric domain.
    #[error("invalid {field}: {value} (expected {expected})")]
    InvalidInput {
        /// Name of the offending parameter.
        field: &'static str,
        /// The rejected value.
        value: f64,
        /// Human-readable description of the accepted domain.
        expected: &'static str,
    },

    /// Returned when a crop has no entry in a reference table.
    #[error("unknown crop '{crop}'")]
    UnknownCrop {
        /// The crop name that was looked up.
        crop: String,
    },

    /// Returned when a soil texture class has no usable-water coefficient.
    #[error("unknown soil texture '{texture}'")]
    UnknownTexture {
        /// The texture name that was looked up.
        texture: String,
    },

    /// Returned when a growth stage has no crop coefficient for the given crop.
    #[error("unknown growth stage '{stage}' for crop '{crop}'")]
    UnknownStage {
        /// The crop whose stages were searched.
        crop: String,
        /// The stage name that was looked up.
        stage: String,
    },

    /// Returned when a variable required by a computation is absent altogether.
    #[error("missing data: no '{variable}' values available")]
    MissingData {
        /// The absent variable.
        variable: Variable,
    },
}

/// Convenience alias used throughout the core.
pub type Result<T> = std::result::Result<T, CoreError>;
