//! Error types for model fitting and scoring.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    /// Fitting was asked to run on a matrix with no cells
    #[error("Cannot fit {family} on an empty interaction matrix")]
    EmptyTrainingData { family: &'static str },

    /// Parameters and the matrix they are applied to disagree in shape
    #[error("Shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The solver produced a non-finite value or hit a singular system
    #[error("Numerical failure: {0}")]
    Numerical(String),

    /// A family name that is neither "als" nor "lightfm"
    #[error("Unknown model family: {0}")]
    UnknownFamily(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
