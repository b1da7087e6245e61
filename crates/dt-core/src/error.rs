//! Error types for Dompteur

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum DompteurError {
    /// The external estimator failed, produced nothing, or produced an
    /// unusable surface. Fatal for the owning identifier.
    #[error("Threshold computation failed: {0}")]
    ThresholdComputation(String),

    /// Exchanged array shapes do not agree with what the paired call expects.
    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DompteurError {
    /// Shorthand used by the shape checks scattered across the crates
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    pub fn threshold(msg: impl Into<String>) -> Self {
        Self::ThresholdComputation(msg.into())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, DompteurError>;
