//! Error types for the forecasting and risk-scoring core.
//!
//! Every failure the core can produce is a [`CoreError`]. Callers that only
//! care about the broad category can match on [`CoreError::kind`].

use thiserror::Error;

/// Broad failure category used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Insufficient or malformed input series / feature vectors.
    Data,
    /// Operating on an untrained or dimensionally mismatched model.
    ModelState,
    /// Invalid persona, exposure, horizon or tuning parameter.
    Configuration,
    /// Internal invariant broken (advice table hole, probabilities off).
    Consistency,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("malformed time series: {0}")]
    MalformedSeries(String),

    #[error("invalid measurement for {field}: {value}")]
    InvalidMeasurement { field: &'static str, value: f64 },

    #[error("no trained model for '{0}'")]
    ModelNotTrained(String),

    #[error("feature vector has {actual} features, scaler was fitted on {expected}")]
    FeatureScalerMismatch { expected: usize, actual: usize },

    #[error("training examples do not cover risk categories: {missing:?}")]
    InsufficientClassCoverage { missing: Vec<String> },

    #[error("unknown persona '{0}'")]
    InvalidPersona(String),

    #[error("exposure of {0} hours is outside [0, 24]")]
    InvalidExposure(f64),

    #[error("forecast horizon must be at least 1, got {0}")]
    InvalidHorizon(usize),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("no advice template for ({category}, {persona})")]
    MissingAdviceTemplate { category: String, persona: String },

    #[error("probabilities sum to {0}, expected 1")]
    ProbabilityNotNormalized(f64),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InsufficientData { .. }
            | CoreError::MalformedSeries(_)
            | CoreError::InvalidMeasurement { .. }
            | CoreError::InsufficientClassCoverage { .. } => ErrorKind::Data,
            CoreError::ModelNotTrained(_)
            | CoreError::FeatureScalerMismatch { .. }
            | CoreError::Persistence(_) => ErrorKind::ModelState,
            CoreError::InvalidPersona(_)
            | CoreError::InvalidExposure(_)
            | CoreError::InvalidHorizon(_)
            | CoreError::InvalidParameter { .. } => ErrorKind::Configuration,
            CoreError::MissingAdviceTemplate { .. } | CoreError::ProbabilityNotNormalized(_) => {
                ErrorKind::Consistency
            }
        }
    }

    pub(crate) fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        CoreError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Errors that can occur while saving or loading trained artifacts
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("model file not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("model version mismatch: expected v{expected}, found v{found}")]
    VersionMismatch { expected: u32, found: u32 },
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
