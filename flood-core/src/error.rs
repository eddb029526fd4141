use thiserror::Error;

/// Every way a prediction can fail.
///
/// The variants group into client errors (`InvalidInput`), upstream data
/// failures (`UpstreamUnavailable`, `UpstreamSchema`) and classification
/// failures (`InvalidFeatures`, `ModelUnavailable`). The server maps each
/// group onto one HTTP status.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FloodRiskError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("upstream provider unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream response did not match expected schema: {0}")]
    UpstreamSchema(String),

    #[error("invalid features: {0}")]
    InvalidFeatures(String),

    #[error("classifier model unavailable: {0}")]
    ModelUnavailable(String),
}

pub type Result<T> = std::result::Result<T, FloodRiskError>;
