//! Core library for the flood risk service.
//!
//! This crate defines:
//! - Configuration loading
//! - The `FeatureSource` abstraction over weather/elevation providers
//! - The pre-trained decision-tree classifier
//! - `FloodRiskService`, which ties a source and the classifier together
//!
//! It is used by `flood-server` for both the HTTP API and the CLI.

pub mod classifier;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod service;

pub use classifier::ClassifierModel;
pub use config::{Config, OpenMeteoConfig};
pub use error::FloodRiskError;
pub use model::{Coordinate, FeatureVector, Region, RiskLevel, RiskPrediction};
pub use provider::{FeatureSource, ProviderId};
pub use service::{FloodRiskService, LocationPrediction};
