use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FloodRiskError, Result};

/// A validated latitude/longitude pair.
///
/// The only way to build one is [`Coordinate::new`], so every value that
/// reaches a [`FeatureSource`](crate::FeatureSource) is within range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(FloodRiskError::InvalidInput(format!(
                "latitude {latitude} is outside [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(FloodRiskError::InvalidInput(format!(
                "longitude {longitude} is outside [-180, 180]"
            )));
        }

        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

/// Bounding box of the area the deployed model was trained for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Region {
    /// Kerala, India.
    pub const KERALA: Region = Region {
        min_lat: 8.2,
        max_lat: 12.8,
        min_lon: 74.8,
        max_lon: 77.5,
    };

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        (self.min_lat..=self.max_lat).contains(&coordinate.latitude())
            && (self.min_lon..=self.max_lon).contains(&coordinate.longitude())
    }

    pub fn validate(&self) -> Result<()> {
        Coordinate::new(self.min_lat, self.min_lon)?;
        Coordinate::new(self.max_lat, self.max_lon)?;

        if self.min_lat > self.max_lat || self.min_lon > self.max_lon {
            return Err(FloodRiskError::InvalidInput(format!(
                "region bounds are inverted: lat {}..{}, lon {}..{}",
                self.min_lat, self.max_lat, self.min_lon, self.max_lon
            )));
        }

        Ok(())
    }
}

/// The three inputs the classifier consumes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Precipitation total over the lookup window, in millimetres.
    pub rainfall: f64,
    /// Volumetric water content of the top soil layer, m³/m³.
    pub soil_moisture: f64,
    /// Metres above sea level.
    pub elevation: f64,
}

impl FeatureVector {
    /// Feature names in the order the classifier indexes them.
    pub const NAMES: [&'static str; 3] = ["rainfall", "soil_moisture", "elevation"];

    pub fn new(rainfall: f64, soil_moisture: f64, elevation: f64) -> Result<Self> {
        let features = Self {
            rainfall,
            soil_moisture,
            elevation,
        };
        features.validate()?;
        Ok(features)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in Self::NAMES.iter().zip(self.as_array()) {
            if !value.is_finite() {
                return Err(FloodRiskError::InvalidFeatures(format!(
                    "{name} must be a finite number, got {value}"
                )));
            }
        }
        if self.rainfall < 0.0 {
            return Err(FloodRiskError::InvalidFeatures(format!(
                "rainfall cannot be negative, got {}",
                self.rainfall
            )));
        }
        Ok(())
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.rainfall, self.soil_moisture, self.elevation]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }

    pub const fn all() -> &'static [RiskLevel] {
        &[RiskLevel::Low, RiskLevel::Medium, RiskLevel::High]
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RiskLevel {
    type Error = FloodRiskError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value {
            "Low" => Ok(RiskLevel::Low),
            "Medium" => Ok(RiskLevel::Medium),
            "High" => Ok(RiskLevel::High),
            _ => Err(FloodRiskError::ModelUnavailable(format!(
                "unknown risk label '{value}'. Expected one of: Low, Medium, High."
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskPrediction {
    pub label: RiskLevel,
    /// Averaged ensemble probability of `label`.
    pub confidence: f64,
}
