use std::sync::Arc;

use crate::{
    ClassifierModel, Coordinate, FeatureSource, FeatureVector, Region, RiskPrediction,
    error::{FloodRiskError, Result},
};

/// Result of a location lookup: the prediction plus the features behind it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationPrediction {
    pub coordinate: Coordinate,
    pub features: FeatureVector,
    pub prediction: RiskPrediction,
}

/// Validate, fetch, classify. Holds no per-request state.
#[derive(Debug)]
pub struct FloodRiskService {
    source: Box<dyn FeatureSource>,
    model: Arc<ClassifierModel>,
    region: Option<Region>,
}

impl FloodRiskService {
    pub fn new(source: Box<dyn FeatureSource>, model: Arc<ClassifierModel>) -> Self {
        Self {
            source,
            model,
            region: None,
        }
    }

    pub fn with_region(mut self, region: Option<Region>) -> Self {
        self.region = region;
        self
    }

    pub fn source(&self) -> &dyn FeatureSource {
        self.source.as_ref()
    }

    pub fn model(&self) -> &ClassifierModel {
        &self.model
    }

    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    /// Range-check the coordinate and, if configured, the supported region.
    pub fn coordinate(&self, latitude: f64, longitude: f64) -> Result<Coordinate> {
        let coordinate = Coordinate::new(latitude, longitude)?;

        if let Some(region) = &self.region
            && !region.contains(&coordinate)
        {
            return Err(FloodRiskError::InvalidInput(format!(
                "{coordinate} is outside the supported region \
                 (lat {}..{}, lon {}..{})",
                region.min_lat, region.max_lat, region.min_lon, region.max_lon
            )));
        }

        Ok(coordinate)
    }

    /// Full pipeline for one location. A failed lookup returns before the
    /// classifier is consulted.
    pub async fn predict_by_location(&self, latitude: f64, longitude: f64) -> Result<LocationPrediction> {
        let coordinate = self.coordinate(latitude, longitude)?;

        let features = self.source.fetch_features(&coordinate).await?;
        let prediction = self.model.classify(&features)?;

        tracing::info!(
            %coordinate,
            provider = %self.source.id(),
            risk = %prediction.label,
            confidence = prediction.confidence,
            "prediction complete"
        );

        Ok(LocationPrediction {
            coordinate,
            features,
            prediction,
        })
    }

    /// Classify caller-supplied features directly.
    pub fn predict_from_features(&self, features: &FeatureVector) -> Result<RiskPrediction> {
        self.model.classify(features)
    }
}
