use async_trait::async_trait;

use crate::{Coordinate, FeatureVector, error::Result};

use super::{FeatureSource, ProviderId};

/// Returns the same features for every location. Useful offline and in tests.
#[derive(Debug, Clone)]
pub struct FixedProvider {
    features: FeatureVector,
}

impl FixedProvider {
    pub fn new(features: FeatureVector) -> Self {
        Self { features }
    }
}

#[async_trait]
impl FeatureSource for FixedProvider {
    async fn fetch_features(&self, coordinate: &Coordinate) -> Result<FeatureVector> {
        tracing::debug!(%coordinate, "serving fixed features");
        Ok(self.features)
    }

    fn id(&self) -> ProviderId {
        ProviderId::Fixed
    }
}
