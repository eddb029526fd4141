use crate::{
    Config, Coordinate, FeatureVector,
    error::Result,
    provider::{fixed::FixedProvider, open_meteo::OpenMeteoProvider},
};
use async_trait::async_trait;
use std::{convert::TryFrom, fmt::Debug};

pub mod fixed;
pub mod open_meteo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenMeteo,
    Fixed,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenMeteo => "open-meteo",
            ProviderId::Fixed => "fixed",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenMeteo, ProviderId::Fixed]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "open-meteo" | "openmeteo" => Ok(ProviderId::OpenMeteo),
            "fixed" => Ok(ProviderId::Fixed),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: open-meteo, fixed."
            )),
        }
    }
}

/// Capability to look up the classifier inputs for a location.
///
/// Implementations must treat any failed sub-request as a failure of the
/// whole lookup; no default values are substituted.
#[async_trait]
pub trait FeatureSource: Send + Sync + Debug {
    async fn fetch_features(&self, coordinate: &Coordinate) -> Result<FeatureVector>;

    fn id(&self) -> ProviderId;
}

/// Construct a feature source from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
) -> anyhow::Result<Box<dyn FeatureSource>> {
    let boxed: Box<dyn FeatureSource> = match id {
        ProviderId::OpenMeteo => Box::new(OpenMeteoProvider::new(config.open_meteo.clone())?),
        ProviderId::Fixed => {
            let features = config.fixed.ok_or_else(|| {
                anyhow::anyhow!(
                    "Provider 'fixed' selected but no [fixed] table is configured.\n\
                     Hint: add rainfall, soil_moisture and elevation under [fixed]."
                )
            })?;
            Box::new(FixedProvider::new(features))
        }
    };

    Ok(boxed)
}

/// Construct the configured provider, using the `provider` field.
pub fn default_provider_from_config(config: &Config) -> anyhow::Result<Box<dyn FeatureSource>> {
    let id = config.provider_id()?;
    provider_from_config(id, config)
}
