use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{FeatureVector, Region, provider::ProviderId};

/// Environment variable that points at a config file.
pub const CONFIG_ENV: &str = "FLOOD_RISK_CONFIG";

/// Upper bounds for the outbound retry policy.
pub const MAX_RETRIES: u32 = 5;
pub const MAX_RETRY_DELAY_MS: u64 = 10_000;

/// Settings for the Open-Meteo feature source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenMeteoConfig {
    pub forecast_url: String,
    pub elevation_url: String,
    pub timeout_secs: u64,
    /// Extra attempts after a transport failure or 5xx response.
    pub retries: u32,
    pub retry_delay_ms: u64,
    /// Number of days, ending today, summed into the rainfall feature.
    pub rainfall_window_days: u32,
}

impl Default for OpenMeteoConfig {
    fn default() -> Self {
        Self {
            forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            elevation_url: "https://api.open-meteo.com/v1/elevation".to_string(),
            timeout_secs: 10,
            retries: 1,
            retry_delay_ms: 250,
            rainfall_window_days: 7,
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// provider = "open-meteo"
/// model_path = "models/flood_risk_model.json"
/// bind = "0.0.0.0:5000"
///
/// [open_meteo]
/// timeout_secs = 10
///
/// [region]
/// min_lat = 8.2
/// max_lat = 12.8
/// min_lon = 74.8
/// max_lon = 77.5
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feature source id, e.g. "open-meteo" or "fixed".
    pub provider: String,
    pub model_path: PathBuf,
    pub bind: String,
    pub open_meteo: OpenMeteoConfig,
    /// Features served by the "fixed" provider.
    pub fixed: Option<FeatureVector>,
    /// Restrict predictions to this area when set.
    pub region: Option<Region>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderId::OpenMeteo.as_str().to_string(),
            model_path: PathBuf::from("models/flood_risk_model.json"),
            bind: "0.0.0.0:5000".to_string(),
            open_meteo: OpenMeteoConfig::default(),
            fixed: None,
            region: None,
        }
    }
}

impl Config {
    /// Return the configured provider as a strongly-typed ProviderId.
    pub fn provider_id(&self) -> Result<ProviderId> {
        ProviderId::try_from(self.provider.as_str())
    }

    /// Load config from `explicit`, then `$FLOOD_RISK_CONFIG`, then the
    /// platform config directory. Only the last may be absent, in which case
    /// defaults are returned.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load_from(Path::new(&path));
        }

        let path = Self::config_file_path()?;
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg = Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        tracing::info!(path = %path.display(), "loaded config");
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(contents).context("Failed to parse config TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let id = self.provider_id()?;

        if id == ProviderId::Fixed && self.fixed.is_none() {
            bail!("Provider 'fixed' requires a [fixed] table with rainfall, soil_moisture and elevation");
        }

        if let Some(features) = &self.fixed {
            features
                .validate()
                .map_err(|e| anyhow!("Invalid [fixed] features: {e}"))?;
        }

        if let Some(region) = &self.region {
            region.validate().map_err(|e| anyhow!("Invalid [region]: {e}"))?;
        }

        let om = &self.open_meteo;
        if om.timeout_secs == 0 {
            bail!("open_meteo.timeout_secs must be at least 1");
        }
        if om.retries > MAX_RETRIES {
            bail!(
                "open_meteo.retries must be at most {MAX_RETRIES}, got {}",
                om.retries
            );
        }
        if om.retry_delay_ms > MAX_RETRY_DELAY_MS {
            bail!(
                "open_meteo.retry_delay_ms must be at most {MAX_RETRY_DELAY_MS}, got {}",
                om.retry_delay_ms
            );
        }
        if !(1..=92).contains(&om.rainfall_window_days) {
            bail!(
                "open_meteo.rainfall_window_days must be within 1..=92, got {}",
                om.rainfall_window_days
            );
        }

        Ok(())
    }

    /// Path to the config file in the platform config directory.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "flood-risk", "flood-risk")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = Config::from_toml_str("").expect("empty config is valid");

        assert_eq!(cfg.provider_id().unwrap(), ProviderId::OpenMeteo);
        assert_eq!(cfg.bind, "0.0.0.0:5000");
        assert_eq!(cfg.open_meteo.retries, 1);
        assert_eq!(cfg.open_meteo.rainfall_window_days, 7);
        assert!(cfg.region.is_none());
    }

    #[test]
    fn parses_full_config() {
        let cfg = Config::from_toml_str(
            r#"
            provider = "fixed"
            model_path = "/srv/model.json"
            bind = "127.0.0.1:8080"

            [open_meteo]
            timeout_secs = 3
            retries = 0

            [fixed]
            rainfall = 120.0
            soil_moisture = 0.4
            elevation = 5.0

            [region]
            min_lat = 8.2
            max_lat = 12.8
            min_lon = 74.8
            max_lon = 77.5
            "#,
        )
        .expect("config parses");

        assert_eq!(cfg.provider_id().unwrap(), ProviderId::Fixed);
        assert_eq!(cfg.model_path, PathBuf::from("/srv/model.json"));
        assert_eq!(cfg.open_meteo.timeout_secs, 3);
        assert_eq!(cfg.open_meteo.retries, 0);
        // Unset fields in a partial table keep their defaults.
        assert_eq!(cfg.open_meteo.rainfall_window_days, 7);
        assert_eq!(cfg.fixed.unwrap().elevation, 5.0);
        assert_eq!(cfg.region, Some(Region::KERALA));
    }

    #[test]
    fn example_config_is_valid() {
        let cfg = Config::from_toml_str(include_str!("../../config.example.toml"))
            .expect("example config parses");
        assert_eq!(cfg.provider_id().unwrap(), ProviderId::OpenMeteo);
        assert_eq!(cfg.region, Some(Region::KERALA));
    }

    #[test]
    fn fixed_provider_without_features_is_rejected() {
        let err = Config::from_toml_str(r#"provider = "fixed""#).unwrap_err();
        assert!(format!("{err:#}").contains("[fixed]"));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = Config::from_toml_str(r#"provider = "weatherstack""#).unwrap_err();
        assert!(format!("{err:#}").contains("Unknown provider"));
    }

    #[test]
    fn bad_window_is_rejected() {
        let err = Config::from_toml_str("[open_meteo]\nrainfall_window_days = 0").unwrap_err();
        assert!(format!("{err:#}").contains("rainfall_window_days"));
    }

    #[test]
    fn unbounded_retry_policy_is_rejected() {
        let err = Config::from_toml_str("[open_meteo]\nretries = 4294967295").unwrap_err();
        assert!(format!("{err:#}").contains("open_meteo.retries"));

        let err = Config::from_toml_str("[open_meteo]\nretry_delay_ms = 600000").unwrap_err();
        assert!(format!("{err:#}").contains("retry_delay_ms"));

        let cfg = Config::from_toml_str("[open_meteo]\nretries = 5\nretry_delay_ms = 10000")
            .expect("limits are inclusive");
        assert_eq!(cfg.open_meteo.retries, MAX_RETRIES);
    }

    #[test]
    fn inverted_region_is_rejected() {
        let err = Config::from_toml_str(
            "[region]\nmin_lat = 12.0\nmax_lat = 8.0\nmin_lon = 74.0\nmax_lon = 77.0",
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("[region]"));
    }

    #[test]
    fn load_from_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind = \"127.0.0.1:9000\"").unwrap();

        let cfg = Config::load(Some(file.path())).expect("config loads");
        assert_eq!(cfg.bind, "127.0.0.1:9000");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
