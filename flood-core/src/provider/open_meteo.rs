use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
    Coordinate, FeatureVector,
    config::OpenMeteoConfig,
    error::{FloodRiskError, Result},
};

use super::{FeatureSource, ProviderId};

/// Looks up rainfall and soil moisture from the Open-Meteo forecast API and
/// elevation from its elevation API.
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    config: OpenMeteoConfig,
    http: Client,
}

/// Outcome of a single HTTP attempt that did not produce a body.
enum AttemptError {
    Retryable(String),
    Fatal(String),
}

impl OpenMeteoProvider {
    pub fn new(config: OpenMeteoConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build Open-Meteo HTTP client: {e}"))?;

        Ok(Self { config, http })
    }

    async fn fetch_weather(&self, coordinate: &Coordinate, now: DateTime<Utc>) -> Result<(f64, f64)> {
        let (start, end) = window_dates(now.date_naive(), self.config.rainfall_window_days);

        let query = [
            ("latitude", coordinate.latitude().to_string()),
            ("longitude", coordinate.longitude().to_string()),
            ("hourly", "precipitation,soil_moisture_0_to_1cm".to_string()),
            ("start_date", start.format("%Y-%m-%d").to_string()),
            ("end_date", end.format("%Y-%m-%d").to_string()),
            ("timezone", "UTC".to_string()),
        ];

        let parsed: ForecastResponse = self
            .get_json("forecast", &self.config.forecast_url, &query)
            .await?;

        let now = now.naive_utc();
        Ok((total_rainfall(&parsed, now)?, latest_soil_moisture(&parsed, now)?))
    }

    async fn fetch_elevation(&self, coordinate: &Coordinate) -> Result<f64> {
        let query = [
            ("latitude", coordinate.latitude().to_string()),
            ("longitude", coordinate.longitude().to_string()),
        ];

        let parsed: ElevationResponse = self
            .get_json("elevation", &self.config.elevation_url, &query)
            .await?;

        parsed
            .elevation
            .and_then(|values| values.first().copied())
            .ok_or_else(|| {
                FloodRiskError::UpstreamSchema("elevation response has no 'elevation' value".into())
            })
    }

    /// GET `url`, retrying transport failures and 5xx responses up to
    /// `retries` times, then decode the body as `T`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        label: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let attempts = self.config.retries.saturating_add(1);
        let mut attempt = 0;

        let body = loop {
            attempt += 1;

            match self.try_get(label, url, query).await {
                Ok(body) => break body,
                Err(AttemptError::Retryable(msg)) if attempt < attempts => {
                    tracing::warn!(
                        request = label,
                        attempt,
                        attempts,
                        error = %msg,
                        "Open-Meteo request failed, retrying"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(
                        self.config.retry_delay_ms,
                    ))
                    .await;
                }
                Err(AttemptError::Retryable(msg)) | Err(AttemptError::Fatal(msg)) => {
                    tracing::warn!(request = label, attempt, error = %msg, "Open-Meteo request failed");
                    return Err(FloodRiskError::UpstreamUnavailable(msg));
                }
            }
        };

        serde_json::from_str(&body).map_err(|e| {
            FloodRiskError::UpstreamSchema(format!("failed to parse Open-Meteo {label} JSON: {e}"))
        })
    }

    async fn try_get(
        &self,
        label: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<String, AttemptError> {
        let res = self.http.get(url).query(query).send().await.map_err(|e| {
            AttemptError::Retryable(format!("failed to send Open-Meteo {label} request: {e}"))
        })?;

        let status = res.status();
        let body = res.text().await.map_err(|e| {
            AttemptError::Retryable(format!("failed to read Open-Meteo {label} response body: {e}"))
        })?;

        if status.is_success() {
            return Ok(body);
        }

        let msg = format!(
            "Open-Meteo {label} request failed with status {}: {}",
            status,
            truncate_body(&body),
        );

        if is_retryable(status) {
            Err(AttemptError::Retryable(msg))
        } else {
            Err(AttemptError::Fatal(msg))
        }
    }
}

/// Hourly timestamps in `timezone=UTC`, e.g. "2026-10-15T13:00".
const HOURLY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Deserialize)]
struct HourlySeries {
    time: Option<Vec<String>>,
    precipitation: Option<Vec<Option<f64>>>,
    soil_moisture_0_to_1cm: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    hourly: Option<HourlySeries>,
}

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    elevation: Option<Vec<f64>>,
}

#[async_trait]
impl FeatureSource for OpenMeteoProvider {
    async fn fetch_features(&self, coordinate: &Coordinate) -> Result<FeatureVector> {
        let (rainfall, soil_moisture) = self.fetch_weather(coordinate, Utc::now()).await?;
        let elevation = self.fetch_elevation(coordinate).await?;

        tracing::debug!(%coordinate, rainfall, soil_moisture, elevation, "fetched features");

        Ok(FeatureVector {
            rainfall,
            soil_moisture,
            elevation,
        })
    }

    fn id(&self) -> ProviderId {
        ProviderId::OpenMeteo
    }
}

/// First and last day of a `days`-long window ending on `today`.
fn window_dates(today: NaiveDate, days: u32) -> (NaiveDate, NaiveDate) {
    let days = i64::from(days.max(1));
    (today - Duration::days(days - 1), today)
}

/// Non-null values of an hourly series observed at or before `now`, in order.
/// The forecast API also returns the rest of today, which is not yet observed.
fn observed(
    hourly: &HourlySeries,
    name: &str,
    values: Option<&Vec<Option<f64>>>,
    now: NaiveDateTime,
) -> Result<Vec<f64>> {
    let times = hourly.time.as_ref().ok_or_else(|| {
        FloodRiskError::UpstreamSchema("forecast response has no 'hourly.time'".into())
    })?;
    let values = values.ok_or_else(|| {
        FloodRiskError::UpstreamSchema(format!("forecast response has no 'hourly.{name}'"))
    })?;

    if times.len() != values.len() {
        return Err(FloodRiskError::UpstreamSchema(format!(
            "'hourly.{name}' has {} values for {} timestamps",
            values.len(),
            times.len()
        )));
    }

    let mut out = Vec::with_capacity(values.len());
    for (time, value) in times.iter().zip(values) {
        let at = NaiveDateTime::parse_from_str(time, HOURLY_TIME_FORMAT).map_err(|e| {
            FloodRiskError::UpstreamSchema(format!("bad hourly timestamp '{time}': {e}"))
        })?;
        if at > now {
            break;
        }
        if let Some(v) = value {
            out.push(*v);
        }
    }

    Ok(out)
}

fn hourly(parsed: &ForecastResponse) -> Result<&HourlySeries> {
    parsed
        .hourly
        .as_ref()
        .ok_or_else(|| FloodRiskError::UpstreamSchema("forecast response has no 'hourly' block".into()))
}

fn total_rainfall(parsed: &ForecastResponse, now: NaiveDateTime) -> Result<f64> {
    let series = hourly(parsed)?;
    let present = observed(series, "precipitation", series.precipitation.as_ref(), now)?;

    if present.is_empty() {
        return Err(FloodRiskError::UpstreamSchema(
            "forecast response has no observed precipitation values".into(),
        ));
    }

    Ok(present.iter().sum())
}

fn latest_soil_moisture(parsed: &ForecastResponse, now: NaiveDateTime) -> Result<f64> {
    let series = hourly(parsed)?;
    observed(
        series,
        "soil_moisture_0_to_1cm",
        series.soil_moisture_0_to_1cm.as_ref(),
        now,
    )?
    .last()
    .copied()
    .ok_or_else(|| {
        FloodRiskError::UpstreamSchema("forecast response has no observed soil moisture values".into())
    })
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let cut = (0..=MAX).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    }
}
