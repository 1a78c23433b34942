use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use common::{GeoCoordinate, SolarWindow};
use serde::Deserialize;
use std::time::Duration;
use crate::config::ProvidersConfig;

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn locate(&self) -> Result<GeoCoordinate>;
}

#[async_trait]
pub trait SolarTimeProvider: Send + Sync {
    /// Sunrise and sunset on `date` at `at`, converted to local time.
    async fn solar_window(&self, at: GeoCoordinate, date: NaiveDate) -> Result<SolarWindow>;
}

fn http_client(config: &ProvidersConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
        .context("Failed to build HTTP client")
}

/// IP-based geolocation against an ipapi.co compatible endpoint.
pub struct IpApiLocator {
    client: reqwest::Client,
    url: String,
}

impl IpApiLocator {
    pub fn new(config: &ProvidersConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            url: config.location_url.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct LocationBody {
    latitude: f64,
    longitude: f64,
}

pub fn parse_location(body: &str) -> Result<GeoCoordinate> {
    let data: LocationBody = serde_json::from_str(body)
        .context("Failed to parse location response")?;
    GeoCoordinate::new(data.latitude, data.longitude)
}

#[async_trait]
impl LocationProvider for IpApiLocator {
    async fn locate(&self) -> Result<GeoCoordinate> {
        let response = self.client.get(&self.url).send().await
            .with_context(|| format!("Location request to {} failed", self.url))?;
        if !response.status().is_success() {
            return Err(anyhow!("Location lookup failed with status: {}", response.status()));
        }
        let body = response.text().await?;
        parse_location(&body)
    }
}

/// Client for the sunrise-sunset.org JSON API.
pub struct SunriseSunsetClient {
    client: reqwest::Client,
    url: String,
}

impl SunriseSunsetClient {
    pub fn new(config: &ProvidersConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            url: config.solar_url.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SunriseSunsetBody {
    // Error replies carry `"results": ""`, so decode only once status is OK.
    results: serde_json::Value,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SolarResults {
    sunrise: String,
    sunset: String,
}

fn parse_instant(label: &str, value: &str) -> Result<DateTime<Local>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Local))
        .with_context(|| format!("Invalid {} timestamp: {}", label, value))
}

pub fn parse_solar_window(body: &str) -> Result<SolarWindow> {
    let data: SunriseSunsetBody = serde_json::from_str(body)
        .context("Failed to parse sunrise/sunset response")?;
    if let Some(status) = data.status.as_deref() {
        if status != "OK" {
            return Err(anyhow!("Sunrise/sunset API returned status {}", status));
        }
    }
    let results: SolarResults = serde_json::from_value(data.results)
        .context("Failed to parse sunrise/sunset results")?;
    Ok(SolarWindow {
        sunrise: parse_instant("sunrise", &results.sunrise)?,
        sunset: parse_instant("sunset", &results.sunset)?,
    })
}

#[async_trait]
impl SolarTimeProvider for SunriseSunsetClient {
    async fn solar_window(&self, at: GeoCoordinate, date: NaiveDate) -> Result<SolarWindow> {
        let query = [
            ("lat", at.latitude.to_string()),
            ("lng", at.longitude.to_string()),
            ("formatted", "0".to_string()),
            ("date", date.format("%Y-%m-%d").to_string()),
        ];
        let response = self.client.get(&self.url).query(&query).send().await
            .with_context(|| format!("Sunrise/sunset request to {} failed", self.url))?;
        if !response.status().is_success() {
            return Err(anyhow!("Sunrise/sunset lookup failed with status: {}", response.status()));
        }
        let body = response.text().await?;
        parse_solar_window(&body)
    }
}
