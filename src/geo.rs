//! IP geolocation providers.
//!
//! [`AbstractApiResolver`] queries an Abstract-API-compatible endpoint
//! (`GET {endpoint}?ip_address=..&api_key=..`). [`DisabledResolver`] is
//! used when no provider is configured and always fails resolution, which
//! the recorder treats as "record without geodata".

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::GeoConfig;
use crate::error::{Error, Result};
use crate::models::GeoLocation;
use crate::traits::GeoResolver;

#[derive(Debug, Default, Deserialize)]
struct Connection {
    #[serde(default)]
    isp_name: Option<String>,
    #[serde(default)]
    organization_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    postal_code: Option<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    connection: Option<Connection>,
}

impl From<GeoResponse> for GeoLocation {
    fn from(r: GeoResponse) -> Self {
        let connection = r.connection.unwrap_or_default();
        Self {
            country: r.country.unwrap_or_default(),
            region: r.region.unwrap_or_default(),
            city: r.city.unwrap_or_default(),
            postal_code: r.postal_code.unwrap_or_default(),
            latitude: r.latitude.unwrap_or_default(),
            longitude: r.longitude.unwrap_or_default(),
            isp: connection.isp_name.unwrap_or_default(),
            organization: connection.organization_name.unwrap_or_default(),
        }
    }
}

/// Decode a geolocation response body.
pub fn parse_geo(body: &str) -> Result<GeoLocation> {
    let parsed: GeoResponse = serde_json::from_str(body)
        .map_err(|e| Error::Resolution(format!("malformed geolocation response: {}", e)))?;
    Ok(parsed.into())
}

pub struct AbstractApiResolver {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl AbstractApiResolver {
    pub fn new(config: &GeoConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(Error::resolution)?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait]
impl GeoResolver for AbstractApiResolver {
    fn name(&self) -> &str {
        "abstract"
    }

    async fn resolve(&self, ip: &str) -> Result<GeoLocation> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("ip_address", ip), ("api_key", self.api_key.as_str())])
            .send()
            .await
            .map_err(Error::resolution)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Resolution(format!(
                "provider returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response.text().await.map_err(Error::resolution)?;
        parse_geo(&body)
    }
}

/// Resolver used when geolocation is turned off.
pub struct DisabledResolver;

#[async_trait]
impl GeoResolver for DisabledResolver {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn resolve(&self, _ip: &str) -> Result<GeoLocation> {
        Err(Error::Resolution("geolocation is disabled".to_string()))
    }
}

/// Build the resolver selected by `[geo].provider`.
///
/// A missing API key falls back to [`DisabledResolver`] with a warning
/// rather than refusing to start.
pub fn create_resolver(config: &GeoConfig) -> Result<Arc<dyn GeoResolver>> {
    if !config.is_enabled() {
        tracing::info!("geolocation disabled");
        return Ok(Arc::new(DisabledResolver));
    }
    match config.provider.as_str() {
        "abstract" => match std::env::var(&config.api_key_env) {
            Ok(key) if !key.is_empty() => Ok(Arc::new(AbstractApiResolver::new(config, key)?)),
            _ => {
                tracing::warn!(
                    env = %config.api_key_env,
                    "geolocation API key not set; visits will be recorded without geodata"
                );
                Ok(Arc::new(DisabledResolver))
            }
        },
        other => Err(Error::Validation(format!("unknown geo provider: {}", other))),
    }
}
