use std::env;

use async_trait::async_trait;
use futures_util::future::join;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::non_empty_var;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Outcome of a best-effort lookup. Nothing here ever blocks a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Enrichment<T> {
    Pending,
    Resolved(T),
    Failed(String),
    Unavailable,
}

impl<T> Enrichment<T> {
    pub fn resolved(&self) -> Option<&T> {
        match self {
            Enrichment::Resolved(value) => Some(value),
            _ => None,
        }
    }

    fn from_lookup(result: Result<T, EnrichmentError>) -> Self {
        match result {
            Ok(value) => Enrichment::Resolved(value),
            Err(EnrichmentError::NotConfigured) => Enrichment::Unavailable,
            Err(err) => Enrichment::Failed(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("lookup service is not configured")]
    NotConfigured,
    #[error("lookup returned no result")]
    NoResult,
    #[error("lookup rejected with status {0}")]
    Rejected(u16),
    #[error("lookup request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, EnrichmentError>;
}

#[async_trait]
pub trait LocationLookup: Send + Sync {
    async fn lookup(&self, at: Coordinates) -> Result<String, EnrichmentError>;
}

/// Position handed over by the device. `None` means the user declined access.
pub struct FixedPosition(pub Option<Coordinates>);

#[async_trait]
impl Geolocator for FixedPosition {
    async fn current_position(&self) -> Result<Coordinates, EnrichmentError> {
        self.0.ok_or(EnrichmentError::PermissionDenied)
    }
}

#[derive(Clone, Debug)]
pub struct EnrichmentConfig {
    pub what3words_api_url: String,
    pub what3words_api_key: Option<String>,
    pub geocoder_url: String,
}

impl EnrichmentConfig {
    pub fn from_env() -> Self {
        Self {
            what3words_api_url: env::var("WHAT3WORDS_API_URL")
                .unwrap_or_else(|_| "https://api.what3words.com/v3".to_string()),
            what3words_api_key: non_empty_var("WHAT3WORDS_API_KEY"),
            geocoder_url: env::var("GEOCODER_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string()),
        }
    }
}

pub struct What3WordsLookup {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

impl What3WordsLookup {
    pub fn new(client: Client, api_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            api_key,
        }
    }
}

#[derive(Deserialize)]
struct ThreeWordAddress {
    #[serde(default)]
    words: Option<String>,
}

#[async_trait]
impl LocationLookup for What3WordsLookup {
    async fn lookup(&self, at: Coordinates) -> Result<String, EnrichmentError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(EnrichmentError::NotConfigured)?;
        let url = format!("{}/convert-to-3wa", self.api_url.trim_end_matches('/'));
        let coordinates = format!("{},{}", at.latitude, at.longitude);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("coordinates", coordinates.as_str()),
                ("key", api_key),
                ("language", "en"),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(EnrichmentError::Rejected(response.status().as_u16()));
        }

        let address: ThreeWordAddress = response.json().await?;
        address
            .words
            .filter(|words| !words.is_empty())
            .ok_or(EnrichmentError::NoResult)
    }
}

pub struct NominatimTownLookup {
    client: Client,
    api_url: String,
}

impl NominatimTownLookup {
    pub fn new(client: Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct ReverseGeocode {
    #[serde(default)]
    address: Option<PlaceAddress>,
}

#[derive(Deserialize)]
struct PlaceAddress {
    town: Option<String>,
    city: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
}

impl PlaceAddress {
    fn settlement(self) -> Option<String> {
        self.town.or(self.city).or(self.village).or(self.hamlet)
    }
}

#[async_trait]
impl LocationLookup for NominatimTownLookup {
    async fn lookup(&self, at: Coordinates) -> Result<String, EnrichmentError> {
        let url = format!("{}/reverse", self.api_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", at.latitude.to_string()),
                ("lon", at.longitude.to_string()),
                ("zoom", "10".to_string()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(EnrichmentError::Rejected(response.status().as_u16()));
        }

        let place: ReverseGeocode = response.json().await?;
        place
            .address
            .and_then(PlaceAddress::settlement)
            .ok_or(EnrichmentError::NoResult)
    }
}

/// The two lookups a form runs once it has a position.
pub struct LocationLookups {
    pub what3words: What3WordsLookup,
    pub town: NominatimTownLookup,
}

impl LocationLookups {
    pub fn from_config(client: Client, config: &EnrichmentConfig) -> Self {
        Self {
            what3words: What3WordsLookup::new(
                client.clone(),
                config.what3words_api_url.clone(),
                config.what3words_api_key.clone(),
            ),
            town: NominatimTownLookup::new(client, config.geocoder_url.clone()),
        }
    }

    pub async fn enrich(&self, geolocator: &dyn Geolocator) -> LocationEnrichment {
        enrich_location(geolocator, &self.what3words, &self.town).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationEnrichment {
    pub position: Enrichment<Coordinates>,
    pub what3words: Enrichment<String>,
    pub town: Enrichment<String>,
}

impl Default for LocationEnrichment {
    fn default() -> Self {
        Self {
            position: Enrichment::Pending,
            what3words: Enrichment::Pending,
            town: Enrichment::Pending,
        }
    }
}

/// Acquires a position, then runs both lookups concurrently. Failures are
/// recorded per field and never propagated.
pub async fn enrich_location(
    geolocator: &dyn Geolocator,
    words: &dyn LocationLookup,
    town: &dyn LocationLookup,
) -> LocationEnrichment {
    let at = match geolocator.current_position().await {
        Ok(at) => at,
        Err(err) => {
            debug!(error = %err, "position unavailable; skipping location lookups");
            return LocationEnrichment {
                position: Enrichment::Failed(err.to_string()),
                what3words: Enrichment::Unavailable,
                town: Enrichment::Unavailable,
            };
        }
    };

    let (words_result, town_result) = join(words.lookup(at), town.lookup(at)).await;
    if let Err(err) = &words_result {
        warn!(error = %err, "what3words lookup failed");
    }
    if let Err(err) = &town_result {
        warn!(error = %err, "town lookup failed");
    }

    LocationEnrichment {
        position: Enrichment::Resolved(at),
        what3words: Enrichment::from_lookup(words_result),
        town: Enrichment::from_lookup(town_result),
    }
}
