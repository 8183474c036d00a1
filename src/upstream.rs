//! Seams to the two external services and their reqwest-backed clients.

use crate::error::{Error, Result};
use crate::record::{ChecklistMetadata, Place};
use async_trait::async_trait;
use log::{debug, info, warn};
use rand::Rng;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;

pub const EBIRD: &str = "eBird";
pub const GEOCODER: &str = "geocoder";

const USER_AGENT: &str = concat!("kestrel/", env!("CARGO_PKG_VERSION"));

/// Parameters of one recent-observations request, already in provider units.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentQuery {
    pub lat: f64,
    pub lng: f64,
    pub dist_km: f64,
    pub back_days: u32,
    pub max_results: Option<u32>,
}

#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// Recent observations around a point, optionally for a single species.
    /// Returns the decoded body as-is; shape checks belong to the fetcher.
    async fn recent_observations(&self, query: &RecentQuery, species_code: Option<&str>)
    -> Result<Value>;

    async fn checklist(&self, sub_id: &str) -> Result<ChecklistMetadata>;

    /// The taxonomy feed as delimited text.
    async fn taxonomy(&self, region: &str) -> Result<String>;
}

#[async_trait]
pub trait GeocodingSource: Send + Sync {
    async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<Place>>;
}

fn build_client(service: &'static str, timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::unavailable(service, e))
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else {
        e.to_string()
    }
}

/// Pull the most useful message out of an error body.
fn upstream_detail(status: StatusCode, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.get("error")
            .and_then(Value::as_str)
            .or_else(|| v.pointer("/errors/0/title").and_then(Value::as_str))
            .map(str::to_string)
    });

    match message {
        Some(m) => format!("{}: {}", status, m),
        None if body.trim().is_empty() => status.to_string(),
        None => format!("{}: {}", status, body.trim()),
    }
}

async fn send(service: &'static str, request: RequestBuilder) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::unavailable(service, describe(&e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::unavailable(service, upstream_detail(status, &body)));
    }
    Ok(response)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChecklistView {
    #[serde(default)]
    user_display_name: Option<String>,
    #[serde(default)]
    obs_dt: Option<String>,
}

pub struct EbirdClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl EbirdClient {
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(EBIRD, timeout)?,
            base_url: "https://api.ebird.org/v2".to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header("X-eBirdApiToken", &self.api_key)
    }
}

#[async_trait]
impl ObservationSource for EbirdClient {
    async fn recent_observations(
        &self,
        query: &RecentQuery,
        species_code: Option<&str>,
    ) -> Result<Value> {
        let path = match species_code {
            Some(code) => format!("/data/obs/geo/recent/{}", code),
            None => "/data/obs/geo/recent".to_string(),
        };
        let mut params = vec![
            ("lat", format!("{:.4}", query.lat)),
            ("lng", format!("{:.4}", query.lng)),
            ("dist", format!("{:.3}", query.dist_km)),
            ("back", query.back_days.to_string()),
        ];
        if let Some(max) = query.max_results {
            params.push(("maxResults", max.to_string()));
        }

        debug!("eBird request {} {:?}", path, params);
        let response = send(EBIRD, self.get(&path).query(&params)).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| Error::schema(EBIRD, e))
    }

    async fn checklist(&self, sub_id: &str) -> Result<ChecklistMetadata> {
        let path = format!("/product/checklist/view/{}", sub_id);
        let response = send(EBIRD, self.get(&path)).await?;
        let view: ChecklistView = response
            .json()
            .await
            .map_err(|e| Error::schema(EBIRD, e))?;

        Ok(ChecklistMetadata {
            sub_id: sub_id.to_string(),
            observer_name: view.user_display_name,
            date: view.obs_dt,
        })
    }

    async fn taxonomy(&self, region: &str) -> Result<String> {
        let params = [("fmt", "csv"), ("locale", "en"), ("region", region)];
        let response = send(EBIRD, self.get("/ref/taxonomy/ebird").query(&params)).await?;
        response.text().await.map_err(|e| Error::schema(EBIRD, e))
    }
}

pub struct NominatimClient {
    client: Client,
    base_url: String,
    pub(crate) base_delay: Duration,
    pub(crate) max_retries: u32,
}

impl NominatimClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(GEOCODER, timeout)?,
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            base_delay: Duration::from_millis(500),
            max_retries: 0,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.base_delay = Duration::from_millis(delay_ms);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let jitter = if base > 0 {
            rand::rng().random_range(0..base)
        } else {
            0
        };
        let exponential = 2_u64.saturating_pow(attempt).saturating_mul(base);
        Duration::from_millis(exponential.saturating_add(jitter))
    }

    async fn search_once(&self, query: &str, limit: Option<usize>) -> Result<Vec<Place>> {
        let mut params = vec![("format", "json".to_string()), ("q", query.to_string())];
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }

        let url = format!("{}/search", self.base_url);
        let response = send(GEOCODER, self.client.get(&url).query(&params)).await?;
        let candidates = response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| Error::schema(GEOCODER, e))?;
        Ok(candidates.iter().map(Place::from_value).collect())
    }
}

#[async_trait]
impl GeocodingSource for NominatimClient {
    async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<Place>> {
        let mut attempt = 0;
        loop {
            match self.search_once(query, limit).await {
                Err(Error::UpstreamUnavailable { details, .. }) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(
                        "Geocoding '{}' failed ({}), retrying (attempt {}) after {}ms",
                        query,
                        details,
                        attempt + 1,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
                Ok(places) => {
                    if attempt > 0 {
                        info!("Geocoded '{}' on attempt {}", query, attempt + 1);
                    }
                    return Ok(places);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
