//! HTTP surface: routing, shared state and the request handlers that drive
//! the observation pipeline.

use crate::aggregate::{GroupingPolicy, aggregate};
use crate::enricher::enrich;
use crate::error::{Error, Result};
use crate::fetcher::{ObservationRequest, fetch_observations};
use crate::geocoder::{self, LocationQuery};
use crate::record::{NormalizedObservation, Place, Species};
use crate::taxonomy::{filter_species, parse_taxonomy};
use crate::upstream::{GeocodingSource, ObservationSource};
use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

const DEFAULT_REGION: &str = "US";

/// Values applied when a request leaves them out.
#[derive(Debug, Clone)]
pub struct SearchDefaults {
    pub radius_miles: f64,
    pub lookback_days: u32,
    pub max_results: Option<u32>,
    pub grouping: GroupingPolicy,
    pub lookup_timeout: Duration,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            radius_miles: 20.0,
            lookback_days: 30,
            max_results: None,
            grouping: GroupingPolicy::ByChecklist,
            lookup_timeout: Duration::from_secs(10),
        }
    }
}

/// Shared by every handler. Nothing in here is mutated after startup; all
/// per-request state lives in the handler.
#[derive(Clone)]
pub struct AppState {
    pub ebird: Arc<dyn ObservationSource>,
    pub geocoder: Arc<dyn GeocodingSource>,
    pub defaults: Arc<SearchDefaults>,
}

impl AppState {
    pub fn new(
        ebird: Arc<dyn ObservationSource>,
        geocoder: Arc<dyn GeocodingSource>,
        defaults: SearchDefaults,
    ) -> Self {
        Self {
            ebird,
            geocoder,
            defaults: Arc::new(defaults),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/observations", get(observations))
        .route("/api/species", get(species))
        .route("/api/suggestions", get(suggestions))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Server running on {}", listener.local_addr()?);
    axum::serve(listener, build_router(state)).await
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    module: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        module: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Raw query string for `/api/observations`. Everything is taken as text so
/// that malformed values surface as our own `InvalidRequest`.
#[derive(Debug, Default, Deserialize)]
pub struct ObservationParams {
    location: Option<String>,
    lat: Option<String>,
    lng: Option<String>,
    radius: Option<String>,
    days: Option<String>,
    species: Option<String>,
    group: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct ObservationSearch {
    location: LocationQuery,
    radius_miles: f64,
    lookback_days: u32,
    species_codes: Vec<String>,
    grouping: GroupingPolicy,
}

impl ObservationParams {
    fn validate(&self, defaults: &SearchDefaults) -> Result<ObservationSearch> {
        let location = LocationQuery::from_params(
            self.location.as_deref(),
            self.lat.as_deref(),
            self.lng.as_deref(),
        )?;

        let radius_miles = match non_empty(&self.radius) {
            None => defaults.radius_miles,
            Some(r) => r
                .parse::<f64>()
                .ok()
                .filter(|r| r.is_finite() && *r > 0.0)
                .ok_or_else(|| Error::InvalidRequest("radius must be a positive number".into()))?,
        };

        let lookback_days = match non_empty(&self.days) {
            None => defaults.lookback_days,
            Some(d) => d
                .parse::<u32>()
                .ok()
                .filter(|d| *d > 0)
                .ok_or_else(|| Error::InvalidRequest("days must be a positive integer".into()))?,
        };

        let grouping = match non_empty(&self.group) {
            None => defaults.grouping,
            Some("checklist") => GroupingPolicy::ByChecklist,
            Some("location") => GroupingPolicy::ByLocation,
            Some(other) => {
                return Err(Error::InvalidRequest(format!(
                    "group must be 'checklist' or 'location', got '{}'",
                    other
                )));
            }
        };

        Ok(ObservationSearch {
            location,
            radius_miles,
            lookback_days,
            species_codes: parse_species_codes(self.species.as_deref()),
            grouping,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Comma-separated species codes, lower-cased, without repeats.
fn parse_species_codes(raw: Option<&str>) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for code in raw.unwrap_or("").split(',') {
        let code = code.trim().to_lowercase();
        if !code.is_empty() && !codes.contains(&code) {
            codes.push(code);
        }
    }
    codes
}

async fn observations(
    State(state): State<AppState>,
    Query(params): Query<ObservationParams>,
) -> Result<Json<Vec<NormalizedObservation>>> {
    search_observations(&state, &params)
        .await
        .map(Json)
        .inspect_err(|e| error!("Error fetching observations: {}", e))
}

/// Geocode, fetch, enrich, aggregate.
pub async fn search_observations(
    state: &AppState,
    params: &ObservationParams,
) -> Result<Vec<NormalizedObservation>> {
    let search = params.validate(&state.defaults)?;
    let location = geocoder::resolve(state.geocoder.as_ref(), &search.location).await?;

    let request = ObservationRequest {
        location,
        radius_miles: search.radius_miles,
        lookback_days: search.lookback_days,
        species_codes: search.species_codes,
        max_results: state.defaults.max_results,
    };
    let raw = fetch_observations(state.ebird.as_ref(), &request).await?;
    let enriched = enrich(state.ebird.as_ref(), raw, state.defaults.lookup_timeout).await;
    let normalized = aggregate(enriched, search.grouping);

    info!(
        "Returning {} observations ({:?})",
        normalized.len(),
        search.grouping
    );
    Ok(normalized)
}

#[derive(Debug, Default, Deserialize)]
pub struct SpeciesParams {
    region: Option<String>,
    query: Option<String>,
}

async fn species(
    State(state): State<AppState>,
    Query(params): Query<SpeciesParams>,
) -> Result<Json<Vec<Species>>> {
    let region = non_empty(&params.region).unwrap_or(DEFAULT_REGION);
    let text = state
        .ebird
        .taxonomy(region)
        .await
        .inspect_err(|e| error!("Error fetching species list: {}", e))?;

    let species = filter_species(parse_taxonomy(&text), params.query.as_deref());
    Ok(Json(species))
}

#[derive(Debug, Default, Deserialize)]
pub struct SuggestionParams {
    query: Option<String>,
}

async fn suggestions(
    State(state): State<AppState>,
    Query(params): Query<SuggestionParams>,
) -> Result<Json<Vec<Place>>> {
    let query = params.query.as_deref().unwrap_or("");
    geocoder::suggestions(state.geocoder.as_ref(), query)
        .await
        .map(Json)
        .inspect_err(|e| error!("Error fetching location suggestions: {}", e))
}
