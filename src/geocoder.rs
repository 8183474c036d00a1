use crate::error::{Error, Result};
use crate::record::{Location, Place};
use crate::upstream::GeocodingSource;
use log::{debug, warn};

pub const SUGGESTION_LIMIT: usize = 5;

/// Where a search is centred: free text to geocode, or explicit coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationQuery {
    Text(String),
    Coordinates { lat: f64, lng: f64 },
}

impl LocationQuery {
    /// Builds a query from raw request parameters. Coordinates win when both
    /// `lat` and `lng` are present.
    pub fn from_params(
        location: Option<&str>,
        lat: Option<&str>,
        lng: Option<&str>,
    ) -> Result<Self> {
        match (lat, lng) {
            (Some(lat), Some(lng)) => {
                let lat = parse_coordinate("lat", lat, 90.0)?;
                let lng = parse_coordinate("lng", lng, 180.0)?;
                Ok(LocationQuery::Coordinates { lat, lng })
            }
            (Some(_), None) | (None, Some(_)) => Err(Error::InvalidRequest(
                "Both lat and lng are required".to_string(),
            )),
            (None, None) => match location.map(str::trim) {
                Some(text) if !text.is_empty() => Ok(LocationQuery::Text(text.to_string())),
                _ => Err(Error::InvalidRequest("Location is required".to_string())),
            },
        }
    }
}

fn parse_coordinate(name: &str, value: &str, limit: f64) -> Result<f64> {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v.abs() <= limit => Ok(v),
        _ => Err(Error::InvalidRequest(format!(
            "{} must be a number between -{} and {}",
            name, limit, limit
        ))),
    }
}

/// Resolves a query to a point. Free text takes the first candidate only.
pub async fn resolve(source: &dyn GeocodingSource, query: &LocationQuery) -> Result<Location> {
    match query {
        LocationQuery::Coordinates { lat, lng } => Ok(Location {
            display_name: format!("{:.4}, {:.4}", lat, lng),
            lat: *lat,
            lng: *lng,
        }),
        LocationQuery::Text(text) => {
            let places = source.search(text, None).await?;
            let first = places
                .into_iter()
                .next()
                .ok_or_else(|| Error::LocationNotFound(text.clone()))?;
            let location = place_to_location(first).ok_or_else(|| {
                warn!("Geocoder returned malformed coordinates for '{}'", text);
                Error::LocationNotFound(text.clone())
            })?;
            debug!(
                "Resolved '{}' to {} ({}, {})",
                text, location.display_name, location.lat, location.lng
            );
            Ok(location)
        }
    }
}

fn place_to_location(place: Place) -> Option<Location> {
    let (lat, lng) = place.coordinates()?;
    Some(Location {
        display_name: place.display_name,
        lat,
        lng,
    })
}

/// Autocomplete candidates for a partial place name.
pub async fn suggestions(source: &dyn GeocodingSource, query: &str) -> Result<Vec<Place>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(Error::InvalidRequest("Query is required".to_string()));
    }
    let places = source.search(query, Some(SUGGESTION_LIMIT)).await?;
    let total = places.len();
    let places: Vec<Place> = places
        .into_iter()
        .filter(|place| place.coordinates().is_some())
        .take(SUGGESTION_LIMIT)
        .collect();
    if places.len() < total.min(SUGGESTION_LIMIT) {
        warn!("Skipped geocoding candidates without usable coordinates for '{}'", query);
    }
    Ok(places)
}
