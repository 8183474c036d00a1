use crate::error::{Error, Result};
use crate::record::{Location, RawObservation};
use crate::upstream::{EBIRD, ObservationSource, RecentQuery};
use futures::future::try_join_all;
use log::{info, warn};
use serde_json::Value;
use std::collections::HashSet;

const KM_PER_MILE: f64 = 1.609344;
/// Provider limits for geo searches.
pub const MAX_DIST_KM: f64 = 50.0;
/// Smallest radius that survives the 3-decimal formatting of `dist`.
pub const MIN_DIST_KM: f64 = 0.001;
pub const MAX_BACK_DAYS: u32 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRequest {
    pub location: Location,
    pub radius_miles: f64,
    pub lookback_days: u32,
    /// Lower-case species codes; empty means every species.
    pub species_codes: Vec<String>,
    pub max_results: Option<u32>,
}

impl ObservationRequest {
    fn to_query(&self) -> RecentQuery {
        RecentQuery {
            lat: self.location.lat,
            lng: self.location.lng,
            dist_km: (self.radius_miles * KM_PER_MILE).clamp(MIN_DIST_KM, MAX_DIST_KM),
            back_days: self.lookback_days.clamp(1, MAX_BACK_DAYS),
            max_results: self.max_results,
        }
    }
}

/// Fetches recent observations, one upstream call per requested species
/// (or a single unfiltered call), unioned without duplicates.
pub async fn fetch_observations(
    source: &dyn ObservationSource,
    request: &ObservationRequest,
) -> Result<Vec<RawObservation>> {
    let query = request.to_query();

    let bodies = if request.species_codes.is_empty() {
        vec![source.recent_observations(&query, None).await?]
    } else {
        let calls = request
            .species_codes
            .iter()
            .map(|code| source.recent_observations(&query, Some(code.as_str())));
        try_join_all(calls).await?
    };

    let mut seen = HashSet::new();
    let mut observations = Vec::new();
    for body in bodies {
        for obs in parse_batch(body)? {
            let key = (obs.sub_id.clone(), obs.species_code.clone(), obs.obs_dt.clone());
            if seen.insert(key) {
                observations.push(obs);
            }
        }
    }

    if !request.species_codes.is_empty() {
        let before = observations.len();
        observations.retain(|obs| {
            request
                .species_codes
                .iter()
                .any(|code| *code == obs.species_code)
        });
        if observations.len() < before {
            warn!(
                "Discarded {} observations outside the requested species",
                before - observations.len()
            );
        }
    }

    info!(
        "Fetched {} observations within {:.1} km of {}",
        observations.len(),
        query.dist_km,
        request.location.display_name
    );
    Ok(observations)
}

/// Splits a response body into records. A body that is not an array fails
/// the batch; individual malformed records are dropped.
pub fn parse_batch(body: Value) -> Result<Vec<RawObservation>> {
    let Value::Array(items) = body else {
        return Err(Error::schema(EBIRD, "expected an array of observations"));
    };

    let total = items.len();
    let observations: Vec<RawObservation> = items
        .into_iter()
        .filter_map(|item| match parse_record(item) {
            Ok(obs) => Some(obs),
            Err(e) => {
                warn!("{}", e);
                None
            }
        })
        .collect();

    if observations.len() < total {
        warn!(
            "Dropped {} of {} malformed observation records",
            total - observations.len(),
            total
        );
    }
    Ok(observations)
}

fn parse_record(item: Value) -> Result<RawObservation> {
    serde_json::from_value(item).map_err(|e| Error::PartialRecord(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeEbird;
    use serde_json::json;

    fn request(species: &[&str]) -> ObservationRequest {
        ObservationRequest {
            location: Location {
                display_name: "Here".into(),
                lat: 40.0,
                lng: -74.0,
            },
            radius_miles: 20.0,
            lookback_days: 30,
            species_codes: species.iter().map(|s| s.to_string()).collect(),
            max_results: None,
        }
    }

    fn batch() -> Value {
        json!([
            {"speciesCode": "bkcchi", "comName": "Black-capped Chickadee", "obsDt": "2024-05-01 07:30", "lat": 40.0, "lng": -74.0, "subId": "S1", "howMany": 3},
            {"speciesCode": "amerob", "comName": "American Robin", "obsDt": "2024-05-01 07:30", "lat": 40.0, "lng": -74.0, "subId": "S1"},
            {"speciesCode": "norcar", "comName": "Northern Cardinal", "obsDt": "2024-05-02", "lat": 40.1, "lng": -74.1, "subId": "S2"}
        ])
    }

    #[test]
    fn test_provider_units() {
        let mut req = request(&[]);
        req.radius_miles = 10.0;
        req.lookback_days = 90;
        let query = req.to_query();
        assert!((query.dist_km - 16.09344).abs() < 1e-9);
        assert_eq!(query.back_days, 30);

        req.radius_miles = 100.0;
        req.lookback_days = 0;
        let query = req.to_query();
        assert_eq!(query.dist_km, MAX_DIST_KM);
        assert_eq!(query.back_days, 1);

        req.radius_miles = 0.0001;
        assert_eq!(req.to_query().dist_km, MIN_DIST_KM);
    }

    #[test]
    fn test_parse_batch_drops_malformed_records() {
        let body = json!([
            {"speciesCode": "bkcchi", "obsDt": "2024-05-01", "lat": 40.0, "lng": -74.0, "subId": "S1"},
            {"speciesCode": "amerob", "obsDt": "2024-05-01", "lat": "forty", "lng": -74.0, "subId": "S1"},
            "not an object"
        ]);
        let parsed = parse_batch(body).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].species_code, "bkcchi");
    }

    #[test]
    fn test_parse_batch_rejects_non_array() {
        let err = parse_batch(json!({"errors": []})).unwrap_err();
        assert!(matches!(err, Error::UpstreamSchema { .. }));
    }

    #[tokio::test]
    async fn test_unfiltered_single_call() {
        let ebird = FakeEbird::with_observations(batch());
        let obs = fetch_observations(&ebird, &request(&[])).await.unwrap();
        assert_eq!(obs.len(), 3);
        assert_eq!(*ebird.observation_calls.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn test_species_filter_does_not_widen() {
        let ebird = FakeEbird::with_observations(batch());
        let obs = fetch_observations(&ebird, &request(&["bkcchi"])).await.unwrap();
        assert_eq!(obs.len(), 1);
        assert!(obs.iter().all(|o| o.species_code == "bkcchi"));
    }

    #[tokio::test]
    async fn test_species_filter_is_exact() {
        let body = json!([
            {"speciesCode": "bkcchi", "obsDt": "2024-05-01", "lat": 40.0, "lng": -74.0, "subId": "S1"},
            {"speciesCode": "BKCCHI", "obsDt": "2024-05-01", "lat": 40.0, "lng": -74.0, "subId": "S2"},
            {"speciesCode": "bkcchi2", "obsDt": "2024-05-01", "lat": 40.0, "lng": -74.0, "subId": "S3"}
        ]);
        let ebird = FakeEbird::with_observations(body);
        let obs = fetch_observations(&ebird, &request(&["bkcchi"])).await.unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].sub_id, "S1");
    }

    #[tokio::test]
    async fn test_multiple_species_union_is_deduplicated() {
        let ebird = FakeEbird::with_observations(batch());
        let obs = fetch_observations(&ebird, &request(&["bkcchi", "norcar"]))
            .await
            .unwrap();

        assert_eq!(ebird.observation_calls.lock().unwrap().len(), 2);
        // Both calls return the full batch; each record appears once.
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].species_code, "bkcchi");
        assert_eq!(obs[1].species_code, "norcar");
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let ebird = FakeEbird {
            fail_observations: true,
            ..Default::default()
        };
        let err = fetch_observations(&ebird, &request(&[])).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamUnavailable { .. }));
    }
}
