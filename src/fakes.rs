//! In-memory stand-ins for the external services.

use crate::error::{Error, Result};
use crate::record::{ChecklistMetadata, Place};
use crate::upstream::{EBIRD, GEOCODER, GeocodingSource, ObservationSource, RecentQuery};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Serves the same observation batch for every query, species-specific or not.
#[derive(Default)]
pub struct FakeEbird {
    pub observations: Value,
    pub checklists: HashMap<String, ChecklistMetadata>,
    pub taxonomy: String,
    pub fail_observations: bool,
    pub observation_calls: Mutex<Vec<Option<String>>>,
    pub checklist_calls: Mutex<Vec<String>>,
}

impl FakeEbird {
    pub fn with_observations(observations: Value) -> Self {
        Self {
            observations,
            ..Default::default()
        }
    }

    pub fn with_checklist(mut self, sub_id: &str, observer: Option<&str>, date: Option<&str>) -> Self {
        self.checklists.insert(
            sub_id.to_string(),
            ChecklistMetadata {
                sub_id: sub_id.to_string(),
                observer_name: observer.map(str::to_string),
                date: date.map(str::to_string),
            },
        );
        self
    }

    pub fn checklist_call_count(&self) -> usize {
        self.checklist_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ObservationSource for FakeEbird {
    async fn recent_observations(
        &self,
        _query: &RecentQuery,
        species_code: Option<&str>,
    ) -> Result<Value> {
        self.observation_calls
            .lock()
            .unwrap()
            .push(species_code.map(str::to_string));
        if self.fail_observations {
            return Err(Error::unavailable(EBIRD, "503 Service Unavailable"));
        }
        Ok(self.observations.clone())
    }

    async fn checklist(&self, sub_id: &str) -> Result<ChecklistMetadata> {
        self.checklist_calls.lock().unwrap().push(sub_id.to_string());
        tokio::task::yield_now().await;
        self.checklists
            .get(sub_id)
            .cloned()
            .ok_or_else(|| Error::unavailable(EBIRD, "404 Not Found"))
    }

    async fn taxonomy(&self, _region: &str) -> Result<String> {
        Ok(self.taxonomy.clone())
    }
}

#[derive(Default)]
pub struct FakeGeocoder {
    pub places: Vec<Place>,
    pub unavailable: bool,
    pub calls: Mutex<Vec<(String, Option<usize>)>>,
}

impl FakeGeocoder {
    pub fn with_places(places: &[(&str, &str, &str)]) -> Self {
        Self {
            places: places
                .iter()
                .map(|(name, lat, lon)| Place {
                    display_name: name.to_string(),
                    lat: lat.to_string(),
                    lon: lon.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl GeocodingSource for FakeGeocoder {
    async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<Place>> {
        self.calls.lock().unwrap().push((query.to_string(), limit));
        if self.unavailable {
            return Err(Error::unavailable(GEOCODER, "connection refused"));
        }
        let mut places = self.places.clone();
        if let Some(limit) = limit {
            places.truncate(limit);
        }
        Ok(places)
    }
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve_stub(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
