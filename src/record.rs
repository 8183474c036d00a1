use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CHECKLIST_URL_BASE: &str = "https://ebird.org/checklist/";
pub const ANONYMOUS_OBSERVER: &str = "Anonymous";

/// One observation as the provider reports it.
///
/// `speciesCode`, `obsDt`, `lat`, `lng` and `subId` are required; a record
/// missing any of them fails to deserialize and is dropped by the fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObservation {
    pub species_code: String,
    #[serde(default)]
    pub com_name: String,
    #[serde(default)]
    pub sci_name: String,
    #[serde(default)]
    pub loc_name: String,
    pub obs_dt: String,
    #[serde(default)]
    pub how_many: Option<u32>,
    pub lat: f64,
    pub lng: f64,
    pub sub_id: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChecklistMetadata {
    pub sub_id: String,
    pub observer_name: Option<String>,
    pub date: Option<String>,
}

/// A raw observation plus what the enricher resolved for its checklist.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedObservation {
    pub raw: RawObservation,
    pub observer_name: String,
    pub checklist_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedObservation {
    pub species_code: String,
    pub species_name: String,
    pub species: String,
    pub scientific_name: String,
    pub location_name: String,
    pub observation_date: String,
    pub count: u32,
    pub observation_count: u32,
    pub lat: f64,
    pub lng: f64,
    pub checklist_id: String,
    pub checklist_url: String,
    pub observer_name: String,
    pub checklist_date: String,
}

impl NormalizedObservation {
    pub fn from_enriched(obs: EnrichedObservation) -> Self {
        let EnrichedObservation {
            raw,
            observer_name,
            checklist_date,
        } = obs;
        // Providers report "X" for present-but-uncounted, which arrives as None.
        let count = raw.how_many.filter(|&n| n > 0).unwrap_or(1);

        Self {
            checklist_url: checklist_url(&raw.sub_id),
            species_code: raw.species_code,
            species_name: raw.com_name.clone(),
            species: raw.com_name,
            scientific_name: raw.sci_name,
            location_name: raw.loc_name,
            observation_date: raw.obs_dt,
            count,
            observation_count: count,
            lat: raw.lat,
            lng: raw.lng,
            checklist_id: raw.sub_id,
            observer_name,
            checklist_date,
        }
    }
}

pub fn checklist_url(sub_id: &str) -> String {
    format!("{}{}", CHECKLIST_URL_BASE, sub_id)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub display_name: String,
    pub lat: f64,
    pub lng: f64,
}

/// A geocoding candidate, passed through to the client as the service sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub display_name: String,
    pub lat: String,
    pub lon: String,
}

impl Place {
    /// Reads one candidate without failing on odd shapes. Coordinates may come
    /// as strings or numbers; anything else leaves them empty, which callers
    /// treat as unusable.
    pub fn from_value(value: &Value) -> Place {
        let text = |key: &str| match value.get(key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        Place {
            display_name: text("display_name"),
            lat: text("lat"),
            lon: text("lon"),
        }
    }

    /// Both coordinates as finite numbers, if they parse.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let lat = self.lat.parse::<f64>().ok().filter(|v| v.is_finite())?;
        let lon = self.lon.parse::<f64>().ok().filter(|v| v.is_finite())?;
        Some((lat, lon))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Species {
    pub code: String,
    pub com_name: String,
    pub sci_name: String,
}

#[cfg(test)]
pub(crate) fn raw(species_code: &str, sub_id: &str, obs_dt: &str, lat: f64, lng: f64) -> RawObservation {
    RawObservation {
        species_code: species_code.to_string(),
        com_name: format!("{} common", species_code),
        sci_name: format!("{} sci", species_code),
        loc_name: "Somewhere".to_string(),
        obs_dt: obs_dt.to_string(),
        how_many: Some(2),
        lat,
        lng,
        sub_id: sub_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enriched(how_many: Option<u32>) -> EnrichedObservation {
        let mut r = raw("bkcchi", "S100", "2024-05-01 07:30", 40.0, -74.0);
        r.how_many = how_many;
        EnrichedObservation {
            raw: r,
            observer_name: "Jo".to_string(),
            checklist_date: "2024-05-01 07:30".to_string(),
        }
    }

    #[test]
    fn test_missing_count_defaults_to_one() {
        assert_eq!(NormalizedObservation::from_enriched(enriched(None)).count, 1);
        assert_eq!(NormalizedObservation::from_enriched(enriched(Some(0))).count, 1);
        assert_eq!(NormalizedObservation::from_enriched(enriched(Some(7))).count, 7);
    }

    #[test]
    fn test_field_mapping() {
        let n = NormalizedObservation::from_enriched(enriched(Some(3)));
        assert_eq!(n.species_name, "bkcchi common");
        assert_eq!(n.species, n.species_name);
        assert_eq!(n.scientific_name, "bkcchi sci");
        assert_eq!(n.checklist_url, "https://ebird.org/checklist/S100");
        assert_eq!(n.observer_name, "Jo");

        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["speciesName"], "bkcchi common");
        assert_eq!(json["checklistId"], "S100");
        assert_eq!(json["count"], 3);
    }

    #[test]
    fn test_place_from_value() {
        let place = Place::from_value(&serde_json::json!({
            "display_name": "Ithaca", "lat": 42.44, "lon": "-76.5"
        }));
        assert_eq!(place.lat, "42.44");
        assert_eq!(place.coordinates(), Some((42.44, -76.5)));

        let place = Place::from_value(&serde_json::json!({"display_name": "Odd", "lat": null}));
        assert_eq!(place.display_name, "Odd");
        assert!(place.coordinates().is_none());

        assert!(Place::from_value(&serde_json::json!("text")).coordinates().is_none());
    }

    #[test]
    fn test_raw_requires_sub_id() {
        let value = serde_json::json!({
            "speciesCode": "bkcchi",
            "obsDt": "2024-05-01",
            "lat": 40.0,
            "lng": -74.0
        });
        assert!(serde_json::from_value::<RawObservation>(value).is_err());
    }
}
