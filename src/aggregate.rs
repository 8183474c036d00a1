use crate::record::{EnrichedObservation, NormalizedObservation};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use clap::ValueEnum;
use log::debug;
use std::collections::HashMap;

/// How enriched observations collapse into the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GroupingPolicy {
    /// Every observation kept, ordered so each checklist's records are adjacent
    #[value(name = "checklist")]
    ByChecklist,
    /// One observation per ~11m cell, the most recent one
    #[value(name = "location")]
    ByLocation,
}

const KEY_SCALE: f64 = 10_000.0;

/// Coordinates rounded to 4 decimal places, as integers so that -0.0 and 0.0
/// share a key.
pub fn location_key(lat: f64, lng: f64) -> (i64, i64) {
    (
        (lat * KEY_SCALE).round() as i64,
        (lng * KEY_SCALE).round() as i64,
    )
}

/// Parses the provider's observation timestamps. Date-only values count as
/// midnight.
pub fn parse_obs_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    const FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// True when `candidate` was observed strictly after `current`. Unparseable
/// dates sort before any parseable one.
fn is_more_recent(candidate: &str, current: &str) -> bool {
    parse_obs_date(candidate) > parse_obs_date(current)
}

pub fn group_by_checklist(observations: Vec<EnrichedObservation>) -> Vec<EnrichedObservation> {
    let mut order: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<EnrichedObservation>> = Vec::new();

    for obs in observations {
        let next = groups.len();
        let index = *order.entry(obs.raw.sub_id.clone()).or_insert(next);
        if index == next {
            groups.push(Vec::new());
        }
        groups[index].push(obs);
    }

    groups.into_iter().flatten().collect()
}

pub fn dedup_by_location(observations: Vec<EnrichedObservation>) -> Vec<EnrichedObservation> {
    let total = observations.len();
    let mut slots: HashMap<(i64, i64), usize> = HashMap::new();
    let mut survivors: Vec<EnrichedObservation> = Vec::new();

    for obs in observations {
        let key = location_key(obs.raw.lat, obs.raw.lng);
        match slots.get(&key) {
            Some(&i) => {
                if is_more_recent(&obs.raw.obs_dt, &survivors[i].raw.obs_dt) {
                    survivors[i] = obs;
                }
            }
            None => {
                slots.insert(key, survivors.len());
                survivors.push(obs);
            }
        }
    }

    debug!(
        "Location dedup kept {} of {} observations",
        survivors.len(),
        total
    );
    survivors
}

/// Applies the grouping policy and maps to the output schema.
pub fn aggregate(
    observations: Vec<EnrichedObservation>,
    policy: GroupingPolicy,
) -> Vec<NormalizedObservation> {
    let grouped = match policy {
        GroupingPolicy::ByChecklist => group_by_checklist(observations),
        GroupingPolicy::ByLocation => dedup_by_location(observations),
    };

    grouped
        .into_iter()
        .map(NormalizedObservation::from_enriched)
        .collect()
}
