use crate::error::{Error, Result};
use crate::record::{ANONYMOUS_OBSERVER, ChecklistMetadata, EnrichedObservation, RawObservation};
use crate::upstream::{EBIRD, ObservationSource};
use futures::future::join_all;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Distinct checklist ids in first-seen order.
pub fn distinct_checklists(observations: &[RawObservation]) -> Vec<String> {
    let mut seen = HashSet::new();
    observations
        .iter()
        .filter(|obs| seen.insert(obs.sub_id.as_str()))
        .map(|obs| obs.sub_id.clone())
        .collect()
}

async fn lookup(
    source: &dyn ObservationSource,
    sub_id: String,
    timeout: Duration,
) -> (String, Result<ChecklistMetadata>) {
    let result = match tokio::time::timeout(timeout, source.checklist(&sub_id)).await {
        Ok(result) => result,
        Err(_) => Err(Error::unavailable(EBIRD, "checklist lookup timed out")),
    };
    (sub_id, result)
}

/// Attaches observer name and checklist date to every observation.
///
/// Issues exactly one lookup per distinct checklist, all concurrently. A
/// failed lookup degrades its observations to `Anonymous` with their own
/// date instead of failing the batch.
pub async fn enrich(
    source: &dyn ObservationSource,
    observations: Vec<RawObservation>,
    timeout: Duration,
) -> Vec<EnrichedObservation> {
    let ids = distinct_checklists(&observations);
    let lookups = ids.into_iter().map(|id| lookup(source, id, timeout));
    let results = join_all(lookups).await;

    let mut failed = 0;
    let checklists: HashMap<String, Option<ChecklistMetadata>> = results
        .into_iter()
        .map(|(id, result)| match result {
            Ok(meta) => {
                debug!("Checklist {} observer: {:?}", meta.sub_id, meta.observer_name);
                (id, Some(meta))
            }
            Err(e) => {
                warn!("Checklist {} unavailable, observer left anonymous: {}", id, e);
                failed += 1;
                (id, None)
            }
        })
        .collect();

    info!(
        "Resolved {} of {} checklists",
        checklists.len() - failed,
        checklists.len()
    );

    observations
        .into_iter()
        .map(|raw| {
            let meta = checklists.get(&raw.sub_id).and_then(Option::as_ref);
            let observer_name = meta
                .and_then(|m| m.observer_name.as_deref())
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .unwrap_or(ANONYMOUS_OBSERVER)
                .to_string();
            let checklist_date = meta
                .and_then(|m| m.date.clone())
                .unwrap_or_else(|| raw.obs_dt.clone());

            EnrichedObservation {
                raw,
                observer_name,
                checklist_date,
            }
        })
        .collect()
}
