use crate::record::Species;
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{info, warn};

const SPECIES_CATEGORY: &str = "species";

/// Parses the taxonomy feed (scientific name, common name, code, category,
/// ...) into species entries. Rows of any other category are skipped, which
/// also drops a header row if the feed carries one.
pub fn parse_taxonomy(text: &str) -> Vec<Species> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let mut skipped = 0;
    let species: Vec<Species> = reader
        .records()
        .filter_map(|row| match row {
            Ok(row) => Some(row),
            Err(e) => {
                skipped += 1;
                warn!("Skipping unreadable taxonomy row: {}", e);
                None
            }
        })
        .filter_map(|row| species_from_row(&row))
        .collect();

    info!(
        "Parsed {} species from taxonomy ({} unreadable rows)",
        species.len(),
        skipped
    );
    species
}

fn species_from_row(row: &StringRecord) -> Option<Species> {
    let sci_name = row.get(0).unwrap_or("");
    let com_name = row.get(1).unwrap_or("");
    let code = row.get(2).unwrap_or("");
    let category = row.get(3).unwrap_or("");

    if category != SPECIES_CATEGORY {
        return None;
    }

    let code = if code.is_empty() {
        initials(sci_name)
    } else {
        code.to_string()
    };
    let com_name = if com_name.is_empty() { sci_name } else { com_name };

    if code.is_empty() || com_name.is_empty() || sci_name.is_empty() {
        return None;
    }
    Some(Species {
        code,
        com_name: com_name.to_string(),
        sci_name: sci_name.to_string(),
    })
}

fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .collect::<String>()
        .to_lowercase()
}

/// Case-insensitive substring match on common name, scientific name or code.
pub fn filter_species(species: Vec<Species>, query: Option<&str>) -> Vec<Species> {
    let needle = match query.map(str::trim) {
        Some(q) if !q.is_empty() => q.to_lowercase(),
        _ => return species,
    };

    species
        .into_iter()
        .filter(|s| {
            s.com_name.to_lowercase().contains(&needle)
                || s.sci_name.to_lowercase().contains(&needle)
                || s.code.to_lowercase().contains(&needle)
        })
        .collect()
}
