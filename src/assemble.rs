//! Builds site, census and observation records from labeled fields, and
//! collapses sites across years into surrogate site IDs.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::era::Era;
use crate::error::ExtractError;
use crate::extract::{
    clean_field_text, extract_continuity, extract_coverage, extract_location, extract_size,
    extract_total, Continuity, Coverage,
};
use crate::fields::{FieldLabel, FieldMap, SiteKey};
use crate::species::{Similarity, SpeciesResolver};

lazy_static! {
    static ref PARENTHETICAL_RE: Regex = Regex::new(r"\([^)]*\)").unwrap();
}

pub const SITE_COLUMNS: [&str; 6] = [
    "siteID",
    "sitename",
    "latitude",
    "longitude",
    "location",
    "description",
];

pub const CENSUS_COLUMNS: [&str; 15] = [
    "siteID",
    "sitename",
    "siteNumInCensus",
    "year",
    "established",
    "ts_length",
    "cov_hours",
    "cov_visits",
    "cov_times",
    "cov_notes",
    "area",
    "richness",
    "territories",
    "terr_notes",
    "weather",
];

pub const OBSERVATION_COLUMNS: [&str; 5] = ["siteID", "year", "species", "count", "status"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Breeder,
    Visitor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SiteFragment {
    pub key: SiteKey,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub location: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CensusFragment {
    pub key: SiteKey,
    pub established: Option<i32>,
    pub ts_length: Option<u32>,
    pub coverage: Option<Coverage>,
    pub area: Option<f64>,
    pub richness: u32,
    pub territories: f64,
    pub terr_notes: Option<String>,
    pub weather: Option<String>,
    pub previously_called: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservationFragment {
    pub species: Option<String>,
    pub count: Option<String>,
    pub status: Status,
}

/// Everything extracted from one block.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteBundle {
    pub site: SiteFragment,
    pub census: CensusFragment,
    pub observations: Vec<ObservationFragment>,
}

/// One entry of a Census field before species resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CensusEntry {
    pub species: String,
    pub count: Option<String>,
}

fn optional_text(fields: &FieldMap, label: FieldLabel) -> Option<String> {
    fields
        .get(label)
        .map(clean_field_text)
        .filter(|text| !text.is_empty())
}

fn required_text(fields: &FieldMap, label: FieldLabel) -> Result<String, ExtractError> {
    optional_text(fields, label).ok_or(ExtractError::MissingField(label))
}

/// Splits a Census field into species/count entries. Parentheticals are
/// dropped first since they may contain semicolons.
pub fn split_census(text: &str) -> Vec<CensusEntry> {
    let stripped = PARENTHETICAL_RE.replace_all(text, "");
    let stripped = stripped.replace("territories", "");
    stripped
        .split(';')
        .filter_map(|entry| {
            let entry = entry.trim_matches(|c: char| c.is_whitespace() || c == '.');
            if entry.is_empty() {
                return None;
            }
            Some(match entry.split_once(',') {
                Some((species, count)) => CensusEntry {
                    species: species.trim().to_string(),
                    count: clean_count(count),
                },
                None => CensusEntry {
                    species: entry.to_string(),
                    count: None,
                },
            })
        })
        .collect()
}

/// Count as a decimal string; a decimal point misread as a comma is restored.
fn clean_count(raw: &str) -> Option<String> {
    let count = raw
        .trim_matches(|c: char| c.is_whitespace() || c == '.' || c == ',')
        .replace(',', ".")
        .replace(' ', "");
    if count.is_empty() {
        None
    } else {
        Some(count)
    }
}

pub fn split_visitors(text: &str) -> Vec<String> {
    PARENTHETICAL_RE
        .replace_all(text, "")
        .split(',')
        .map(|s| s.trim_matches(|c: char| c.is_whitespace() || c == '.'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extracts one site/year. Any failure drops the whole record; species are
/// only resolved once every typed field has parsed.
pub fn assemble_block<S: Similarity>(
    fields: &FieldMap,
    era: Era,
    resolver: &mut SpeciesResolver<S>,
) -> Result<SiteBundle, ExtractError> {
    let year = fields.site_key.year;

    let location = required_text(fields, FieldLabel::Location)?;
    let coordinates = extract_location(&location)?;
    let total = extract_total(&required_text(fields, FieldLabel::Total)?)?;

    let area = optional_text(fields, FieldLabel::Size)
        .map(|text| extract_size(&text))
        .transpose()?;
    let coverage = optional_text(fields, FieldLabel::Coverage)
        .map(|text| extract_coverage(&text, era))
        .transpose()?;
    let continuity: Option<Continuity> = optional_text(fields, FieldLabel::Continuity)
        .map(|text| extract_continuity(&text, year, era))
        .transpose()?;

    let mut observations = Vec::new();
    if let Some(census) = fields.get(FieldLabel::Census) {
        for entry in split_census(census) {
            observations.push(ObservationFragment {
                species: resolver.resolve(&entry.species),
                count: entry.count,
                status: Status::Breeder,
            });
        }
    }
    if let Some(visitors) = fields.get(FieldLabel::Visitors) {
        for raw in split_visitors(visitors) {
            observations.push(ObservationFragment {
                species: resolver.resolve(&raw),
                count: None,
                status: Status::Visitor,
            });
        }
    }

    Ok(SiteBundle {
        site: SiteFragment {
            key: fields.site_key,
            name: clean_field_text(&fields.site_name),
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            location,
            description: optional_text(fields, FieldLabel::DescriptionOfPlot),
        },
        census: CensusFragment {
            key: fields.site_key,
            established: continuity.map(|c| c.established),
            ts_length: continuity.and_then(|c| c.length),
            coverage,
            area,
            richness: total.richness,
            territories: total.territories,
            terr_notes: total.notes,
            weather: optional_text(fields, FieldLabel::Weather),
            previously_called: optional_text(fields, FieldLabel::PreviouslyCalled),
        },
        observations,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteRow {
    #[serde(rename = "siteID")]
    pub site_id: u32,
    pub sitename: String,
    pub latitude: f64,
    pub longitude: f64,
    pub location: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CensusRow {
    #[serde(rename = "siteID")]
    pub site_id: u32,
    pub sitename: String,
    #[serde(rename = "siteNumInCensus")]
    pub site_num_in_census: u32,
    pub year: i32,
    pub established: Option<i32>,
    pub ts_length: Option<u32>,
    pub cov_hours: Option<f64>,
    pub cov_visits: Option<u32>,
    pub cov_times: Option<String>,
    pub cov_notes: Option<String>,
    pub area: Option<f64>,
    pub richness: u32,
    pub territories: f64,
    pub terr_notes: Option<String>,
    pub weather: Option<String>,
    #[serde(skip)]
    pub previously_called: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationRow {
    #[serde(rename = "siteID")]
    pub site_id: u32,
    pub year: i32,
    pub species: Option<String>,
    pub count: Option<String>,
    pub status: Status,
}

/// The three linked output tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
    pub sites: Vec<SiteRow>,
    pub censuses: Vec<CensusRow>,
    pub observations: Vec<ObservationRow>,
}

/// Collects bundles across all years; [`Assembler::finish`] is the
/// deduplication barrier.
#[derive(Debug, Default)]
pub struct Assembler {
    bundles: Vec<SiteBundle>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, bundle: SiteBundle) {
        self.bundles.push(bundle);
    }

    pub fn extend(&mut self, bundles: impl IntoIterator<Item = SiteBundle>) {
        self.bundles.extend(bundles);
    }

    /// Sites sharing (name, latitude, longitude) get one ID, numbered from 1
    /// in first-seen order.
    pub fn finish(self) -> Tables {
        let mut ids: HashMap<(String, u64, u64), u32> = HashMap::new();
        let mut tables = Tables::default();

        for bundle in self.bundles {
            let SiteBundle {
                site,
                census,
                observations,
            } = bundle;
            let identity = (site.name.clone(), site.latitude.to_bits(), site.longitude.to_bits());
            let next_id = ids.len() as u32 + 1;
            let site_id = *ids.entry(identity).or_insert_with(|| {
                tables.sites.push(SiteRow {
                    site_id: next_id,
                    sitename: site.name.clone(),
                    latitude: site.latitude,
                    longitude: site.longitude,
                    location: site.location.clone(),
                    description: site.description.clone(),
                });
                next_id
            });

            let year = census.key.year;
            let (cov_hours, cov_visits, cov_times, cov_notes) = match census.coverage {
                Some(c) => (
                    Some(c.hours),
                    c.visits,
                    c.times,
                    Some(c.notes).filter(|n| !n.is_empty()),
                ),
                None => (None, None, None, None),
            };
            tables.censuses.push(CensusRow {
                site_id,
                sitename: site.name,
                site_num_in_census: census.key.number,
                year,
                established: census.established,
                ts_length: census.ts_length,
                cov_hours,
                cov_visits,
                cov_times,
                cov_notes,
                area: census.area,
                richness: census.richness,
                territories: census.territories,
                terr_notes: census.terr_notes,
                weather: census.weather,
                previously_called: census.previously_called,
            });

            tables
                .observations
                .extend(observations.into_iter().map(|obs| ObservationRow {
                    site_id,
                    year,
                    species: obs.species,
                    count: obs.count,
                    status: obs.status,
                }));
        }

        tables
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fields::split_fields;
    use crate::species::{CanonicalSpeciesIndex, DEFAULT_THRESHOLD};

    fn resolver() -> SpeciesResolver {
        SpeciesResolver::new(
            Arc::new(CanonicalSpeciesIndex::from_names([
                "Wood Thrush",
                "Solitary Vireo",
                "Blue Jay",
                "American Crow",
            ])),
            DEFAULT_THRESHOLD,
        )
    }

    const BLOCK: &str = "Location: 40°30'N, 75°15'W; Bucks Co., Pa.\n\
                         Continuity: Established 1985; 6 yr.\n\
                         Size: 8.1 ha.\n\
                         Description of Plot: Mixed upland forest.\n\
                         Weather: Mostly clear.\n\
                         Coverage: 20 h; 8 visits (6 sunrise); 5 May-20 June.\n\
                         Census: Wood Thrush, 4.0; Solitary Vireo, 1,0 (first record; nested).\n\
                         Total: 2 species; 5.0 territories (62/km²).\n\
                         Visitors: Blue Jay, American Crow.\n";

    #[test]
    fn census_entries_with_comma_decimal() {
        let entries = split_census("Wood Thrush, 4.0; Solitary Vireo, 1,0 (note; x);\nVeery, +.");
        assert_eq!(
            entries,
            vec![
                CensusEntry { species: "Wood Thrush".into(), count: Some("4.0".into()) },
                CensusEntry { species: "Solitary Vireo".into(), count: Some("1.0".into()) },
                CensusEntry { species: "Veery".into(), count: Some("+".into()) },
            ]
        );
    }

    #[test]
    fn census_entry_without_count() {
        let entries = split_census("Bobolink 9.0 territories; ;");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].count, None);
    }

    #[test]
    fn visitors_split_on_commas() {
        assert_eq!(
            split_visitors("Blue Jay, American Crow (flyover),\nCommon Raven."),
            vec!["Blue Jay", "American Crow", "Common Raven"]
        );
    }

    #[test]
    fn full_block_assembles() {
        let fields = split_fields(BLOCK, "ALPHA WOODS", 3, 1991);
        let mut resolver = resolver();
        let bundle = assemble_block(&fields, Era::Modern, &mut resolver).unwrap();

        assert_eq!(bundle.site.name, "ALPHA WOODS");
        assert_eq!(bundle.site.latitude, 40.5);
        assert_eq!(bundle.site.description.as_deref(), Some("Mixed upland forest."));
        assert_eq!(bundle.census.established, Some(1985));
        assert_eq!(bundle.census.ts_length, Some(6));
        assert_eq!(bundle.census.area, Some(8.1));
        assert_eq!(bundle.census.richness, 2);
        assert_eq!(bundle.census.coverage.as_ref().and_then(|c| c.visits), Some(8));

        assert_eq!(bundle.observations.len(), 4);
        assert_eq!(bundle.observations[1].species.as_deref(), Some("Solitary Vireo"));
        assert_eq!(bundle.observations[1].count.as_deref(), Some("1.0"));
        assert_eq!(bundle.observations[3].status, Status::Visitor);
        assert_eq!(bundle.observations[3].count, None);
    }

    #[test]
    fn missing_total_drops_record() {
        let fields = split_fields("Location: 40°30'N, 75°15'W\nCensus: Wood Thrush, 1.0.\n", "A", 1, 1991);
        let mut resolver = resolver();
        assert_eq!(
            assemble_block(&fields, Era::Modern, &mut resolver),
            Err(ExtractError::MissingField(FieldLabel::Total))
        );
        // Nothing was resolved for a dropped record.
        assert_eq!(resolver.cached(), 0);
    }

    #[test]
    fn empty_block_is_missing_location() {
        let fields = split_fields("", "BLANK", 2, 1991);
        let err = assemble_block(&fields, Era::Modern, &mut resolver()).unwrap_err();
        assert_eq!(err, ExtractError::MissingField(FieldLabel::Location));
    }

    #[test]
    fn unparsable_optional_field_drops_record() {
        let block = "Location: 40°30'N, 75°15'W\nSize: unknown\nTotal: 1 species; 1 territories.\n";
        let fields = split_fields(block, "A", 1, 1991);
        let err = assemble_block(&fields, Era::Modern, &mut resolver()).unwrap_err();
        assert!(matches!(err, ExtractError::Unparsable { field: FieldLabel::Size, .. }));
    }

    #[test]
    fn optional_fields_default_to_none() {
        let block = "Location: 40°30'N, 75°15'W\nTotal: 1 species; 1 territories.\n";
        let fields = split_fields(block, "A", 1, 1991);
        let bundle = assemble_block(&fields, Era::Modern, &mut resolver()).unwrap();
        assert_eq!(bundle.census.area, None);
        assert_eq!(bundle.census.coverage, None);
        assert_eq!(bundle.census.established, None);
        assert_eq!(bundle.census.weather, None);
        assert!(bundle.observations.is_empty());
    }

    #[test]
    fn same_site_across_years_shares_id() {
        let mut resolver = resolver();
        let mut assembler = Assembler::new();
        for (year, number) in [(1990, 4), (1991, 7)] {
            let fields = split_fields(BLOCK, "ALPHA WOODS", number, year);
            assembler.add(assemble_block(&fields, Era::Modern, &mut resolver).unwrap());
        }
        let other = split_fields(
            "Location: 41°0'N, 75°15'W\nTotal: 1 species; 1 territories.\n",
            "ALPHA WOODS",
            8,
            1991,
        );
        assembler.add(assemble_block(&other, Era::Modern, &mut resolver).unwrap());

        let tables = assembler.finish();
        assert_eq!(tables.sites.len(), 2);
        assert_eq!(tables.sites[0].site_id, 1);
        assert_eq!(tables.sites[1].site_id, 2);
        let ids: Vec<(u32, i32, u32)> = tables
            .censuses
            .iter()
            .map(|c| (c.site_id, c.year, c.site_num_in_census))
            .collect();
        assert_eq!(ids, vec![(1, 1990, 4), (1, 1991, 7), (2, 1991, 8)]);
        assert!(tables.observations.iter().all(|o| o.site_id == 1));
        assert_eq!(tables.observations.len(), 8);
    }
}
