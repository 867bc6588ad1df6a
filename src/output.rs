//! CSV output for the three tables and the review diagnostics.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{Writer, WriterBuilder};
use log::info;
use serde::Serialize;

use crate::assemble::{Tables, CENSUS_COLUMNS, OBSERVATION_COLUMNS, SITE_COLUMNS};
use crate::pipeline::SkippedRecord;
use crate::species::MatchDiagnostic;

pub const SITES_FILE: &str = "sites.csv";
pub const CENSUSES_FILE: &str = "censuses.csv";
pub const OBSERVATIONS_FILE: &str = "observations.csv";
pub const UNMATCHED_FILE: &str = "unmatched_species.csv";
pub const IMPERFECT_FILE: &str = "imperfect_matches.csv";
pub const SKIPPED_FILE: &str = "skipped_records.csv";

const DIAGNOSTIC_COLUMNS: [&str; 3] = ["raw", "candidate", "score"];
const SKIPPED_COLUMNS: [&str; 4] = ["year", "siteNumInCensus", "sitename", "reason"];

fn create_writer(path: &Path) -> Result<Writer<File>> {
    WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))
}

/// Writes `rows` with a header row. The header is written explicitly for an
/// empty table, since serde only emits it alongside the first record.
fn write_rows<T: Serialize>(path: &Path, columns: &[&str], rows: &[T]) -> Result<usize> {
    let mut wtr = create_writer(path)?;
    if rows.is_empty() {
        wtr.write_record(columns)
            .with_context(|| format!("Failed to write header to: {}", path.display()))?;
    }
    for row in rows {
        wtr.serialize(row)
            .with_context(|| format!("Failed to write record to: {}", path.display()))?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to flush output file: {}", path.display()))?;
    Ok(rows.len())
}

fn prepare_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))
}

/// Writes sites, censuses and observations; returns the paths written.
pub fn write_tables(dir: &Path, tables: &Tables) -> Result<Vec<PathBuf>> {
    prepare_dir(dir)?;
    let sites = dir.join(SITES_FILE);
    let censuses = dir.join(CENSUSES_FILE);
    let observations = dir.join(OBSERVATIONS_FILE);

    let n = write_rows(&sites, &SITE_COLUMNS, &tables.sites)?;
    info!("Wrote {} sites to {}", n, sites.display());
    let n = write_rows(&censuses, &CENSUS_COLUMNS, &tables.censuses)?;
    info!("Wrote {} censuses to {}", n, censuses.display());
    let n = write_rows(&observations, &OBSERVATION_COLUMNS, &tables.observations)?;
    info!("Wrote {} observations to {}", n, observations.display());

    Ok(vec![sites, censuses, observations])
}

pub fn write_diagnostics(
    dir: &Path,
    unmatched: &[MatchDiagnostic],
    imperfect: &[MatchDiagnostic],
    skipped: &[SkippedRecord],
) -> Result<()> {
    prepare_dir(dir)?;
    write_rows(&dir.join(UNMATCHED_FILE), &DIAGNOSTIC_COLUMNS, unmatched)?;
    write_rows(&dir.join(IMPERFECT_FILE), &DIAGNOSTIC_COLUMNS, imperfect)?;
    write_rows(&dir.join(SKIPPED_FILE), &SKIPPED_COLUMNS, skipped)?;
    Ok(())
}
