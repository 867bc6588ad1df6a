//! Runs the per-year extraction and the cross-year assembly.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::glob;
use indicatif::ProgressBar;
use lazy_static::lazy_static;
use log::{debug, error, info, warn};
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;

use crate::assemble::{assemble_block, Assembler, SiteBundle, Tables};
use crate::era::{Era, DEFAULT_MODERN_FROM};
use crate::error::{PipelineError, Result};
use crate::fields::split_fields;
use crate::normalize::Normalizer;
use crate::segment::segment_document;
use crate::species::{CanonicalSpeciesIndex, Similarity, SpeciesResolver, DEFAULT_THRESHOLD};

lazy_static! {
    static ref YEAR_IN_NAME_RE: Regex = Regex::new(r"(?:19|20)\d{2}").unwrap();
}

pub const INPUT_PATTERN: &str = "bbc_combined_*.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Minimum similarity (0–100) for accepting a species match.
    pub threshold: u8,
    /// First year printed in the modern report layout.
    pub modern_from: i32,
    /// Worker threads for per-year processing; 1 runs sequentially.
    pub jobs: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            modern_from: DEFAULT_MODERN_FROM,
            jobs: 1,
        }
    }
}

/// One year's combined OCR text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearInput {
    pub year: i32,
    pub path: PathBuf,
}

impl YearInput {
    /// Takes the year from the last 19xx/20xx run in the file name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let year = YEAR_IN_NAME_RE
            .find_iter(&stem)
            .last()
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .ok_or_else(|| PipelineError::NoYear(path.to_path_buf()))?;
        Ok(Self {
            year,
            path: path.to_path_buf(),
        })
    }
}

/// Finds `bbc_combined_<year>.txt` files under `dir`, ordered by year.
pub fn discover_inputs(dir: &Path) -> Result<Vec<YearInput>> {
    let pattern = dir.join(INPUT_PATTERN);
    let pattern_str = pattern.to_string_lossy();
    info!("Searching for year files matching: {}", pattern_str);
    let mut inputs = Vec::new();
    let paths = glob(&pattern_str).map_err(|e| PipelineError::Read {
        path: dir.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
    })?;
    for path in paths.filter_map(std::result::Result::ok) {
        match YearInput::from_path(&path) {
            Ok(input) => inputs.push(input),
            Err(e) => warn!("{}. Skipping.", e),
        }
    }
    inputs.sort_by(|a, b| a.year.cmp(&b.year).then_with(|| a.path.cmp(&b.path)));
    if inputs.is_empty() {
        warn!("No year files found matching: {}", pattern_str);
    }
    Ok(inputs)
}

/// A site/year record dropped during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub year: i32,
    #[serde(rename = "siteNumInCensus")]
    pub site_num_in_census: u32,
    pub sitename: String,
    pub reason: String,
}

/// Output of one document, before cross-year assembly.
#[derive(Debug, Clone, Default)]
pub struct YearOutput {
    pub year: i32,
    pub blocks: usize,
    pub substitutions: u64,
    pub bundles: Vec<SiteBundle>,
    pub skipped: Vec<SkippedRecord>,
}

/// Normalizes, segments, splits and extracts one document. Record-level
/// failures are collected in `skipped`; nothing here can fail the year.
pub fn process_document<S: Similarity>(
    text: &str,
    year: i32,
    era: Era,
    normalizer: &Normalizer,
    resolver: &mut SpeciesResolver<S>,
) -> YearOutput {
    let normalized = normalizer.normalize(text);
    debug!("{}: {} OCR substitutions", year, normalized.substitutions);

    let blocks = segment_document(&normalized.text);
    let mut output = YearOutput {
        year,
        blocks: blocks.len(),
        substitutions: normalized.substitutions,
        ..Default::default()
    };

    for block in blocks {
        let fields = split_fields(&block.text, &block.site_name, block.site_number, year);
        match assemble_block(&fields, era, resolver) {
            Ok(bundle) => output.bundles.push(bundle),
            Err(e) => {
                warn!(
                    "Skipping {} site {} ({}): {}",
                    year, block.site_number, block.site_name, e
                );
                output.skipped.push(SkippedRecord {
                    year,
                    site_num_in_census: block.site_number,
                    sitename: block.site_name,
                    reason: e.to_string(),
                });
            }
        }
    }
    output
}

/// Reads and processes one year file.
pub fn process_year<S: Similarity>(
    input: &YearInput,
    config: &PipelineConfig,
    normalizer: &Normalizer,
    resolver: &mut SpeciesResolver<S>,
) -> Result<YearOutput> {
    let text = fs::read_to_string(&input.path).map_err(|source| PipelineError::Read {
        path: input.path.clone(),
        source,
    })?;
    let era = Era::for_year(input.year, config.modern_from);
    Ok(process_document(&text, input.year, era, normalizer, resolver))
}

/// Everything a run produced: the tables plus diagnostics.
#[derive(Debug, Default)]
pub struct RunOutput {
    pub tables: Tables,
    pub skipped: Vec<SkippedRecord>,
    pub failed_years: Vec<(i32, String)>,
    pub years_ok: usize,
    pub blocks: usize,
    pub substitutions: u64,
}

/// One extraction run. Owns the resolver, and with it the resolution cache
/// and diagnostic logs for the whole run.
pub struct Pipeline {
    config: PipelineConfig,
    normalizer: Normalizer,
    resolver: SpeciesResolver,
    progress: ProgressBar,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, normalizer: Normalizer, index: Arc<CanonicalSpeciesIndex>) -> Self {
        let resolver = SpeciesResolver::new(index, config.threshold);
        Self {
            config,
            normalizer,
            resolver,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn resolver(&self) -> &SpeciesResolver {
        &self.resolver
    }

    pub fn run(&mut self, inputs: &[YearInput]) -> RunOutput {
        self.progress.set_length(inputs.len() as u64);
        let results = if self.config.jobs > 1 && inputs.len() > 1 {
            self.run_parallel(inputs)
        } else {
            self.run_sequential(inputs)
        };

        let mut run = RunOutput::default();
        let mut assembler = Assembler::new();
        for (input, result) in inputs.iter().zip(results) {
            match result {
                Ok(output) => {
                    info!(
                        "{}: {} blocks, {} records kept, {} skipped",
                        output.year,
                        output.blocks,
                        output.bundles.len(),
                        output.skipped.len()
                    );
                    run.years_ok += 1;
                    run.blocks += output.blocks;
                    run.substitutions += output.substitutions;
                    run.skipped.extend(output.skipped);
                    assembler.extend(output.bundles);
                }
                Err(e) => {
                    error!("Year {} failed: {}", input.year, e);
                    run.failed_years.push((input.year, e.to_string()));
                }
            }
        }
        self.progress.finish_with_message("Extraction complete.");

        run.tables = assembler.finish();
        run
    }

    fn run_sequential(&mut self, inputs: &[YearInput]) -> Vec<Result<YearOutput>> {
        inputs
            .iter()
            .map(|input| {
                self.progress.set_message(format!("{}", input.year));
                let result = process_year(input, &self.config, &self.normalizer, &mut self.resolver);
                self.progress.inc(1);
                result
            })
            .collect()
    }

    /// One worker per year, each with its own resolver; worker caches and
    /// logs are folded back in year order once every year is done.
    fn run_parallel(&mut self, inputs: &[YearInput]) -> Vec<Result<YearOutput>> {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs)
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                error!("Failed to build thread pool: {}. Running sequentially.", e);
                return self.run_sequential(inputs);
            }
        };
        info!("Processing {} years on {} threads", inputs.len(), self.config.jobs);

        let config = &self.config;
        let normalizer = &self.normalizer;
        let template = &self.resolver;
        let progress = &self.progress;
        let outcomes: Vec<(Result<YearOutput>, SpeciesResolver)> = pool.install(|| {
            inputs
                .par_iter()
                .map(|input| {
                    let mut local = template.fork();
                    let result = process_year(input, config, normalizer, &mut local);
                    progress.inc(1);
                    (result, local)
                })
                .collect()
        });

        outcomes
            .into_iter()
            .map(|(result, local)| {
                self.resolver.absorb(local);
                result
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_from_file_name() {
        let input = YearInput::from_path(Path::new("/data/bbc_combined_1991.txt")).unwrap();
        assert_eq!(input.year, 1991);
        assert!(matches!(
            YearInput::from_path(Path::new("notes.txt")),
            Err(PipelineError::NoYear(_))
        ));
    }

    #[test]
    fn discovery_orders_by_year() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["bbc_combined_1992.txt", "bbc_combined_1988.txt", "other_1990.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let years: Vec<i32> = discover_inputs(dir.path())
            .unwrap()
            .iter()
            .map(|i| i.year)
            .collect();
        assert_eq!(years, vec![1988, 1992]);
    }

    #[test]
    fn document_with_bad_site_keeps_good_one() {
        let doc = "1. GOOD SITE\n\
                   Location: 40°30'N, 75°15'W.\n\
                   Total: 1 species; 2 territories.\n\
                   2. BROKEN SITE\n\
                   Location: smudged\n\
                   Total: 1 species; 2 territories.\n";
        let index = Arc::new(CanonicalSpeciesIndex::from_names(["Wood Thrush"]));
        let mut resolver = SpeciesResolver::new(index, DEFAULT_THRESHOLD);
        let output = process_document(doc, 1991, Era::Modern, &Normalizer::default(), &mut resolver);
        assert_eq!(output.blocks, 2);
        assert_eq!(output.bundles.len(), 1);
        assert_eq!(output.skipped.len(), 1);
        assert_eq!(output.skipped[0].sitename, "BROKEN SITE");
        assert!(output.skipped[0].reason.contains("Location"));
    }

    #[test]
    fn running_header_before_site_keeps_both_sites() {
        let doc = "1. ALPHA\n\
                   Location: 40°30'N, 75°15'W\n\
                   Total: 1 species; 1 territories.\n\
                   Winter 1992\n\
                   2. BETA\n\
                   Location: 41°00'N, 75°15'W\n\
                   Total: 2 species; 3 territories.\n";
        let index = Arc::new(CanonicalSpeciesIndex::default());
        let mut resolver = SpeciesResolver::new(index, DEFAULT_THRESHOLD);
        let output = process_document(doc, 1992, Era::Modern, &Normalizer::default(), &mut resolver);
        assert_eq!(output.blocks, 2);
        assert!(output.skipped.is_empty());
        let names: Vec<(&str, u32)> = output
            .bundles
            .iter()
            .map(|b| (b.site.name.as_str(), b.site.key.number))
            .collect();
        assert_eq!(names, vec![("ALPHA", 1), ("BETA", 2)]);
        assert_eq!(output.bundles[1].census.territories, 3.0);
    }

    #[test]
    fn missing_year_file_fails_only_that_year() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("bbc_combined_1991.txt");
        fs::write(
            &good,
            "1. ALPHA\nLocation: 40°30'N, 75°15'W\nTotal: 1 species; 1 territories.\n",
        )
        .unwrap();
        let inputs = vec![
            YearInput { year: 1990, path: dir.path().join("bbc_combined_1990.txt") },
            YearInput { year: 1991, path: good },
        ];
        let index = Arc::new(CanonicalSpeciesIndex::default());
        let mut pipeline = Pipeline::new(PipelineConfig::default(), Normalizer::default(), index);
        let run = pipeline.run(&inputs);
        assert_eq!(run.years_ok, 1);
        assert_eq!(run.failed_years.len(), 1);
        assert_eq!(run.failed_years[0].0, 1990);
        assert_eq!(run.tables.sites.len(), 1);
    }
}
