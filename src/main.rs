use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use bbc_census_extract::era::DEFAULT_MODERN_FROM;
use bbc_census_extract::normalize::{load_corrections, Normalizer};
use bbc_census_extract::output::{write_diagnostics, write_tables};
use bbc_census_extract::pipeline::{discover_inputs, Pipeline, PipelineConfig, RunOutput, YearInput};
use bbc_census_extract::species::{CanonicalSpeciesIndex, SpeciesResolver, DEFAULT_THRESHOLD};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};

/// Command-line arguments parsed by Clap.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "Extracts site, census and observation tables from OCR'd Breeding Bird Census reports.")]
struct Cli {
    /// Directory containing bbc_combined_<year>.txt files.
    #[arg(short = 'd', long)]
    input_dir: Option<PathBuf>,

    /// Individual year files (the year is read from the file name). May be repeated.
    #[arg(short = 'i', long = "input")]
    inputs: Vec<PathBuf>,

    /// Species reference CSV with original_name,cleaned_name,notes columns.
    #[arg(short, long)]
    species: PathBuf,

    /// Extra OCR corrections CSV with find,replace columns, applied after the built-in table.
    #[arg(short, long)]
    corrections: Option<PathBuf>,

    /// Directory for the output tables and diagnostics.
    #[arg(short, long, default_value = "bbc_output")]
    output_dir: PathBuf,

    /// Minimum similarity score (0-100) to accept a species match.
    #[arg(short, long, default_value_t = DEFAULT_THRESHOLD, value_parser = clap::value_parser!(u8).range(0..=100))]
    threshold: u8,

    /// First survey year printed in the modern report layout.
    #[arg(long, default_value_t = DEFAULT_MODERN_FROM)]
    modern_from: i32,

    /// Number of years processed in parallel (0 for one per CPU core).
    #[arg(short, long, default_value = "1")]
    jobs: usize,

    /// Logging level (debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    let millis = elapsed.subsec_millis();

    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, millis)
    }
}

fn collect_inputs(cli: &Cli) -> Result<Vec<YearInput>> {
    let mut inputs = Vec::new();
    if let Some(dir) = &cli.input_dir {
        inputs.extend(discover_inputs(dir)?);
    }
    for path in &cli.inputs {
        inputs.push(YearInput::from_path(path)?);
    }
    if cli.input_dir.is_none() && cli.inputs.is_empty() {
        bail!("No input given: pass --input-dir or at least one --input file");
    }
    inputs.sort_by_key(|i| i.year);
    inputs.dedup_by(|a, b| a.path == b.path);
    Ok(inputs)
}

fn build_normalizer(cli: &Cli) -> Result<Normalizer> {
    let mut normalizer = Normalizer::default();
    if let Some(path) = &cli.corrections {
        let extra = load_corrections(path)
            .with_context(|| format!("Failed to load corrections from {}", path.display()))?;
        info!("Adding {} corrections from {}", extra.len(), path.display());
        normalizer.extend(extra);
    }
    debug!("Normalizer holds {} literal corrections", normalizer.corrections().len());
    Ok(normalizer)
}

fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} years {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn print_final_summary(start_time: Instant, run: &RunOutput, resolver: &SpeciesResolver, cli: &Cli) {
    info!("-------------------- FINAL SUMMARY --------------------");
    info!("Total execution time: {}", format_elapsed(start_time.elapsed()));
    info!("Years processed: {}", run.years_ok);
    if !run.failed_years.is_empty() {
        warn!("Years that failed: {}", run.failed_years.len());
        for (year, reason) in &run.failed_years {
            warn!("  - {}: {}", year, reason);
        }
    }
    info!("Site blocks found: {}", run.blocks);
    info!("OCR substitutions applied: {}", run.substitutions);
    if !run.skipped.is_empty() {
        warn!("Records skipped: {}", run.skipped.len());
    }
    info!("Sites: {}", run.tables.sites.len());
    info!("Censuses: {}", run.tables.censuses.len());
    info!("Observations: {}", run.tables.observations.len());

    let stats = resolver.stats();
    info!(
        "Species fragments resolved: {} ({} cache hits)",
        stats.computed, stats.cache_hits
    );
    if !resolver.imperfect().is_empty() {
        info!("Imperfect species matches: {}", resolver.imperfect().len());
        for d in resolver.imperfect().iter().take(20) {
            info!("  - {:?} -> {:?} ({})", d.raw, d.candidate.as_deref().unwrap_or(""), d.score);
        }
    }
    if !resolver.unmatched().is_empty() {
        warn!("Unmatched species: {}", resolver.unmatched().len());
        for d in resolver.unmatched().iter().take(20) {
            warn!("  - {:?} (best {:?}, {})", d.raw, d.candidate.as_deref().unwrap_or(""), d.score);
        }
    }
    info!("Output written to: {}", cli.output_dir.display());
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level.as_str())).init();

    info!("Starting census extraction");
    let index = CanonicalSpeciesIndex::load(&cli.species)
        .with_context(|| format!("Failed to load species reference: {}", cli.species.display()))?;
    if index.is_empty() {
        warn!("Species reference is empty; every species will be unmatched.");
    }
    let normalizer = build_normalizer(&cli)?;

    let inputs = collect_inputs(&cli)?;
    if inputs.is_empty() {
        warn!("No year files to process. Exiting.");
        return Ok(());
    }
    info!(
        "Processing years: {}",
        inputs.iter().map(|i| i.year.to_string()).collect::<Vec<_>>().join(", ")
    );

    let jobs = if cli.jobs == 0 { num_cpus::get() } else { cli.jobs };
    let config = PipelineConfig {
        threshold: cli.threshold,
        modern_from: cli.modern_from,
        jobs,
    };
    let mut pipeline = Pipeline::new(config, normalizer, Arc::new(index))
        .with_progress(progress_bar(inputs.len() as u64)?);
    let run = pipeline.run(&inputs);

    write_tables(&cli.output_dir, &run.tables)?;
    let resolver = pipeline.resolver();
    write_diagnostics(&cli.output_dir, resolver.unmatched(), resolver.imperfect(), &run.skipped)?;

    print_final_summary(start_time, &run, resolver, &cli);
    Ok(())
}
