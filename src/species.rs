//! Species name resolution against the canonical vocabulary.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use csv::ReaderBuilder;
use deunicode::deunicode;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

use crate::error::{PipelineError, Result};

pub const DEFAULT_THRESHOLD: u8 = 70;

/// Row of the external species reference table.
#[derive(Debug, Deserialize)]
struct ReferenceRow {
    original_name: String,
    cleaned_name: Option<String>,
    notes: Option<String>,
}

/// Deduplicated canonical names with precomputed comparison keys.
#[derive(Debug, Clone, Default)]
pub struct CanonicalSpeciesIndex {
    names: Vec<String>,
    keys: Vec<String>,
}

impl CanonicalSpeciesIndex {
    pub fn from_names<I, T>(names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut index = Self::default();
        let mut seen = HashSet::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || !seen.insert(name.to_string()) {
                continue;
            }
            index.keys.push(comparison_key(name));
            index.names.push(name.to_string());
        }
        index
    }

    /// Loads `original_name,cleaned_name,notes`. Rows noted `delete` are
    /// dropped and a blank cleaned name falls back to the original.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| PipelineError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut rdr = ReaderBuilder::new().from_reader(file);
        let mut names = Vec::new();
        let mut deleted = 0;
        for row in rdr.deserialize::<ReferenceRow>() {
            let row = row.map_err(|source| PipelineError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            let is_delete = row
                .notes
                .as_deref()
                .is_some_and(|n| n.trim().eq_ignore_ascii_case("delete"));
            if is_delete {
                deleted += 1;
                continue;
            }
            match row.cleaned_name.filter(|c| !c.trim().is_empty()) {
                Some(cleaned) => names.push(cleaned),
                None => names.push(row.original_name),
            }
        }
        let index = Self::from_names(names);
        info!(
            "Loaded {} canonical species from {} ({} rows marked delete)",
            index.len(),
            path.display(),
            deleted
        );
        Ok(index)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Case-folded ASCII form used for scoring.
fn comparison_key(name: &str) -> String {
    deunicode(name).to_lowercase()
}

/// Character similarity on a 0–100 scale.
pub trait Similarity {
    fn score(&self, a: &str, b: &str) -> u8;
}

/// Normalized Levenshtein similarity scaled to 0–100.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenshteinRatio;

impl Similarity for LevenshteinRatio {
    fn score(&self, a: &str, b: &str) -> u8 {
        (100.0 * normalized_levenshtein(a, b)).round() as u8
    }
}

/// Strips line-break hyphenation, collapses whitespace and trims punctuation.
pub fn normalize_fragment(raw: &str) -> String {
    let joined = raw.replace("-\n", "-");
    let collapsed = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_string()
}

/// One review-worthy resolution: rejected, or accepted below 100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchDiagnostic {
    pub raw: String,
    pub candidate: Option<String>,
    pub score: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    pub computed: u64,
    pub cache_hits: u64,
}

/// Resolves raw fragments to canonical names. Owns the run's resolution
/// cache and the two diagnostic logs.
#[derive(Debug)]
pub struct SpeciesResolver<S = LevenshteinRatio> {
    index: Arc<CanonicalSpeciesIndex>,
    similarity: S,
    threshold: u8,
    cache: HashMap<String, Option<String>>,
    unmatched: Vec<MatchDiagnostic>,
    imperfect: Vec<MatchDiagnostic>,
    stats: ResolverStats,
}

impl SpeciesResolver<LevenshteinRatio> {
    pub fn new(index: Arc<CanonicalSpeciesIndex>, threshold: u8) -> Self {
        Self::with_similarity(index, threshold, LevenshteinRatio)
    }
}

impl<S: Similarity> SpeciesResolver<S> {
    pub fn with_similarity(index: Arc<CanonicalSpeciesIndex>, threshold: u8, similarity: S) -> Self {
        Self {
            index,
            similarity,
            threshold,
            cache: HashMap::new(),
            unmatched: Vec::new(),
            imperfect: Vec::new(),
            stats: ResolverStats::default(),
        }
    }

    /// Empty resolver over the same index and settings, for one worker.
    pub fn fork(&self) -> Self
    where
        S: Clone,
    {
        Self::with_similarity(Arc::clone(&self.index), self.threshold, self.similarity.clone())
    }

    pub fn resolve(&mut self, raw: &str) -> Option<String> {
        if let Some(cached) = self.cache.get(raw) {
            self.stats.cache_hits += 1;
            return cached.clone();
        }

        let fragment = normalize_fragment(raw);
        if fragment.is_empty() {
            return None;
        }

        self.stats.computed += 1;
        let (candidate, score) = self.best_match(&fragment);
        let resolved = match candidate {
            Some(name) if score >= self.threshold => {
                if score < 100 {
                    debug!("Imperfect match {:?} -> {:?} ({})", fragment, name, score);
                    self.imperfect.push(MatchDiagnostic {
                        raw: raw.to_string(),
                        candidate: Some(name.clone()),
                        score,
                    });
                }
                Some(name)
            }
            best => {
                debug!("No match for {:?} (best {:?}, {})", fragment, best, score);
                self.unmatched.push(MatchDiagnostic {
                    raw: raw.to_string(),
                    candidate: best,
                    score,
                });
                None
            }
        };

        self.cache.insert(raw.to_string(), resolved.clone());
        resolved
    }

    /// Highest scoring canonical name; ties keep the earlier name.
    fn best_match(&self, fragment: &str) -> (Option<String>, u8) {
        let key = comparison_key(fragment);
        let mut best: Option<usize> = None;
        let mut best_score = 0u8;
        for (i, candidate) in self.index.keys.iter().enumerate() {
            let score = self.similarity.score(&key, candidate);
            if best.is_none() || score > best_score {
                best = Some(i);
                best_score = score;
            }
            if best_score == 100 {
                break;
            }
        }
        (best.map(|i| self.index.names[i].clone()), best_score)
    }

    /// Folds a worker's cache and logs into this resolver. Fragments this
    /// resolver already decided are skipped, so each raw fragment is logged
    /// at most once per run.
    pub fn absorb(&mut self, other: SpeciesResolver<S>) {
        let mut fresh = HashSet::new();
        for (raw, resolved) in other.cache {
            if let Entry::Vacant(slot) = self.cache.entry(raw.clone()) {
                slot.insert(resolved);
                fresh.insert(raw);
            }
        }
        self.unmatched
            .extend(other.unmatched.into_iter().filter(|d| fresh.contains(&d.raw)));
        self.imperfect
            .extend(other.imperfect.into_iter().filter(|d| fresh.contains(&d.raw)));
        self.stats.computed += other.stats.computed;
        self.stats.cache_hits += other.stats.cache_hits;
    }

    pub fn unmatched(&self) -> &[MatchDiagnostic] {
        &self.unmatched
    }

    pub fn imperfect(&self) -> &[MatchDiagnostic] {
        &self.imperfect
    }

    pub fn stats(&self) -> ResolverStats {
        self.stats
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
