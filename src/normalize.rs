//! Text normalizer: ordered literal OCR corrections plus character fixes.

use std::fs::File;
use std::path::Path;

use csv::ReaderBuilder;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::Deserialize;

use crate::corrections::{DEFAULT_CHAR_FIXES, DEFAULT_CORRECTIONS, DIGIT_SWAP_FIXES};
use crate::error::{PipelineError, Result};

lazy_static! {
    static ref DIGIT_SWAPS: Vec<(Regex, &'static str)> = DIGIT_SWAP_FIXES
        .iter()
        .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), *replacement))
        .collect();
}

/// Upper bound on fixpoint passes for the digit swap rules.
const MAX_SWAP_PASSES: usize = 8;

/// One exact substring replacement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Correction {
    pub find: String,
    pub replace: String,
}

impl Correction {
    pub fn new(find: &str, replace: &str) -> Self {
        Self {
            find: find.to_string(),
            replace: replace.to_string(),
        }
    }
}

/// Result of normalizing a span of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub substitutions: u64,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    corrections: Vec<Correction>,
    char_fixes: Vec<Correction>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(
            DEFAULT_CORRECTIONS
                .iter()
                .map(|(find, replace)| Correction::new(find, replace))
                .collect(),
        )
    }
}

impl Normalizer {
    /// Normalizer with the given literal table and the built-in character fixes.
    pub fn new(corrections: Vec<Correction>) -> Self {
        Self {
            corrections,
            char_fixes: DEFAULT_CHAR_FIXES
                .iter()
                .map(|(find, replace)| Correction::new(find, replace))
                .collect(),
        }
    }

    /// Appends rules after the existing ones.
    pub fn extend(&mut self, extra: impl IntoIterator<Item = Correction>) {
        self.corrections.extend(extra);
    }

    pub fn corrections(&self) -> &[Correction] {
        &self.corrections
    }

    pub fn normalize(&self, text: &str) -> Normalized {
        let mut result = text.to_string();
        let mut total_subs: u64 = 0;

        for rule in self.corrections.iter().chain(self.char_fixes.iter()) {
            if rule.find.is_empty() {
                continue;
            }
            let hits = result.matches(rule.find.as_str()).count();
            if hits > 0 {
                debug!("Replaced {:?} -> {:?} ({} hits)", rule.find, rule.replace, hits);
                result = result.replace(rule.find.as_str(), &rule.replace);
                total_subs += hits as u64;
            }
        }

        // Swaps can overlap ("1l1l1"), so rerun until nothing changes.
        for (pattern, replacement) in DIGIT_SWAPS.iter() {
            for _ in 0..MAX_SWAP_PASSES {
                let hits = pattern.find_iter(&result).count();
                if hits == 0 {
                    break;
                }
                debug!("Digit swap {} ({} hits)", pattern.as_str(), hits);
                result = pattern.replace_all(&result, *replacement).into_owned();
                total_subs += hits as u64;
            }
        }

        Normalized {
            text: result,
            substitutions: total_subs,
        }
    }
}

/// Loads extra corrections from a CSV with `find,replace` columns.
///
/// A literal `\n` in either column stands for a line break, so multi-line
/// OCR fixes can be written on one row.
pub fn load_corrections(path: &Path) -> Result<Vec<Correction>> {
    let file = File::open(path).map_err(|source| PipelineError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rdr = ReaderBuilder::new().from_reader(file);
    let mut rules = Vec::new();
    for row in rdr.deserialize::<Correction>() {
        let rule = row.map_err(|source| PipelineError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        rules.push(Correction {
            find: unescape_newlines(&rule.find),
            replace: unescape_newlines(&rule.replace),
        });
    }
    debug!("Loaded {} corrections from {}", rules.len(), path.display());
    Ok(rules)
}

fn unescape_newlines(s: &str) -> String {
    s.replace("\\n", "\n")
}
