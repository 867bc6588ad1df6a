//! Error types for census extraction.

use std::path::PathBuf;

use thiserror::Error;

use crate::fields::FieldLabel;

/// Record-level failures. These never abort a run: the enclosing site/year
/// record is dropped and the error becomes a skip diagnostic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    #[error("unparsable {field} field: {text:?}")]
    Unparsable { field: FieldLabel, text: String },

    #[error("missing required field: {0}")]
    MissingField(FieldLabel),
}

impl ExtractError {
    pub fn unparsable(field: FieldLabel, text: &str) -> Self {
        ExtractError::Unparsable {
            field,
            text: text.to_string(),
        }
    }
}

/// Failures that stop processing of a whole year (or of the run when loading
/// reference data).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not determine a survey year from file name {}", .0.display())]
    NoYear(PathBuf),

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
