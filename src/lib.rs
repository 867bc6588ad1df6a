//! Extraction of Breeding Bird Census reports from OCR text into site,
//! census and observation tables.
//!
//! A year's document flows through [`normalize`] → [`segment`] → [`fields`]
//! → [`extract`]/[`species`] → [`assemble`]; [`pipeline`] drives the years
//! and [`output`] writes the tables.

pub mod assemble;
pub mod corrections;
pub mod era;
pub mod error;
pub mod extract;
pub mod fields;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod segment;
pub mod species;

pub use assemble::Tables;
pub use error::{ExtractError, PipelineError};
pub use pipeline::{Pipeline, PipelineConfig, RunOutput, YearInput};
