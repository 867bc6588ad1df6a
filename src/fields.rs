//! Field splitter: turns a site block into labeled fields.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

/// Closed vocabulary of section labels printed in the census reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldLabel {
    SiteNumber,
    Location,
    Continuity,
    Size,
    DescriptionOfPlot,
    Edge,
    TopographyAndElevation,
    Weather,
    Coverage,
    Census,
    Total,
    Visitors,
    Remarks,
    OtherObservers,
    Observers,
    Acknowledgments,
    PreviouslyCalled,
}

impl FieldLabel {
    pub const ALL: [FieldLabel; 17] = [
        FieldLabel::SiteNumber,
        FieldLabel::Location,
        FieldLabel::Continuity,
        FieldLabel::Size,
        FieldLabel::DescriptionOfPlot,
        FieldLabel::Edge,
        FieldLabel::TopographyAndElevation,
        FieldLabel::Weather,
        FieldLabel::Coverage,
        FieldLabel::Census,
        FieldLabel::Total,
        FieldLabel::Visitors,
        FieldLabel::Remarks,
        FieldLabel::OtherObservers,
        FieldLabel::Observers,
        FieldLabel::Acknowledgments,
        FieldLabel::PreviouslyCalled,
    ];

    /// Label text as printed, without the colon.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldLabel::SiteNumber => "Site Number",
            FieldLabel::Location => "Location",
            FieldLabel::Continuity => "Continuity",
            FieldLabel::Size => "Size",
            FieldLabel::DescriptionOfPlot => "Description of Plot",
            FieldLabel::Edge => "Edge",
            FieldLabel::TopographyAndElevation => "Topography and Elevation",
            FieldLabel::Weather => "Weather",
            FieldLabel::Coverage => "Coverage",
            FieldLabel::Census => "Census",
            FieldLabel::Total => "Total",
            FieldLabel::Visitors => "Visitors",
            FieldLabel::Remarks => "Remarks",
            FieldLabel::OtherObservers => "Other Observers",
            FieldLabel::Observers => "Observers",
            FieldLabel::Acknowledgments => "Acknowledgments",
            FieldLabel::PreviouslyCalled => "Previously called",
        }
    }

    pub fn from_label(label: &str) -> Option<FieldLabel> {
        FieldLabel::ALL.iter().copied().find(|l| l.as_str() == label)
    }
}

impl fmt::Display for FieldLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

lazy_static! {
    // Longest labels first so alternation picks "Other Observers" over
    // "Observers" when both could start at the same place.
    static ref LABEL_RE: Regex = {
        let mut labels: Vec<&str> = FieldLabel::ALL.iter().map(|l| l.as_str()).collect();
        labels.sort_by_key(|l| std::cmp::Reverse(l.len()));
        let alternation = labels
            .iter()
            .map(|l| regex::escape(l))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"\b({}):[ \t]*", alternation)).unwrap()
    };
}

/// Run-scoped site identity: unique within one run, replaced by the
/// surrogate site ID on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteKey {
    pub year: i32,
    pub number: u32,
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.year, self.number)
    }
}

/// Labeled fields of one block plus the synthetic site name and key.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMap {
    pub site_name: String,
    pub site_key: SiteKey,
    fields: HashMap<FieldLabel, String>,
}

impl FieldMap {
    pub fn new(site_name: &str, site_key: SiteKey) -> Self {
        Self {
            site_name: site_name.to_string(),
            site_key,
            fields: HashMap::new(),
        }
    }

    pub fn get(&self, label: FieldLabel) -> Option<&str> {
        self.fields.get(&label).map(String::as_str)
    }

    pub fn contains(&self, label: FieldLabel) -> bool {
        self.fields.contains_key(&label)
    }

    /// Recognized labels in vocabulary order.
    pub fn labels(&self) -> Vec<FieldLabel> {
        let mut labels: Vec<FieldLabel> = self.fields.keys().copied().collect();
        labels.sort();
        labels
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Keeps the first value seen for a label.
    pub fn insert(&mut self, label: FieldLabel, value: &str) -> bool {
        if self.fields.contains_key(&label) {
            debug!("{}: repeated {} label ignored", self.site_key, label);
            return false;
        }
        self.fields.insert(label, value.to_string());
        true
    }
}

pub fn split_fields(block: &str, site_name: &str, site_number: u32, year: i32) -> FieldMap {
    let mut map = FieldMap::new(
        site_name,
        SiteKey {
            year,
            number: site_number,
        },
    );

    let matches: Vec<_> = LABEL_RE.captures_iter(block).collect();
    for (i, caps) in matches.iter().enumerate() {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let value_end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(block.len(), |m| m.start());
        let Some(label) = FieldLabel::from_label(&caps[1]) else {
            continue;
        };
        map.insert(label, &block[whole.end()..value_end]);
    }

    if map.is_empty() && !block.trim().is_empty() {
        debug!("{}: no recognized labels in block", map.site_key);
    }
    map
}
