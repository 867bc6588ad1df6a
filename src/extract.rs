//! Typed extractors for individual census fields.
//!
//! Every extractor expects text that already went through
//! [`clean_field_text`] and returns [`ExtractError::Unparsable`] when none of
//! its patterns match.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::era::Era;
use crate::error::ExtractError;
use crate::fields::FieldLabel;

// Degree, then optional minutes and seconds, each with OCR look-alike glyphs.
const DEG: &str = r"(\d{1,3})\s*[°º˚]\s*";
const MIN_SEC: &str = r#"(?:(\d{1,2})\s*(?:['’‘′´`lI]{1,2})?\s*(?:(\d{1,2}(?:\.\d+)?)\s*["”″]\s*)?)?"#;
const HOURS: &str = r"(\d{1,3}(?:\.\d{1,2})?)";

lazy_static! {
    static ref LATLONG_RE: Regex =
        Regex::new(&format!(r"{DEG}{MIN_SEC}N[,;.]?\s*{DEG}{MIN_SEC}W")).unwrap();

    static ref UNIT_RE: Regex = Regex::new(r"(?i)\s*\b(?:hectares?|ha)\b").unwrap();

    static ref COVERAGE_WITH_TIMES_RE: Regex =
        Regex::new(&format!(r"{HOURS} h[;,]\s*(\d{{1,2}}) [Vv]isits? \(([^)]+)\)[;,.]?(.*)")).unwrap();
    static ref COVERAGE_NO_TIMES_RE: Regex =
        Regex::new(&format!(r"{HOURS} h[;,]\s*(\d{{1,2}}) [Vv]isits?[;,.]?(.*)")).unwrap();
    static ref COVERAGE_EARLY_RE: Regex =
        Regex::new(&format!(r"(\d{{1,2}}) [Vv]isits?[;,]\s*{HOURS} study-hours[;,.]?(.*)")).unwrap();
    static ref COVERAGE_EARLY_HOURS_RE: Regex =
        Regex::new(&format!(r"{HOURS} study-hours[;,.]?(.*)")).unwrap();
    static ref COVERAGE_HOURS_ONLY_RE: Regex =
        Regex::new(&format!(r"{HOURS} h(?:ours)?\b[;,.]?(.*)")).unwrap();

    static ref TOTAL_RE: Regex = Regex::new(
        r"(\d{1,3}) species[;,]\s*(\d{1,4}(?:\.\d{1,2})?) (?:territories|territorial males)(?:\s*\(([^)]+)\))?"
    ).unwrap();

    static ref YEAR_RE: Regex = Regex::new(r"^\d{4}$").unwrap();
}

const CONTINUITY_NOISE: [&str; 7] = [
    "consecutive",
    "intermittent",
    "years",
    "year",
    "yrs.",
    "yr.",
    "yr",
];

/// Generic cleanup applied to every field before extraction.
pub fn clean_field_text(text: &str) -> String {
    text.trim()
        .replace('\r', "")
        .replace("-\n", "")
        .replace('\n', " ")
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Coverage {
    pub hours: f64,
    pub visits: Option<u32>,
    pub times: Option<String>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Total {
    pub richness: u32,
    pub territories: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continuity {
    pub established: i32,
    pub length: Option<u32>,
}

fn parse_group<T: std::str::FromStr>(caps: &Captures, idx: usize) -> Option<T> {
    caps.get(idx).and_then(|m| m.as_str().parse::<T>().ok())
}

fn trailing_notes(caps: &Captures, idx: usize) -> String {
    caps.get(idx)
        .map(|m| m.as_str().trim_matches(|c: char| c.is_whitespace() || c == ';' || c == ','))
        .unwrap_or("")
        .to_string()
}

fn decimal_degrees(caps: &Captures, first: usize) -> Option<f64> {
    let degrees: f64 = parse_group(caps, first)?;
    let minutes: f64 = parse_group(caps, first + 1).unwrap_or(0.0);
    let seconds: f64 = parse_group(caps, first + 2).unwrap_or(0.0);
    if minutes >= 60.0 || seconds >= 60.0 {
        return None;
    }
    Some(degrees + minutes / 60.0 + seconds / 3600.0)
}

pub fn extract_location(text: &str) -> Result<Coordinates, ExtractError> {
    let unparsable = || ExtractError::unparsable(FieldLabel::Location, text);
    let caps = LATLONG_RE.captures(text).ok_or_else(unparsable)?;
    let latitude = decimal_degrees(&caps, 1).ok_or_else(unparsable)?;
    let longitude = decimal_degrees(&caps, 4).ok_or_else(unparsable)?;
    if latitude > 90.0 || longitude > 180.0 {
        return Err(unparsable());
    }
    Ok(Coordinates {
        latitude,
        longitude,
    })
}

/// Plot area in hectares.
pub fn extract_size(text: &str) -> Result<f64, ExtractError> {
    let amount = match UNIT_RE.find(text) {
        Some(unit) => &text[..unit.start()],
        None => text,
    };
    let fixed: String = amount
        .trim_matches(|c: char| c.is_whitespace() || c == '.' || c == ',' || c == ':')
        .chars()
        .map(|c| match c {
            'O' | 'o' => '0',
            'l' | 'I' => '1',
            ',' => '.',
            other => other,
        })
        .collect();
    fixed
        .parse::<f64>()
        .map_err(|_| ExtractError::unparsable(FieldLabel::Size, text))
}

pub fn extract_coverage(text: &str, era: Era) -> Result<Coverage, ExtractError> {
    let unparsable = || ExtractError::unparsable(FieldLabel::Coverage, text);

    let coverage = match era {
        Era::Modern => {
            if let Some(caps) = COVERAGE_WITH_TIMES_RE.captures(text) {
                Coverage {
                    hours: parse_group(&caps, 1).ok_or_else(unparsable)?,
                    visits: parse_group(&caps, 2),
                    times: caps.get(3).map(|m| m.as_str().trim().to_string()),
                    notes: trailing_notes(&caps, 4),
                }
            } else if let Some(caps) = COVERAGE_NO_TIMES_RE.captures(text) {
                Coverage {
                    hours: parse_group(&caps, 1).ok_or_else(unparsable)?,
                    visits: parse_group(&caps, 2),
                    times: None,
                    notes: trailing_notes(&caps, 3),
                }
            } else {
                hours_only(&COVERAGE_HOURS_ONLY_RE, text).ok_or_else(unparsable)?
            }
        }
        Era::Early => {
            if let Some(caps) = COVERAGE_EARLY_RE.captures(text) {
                Coverage {
                    hours: parse_group(&caps, 2).ok_or_else(unparsable)?,
                    visits: parse_group(&caps, 1),
                    times: None,
                    notes: trailing_notes(&caps, 3),
                }
            } else {
                hours_only(&COVERAGE_EARLY_HOURS_RE, text)
                    .or_else(|| hours_only(&COVERAGE_HOURS_ONLY_RE, text))
                    .ok_or_else(unparsable)?
            }
        }
    };
    Ok(coverage)
}

fn hours_only(re: &Regex, text: &str) -> Option<Coverage> {
    let caps = re.captures(text)?;
    Some(Coverage {
        hours: parse_group(&caps, 1)?,
        visits: None,
        times: None,
        notes: trailing_notes(&caps, 2),
    })
}

pub fn extract_total(text: &str) -> Result<Total, ExtractError> {
    let unparsable = || ExtractError::unparsable(FieldLabel::Total, text);
    let caps = TOTAL_RE.captures(text).ok_or_else(unparsable)?;
    Ok(Total {
        richness: parse_group(&caps, 1).ok_or_else(unparsable)?,
        territories: parse_group(&caps, 2).ok_or_else(unparsable)?,
        notes: caps.get(3).map(|m| m.as_str().trim().to_string()),
    })
}

/// Establishment year and survey length. `year` is the document year, used
/// for sites marked "New".
pub fn extract_continuity(text: &str, year: i32, era: Era) -> Result<Continuity, ExtractError> {
    let unparsable = || ExtractError::unparsable(FieldLabel::Continuity, text);

    if text.contains("New") {
        return Ok(Continuity {
            established: year,
            length: Some(1),
        });
    }

    let body = text.replace("Established", "").replace("Est.", "");
    let body = body.trim();
    let (established, length) = if let Some((est, len)) = body.split_once(';') {
        (est, Some(len))
    } else if let Some((est, len)) = body.split_once(',') {
        (est, Some(len))
    } else if era == Era::Early {
        match body.split_once(char::is_whitespace) {
            Some((est, len)) => (est, Some(len)),
            None => (body, None),
        }
    } else {
        (body, None)
    };

    let established = established.trim_matches(|c: char| c.is_whitespace() || c == '.');
    if !YEAR_RE.is_match(established) {
        return Err(unparsable());
    }
    let established: i32 = established.parse().map_err(|_| unparsable())?;

    let length = match length {
        Some(raw) => {
            let mut len = raw.to_string();
            for noise in CONTINUITY_NOISE {
                len = len.replace(noise, "");
            }
            let len = len.trim_matches(|c: char| c.is_whitespace() || ".,;()".contains(c));
            if len.is_empty() {
                None
            } else {
                Some(len.parse::<u32>().map_err(|_| unparsable())?)
            }
        }
        None => None,
    };

    Ok(Continuity {
        established,
        length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_degrees_minutes() {
        let c = extract_location("40°30'N, 75°15'W").unwrap();
        assert_eq!(c.latitude, 40.5);
        assert_eq!(c.longitude, 75.25);
    }

    #[test]
    fn location_tolerates_ocr_glyphs() {
        let c = extract_location("Near Mill Creek; 37°38’N,121°45lW; Alameda Co.").unwrap();
        assert_eq!(c.latitude, 37.0 + 38.0 / 60.0);
        assert_eq!(c.longitude, 121.75);

        let c = extract_location("40º N, 75˚ W").unwrap();
        assert_eq!(c.latitude, 40.0);
        assert_eq!(c.longitude, 75.0);
    }

    #[test]
    fn location_with_seconds() {
        let c = extract_location("40°30'36\"N, 75°15'0\"W").unwrap();
        assert_eq!(c.latitude, 40.0 + 30.0 / 60.0 + 36.0 / 3600.0);
        assert_eq!(c.longitude, 75.25);
    }

    #[test]
    fn location_without_groups_is_unparsable() {
        let err = extract_location("Somewhere in the hills").unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Unparsable {
                field: FieldLabel::Location,
                ..
            }
        ));
        assert!(extract_location("40°75'N, 75°15'W").is_err());
    }

    #[test]
    fn size_parses_hectares() {
        assert_eq!(extract_size("8.1 ha.").unwrap(), 8.1);
        assert_eq!(extract_size("20 ha (49 acres).").unwrap(), 20.0);
        assert_eq!(extract_size("1O.2 hectares").unwrap(), 10.2);
        assert_eq!(extract_size("4,5 ha").unwrap(), 4.5);
        assert!(extract_size("about a field").is_err());
    }

    #[test]
    fn coverage_modern_with_times() {
        let c = extract_coverage(
            "20.9 h; 8 Visits (8 sunrise); 8, 15, 22, 29 April; 6, 13 May.",
            Era::Modern,
        )
        .unwrap();
        assert_eq!(c.hours, 20.9);
        assert_eq!(c.visits, Some(8));
        assert_eq!(c.times.as_deref(), Some("8 sunrise"));
        assert_eq!(c.notes, "8, 15, 22, 29 April; 6, 13 May.");
    }

    #[test]
    fn coverage_modern_without_times() {
        let c = extract_coverage("12 h; 6 visits; 2 May-30 June.", Era::Modern).unwrap();
        assert_eq!(c.hours, 12.0);
        assert_eq!(c.visits, Some(6));
        assert_eq!(c.times, None);
        assert_eq!(c.notes, "2 May-30 June.");
    }

    #[test]
    fn coverage_single_visit() {
        let c = extract_coverage("14.5 h; 1 visit (sunrise); May.", Era::Modern).unwrap();
        assert_eq!(c.hours, 14.5);
        assert_eq!(c.visits, Some(1));
        assert_eq!(c.times.as_deref(), Some("sunrise"));
        assert_eq!(c.notes, "May.");

        let c = extract_coverage("3 h; 1 Visit; 4 June.", Era::Modern).unwrap();
        assert_eq!(c.visits, Some(1));
        assert_eq!(c.notes, "4 June.");

        let c = extract_coverage("1 visit; 2.5 study-hours.", Era::Early).unwrap();
        assert_eq!(c.visits, Some(1));
        assert_eq!(c.hours, 2.5);
    }

    #[test]
    fn coverage_visits_omitted() {
        let c = extract_coverage("15.5 h; May-June.", Era::Modern).unwrap();
        assert_eq!(c.hours, 15.5);
        assert_eq!(c.visits, None);
        assert_eq!(c.notes, "May-June.");
    }

    #[test]
    fn coverage_early_era() {
        let c = extract_coverage("10 visits; 31 study-hours.", Era::Early).unwrap();
        assert_eq!(c.hours, 31.0);
        assert_eq!(c.visits, Some(10));

        let c = extract_coverage("22.5 study-hours", Era::Early).unwrap();
        assert_eq!(c.hours, 22.5);
        assert_eq!(c.visits, None);

        let c = extract_coverage("9.5 h; April-June.", Era::Early).unwrap();
        assert_eq!(c.hours, 9.5);
        assert_eq!(c.visits, None);
        assert_eq!(c.times, None);
        assert_eq!(c.notes, "April-June.");
    }

    #[test]
    fn coverage_unparsable() {
        assert!(extract_coverage("several mornings", Era::Modern).is_err());
        assert!(extract_coverage("several mornings", Era::Early).is_err());
    }

    #[test]
    fn total_both_territory_nouns() {
        let t = extract_total("21 species; 102.5 territories (405/km², 164/100 acres).").unwrap();
        assert_eq!(t.richness, 21);
        assert_eq!(t.territories, 102.5);
        assert_eq!(t.notes.as_deref(), Some("405/km², 164/100 acres"));

        let t = extract_total("9 species; 30 territorial males.").unwrap();
        assert_eq!(t.territories, 30.0);
        assert_eq!(t.notes, None);

        assert!(extract_total("lots of birds").is_err());
    }

    #[test]
    fn continuity_variants() {
        assert_eq!(
            extract_continuity("New", 1991, Era::Modern).unwrap(),
            Continuity { established: 1991, length: Some(1) }
        );
        assert_eq!(
            extract_continuity("Established 1985; 6 yr.", 1991, Era::Modern).unwrap(),
            Continuity { established: 1985, length: Some(6) }
        );
        assert_eq!(
            extract_continuity("1985", 1991, Era::Modern).unwrap(),
            Continuity { established: 1985, length: None }
        );
        assert_eq!(
            extract_continuity("Established 1980, 9 consecutive yr.", 1991, Era::Modern).unwrap(),
            Continuity { established: 1980, length: Some(9) }
        );
    }

    #[test]
    fn continuity_space_delimiter_only_in_early_era() {
        assert_eq!(
            extract_continuity("1984 4 yr.", 1988, Era::Early).unwrap(),
            Continuity { established: 1984, length: Some(4) }
        );
        assert!(extract_continuity("1984 4 yr.", 1991, Era::Modern).is_err());
        assert!(extract_continuity("unknown", 1991, Era::Modern).is_err());
    }

    #[test]
    fn cleanup_joins_lines() {
        assert_eq!(
            clean_field_text("  Mixed decid-\nuous forest\nwith a stream. \n"),
            "Mixed deciduous forest with a stream."
        );
    }
}
