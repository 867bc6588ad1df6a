//! Built-in correction tables for the census OCR text.
//!
//! Order matters: rules run top to bottom, each over the whole text, so a
//! later rule sees the output of every earlier one. New fixes go at the end
//! unless they must pre-empt an existing rule.

/// Literal OCR fixes, applied before any structural parsing.
pub static DEFAULT_CORRECTIONS: &[(&str, &str)] = &[
    // Section labels broken or misread by the OCR pass
    ("Cemus", "Census"),
    ("Cov-\nerage", "Coverage"),
    ("Cov—\nerage", "Coverage"),
    ("Con-\ntinuity", "Continuity"),
    ("Conti-\nnuity", "Continuity"),
    ("Loca-\ntion:", "Location:"),
    ("De-\nscription of Plot", "Description of Plot"),
    ("Descrip-\ntion of Plot", "Description of Plot"),
    ("Description\nof Plot", "Description of Plot"),
    ("Description of\nPlot", "Description of Plot"),
    ("Vis-\nitors", "Visitors"),
    ("Other Ob-\nservers", "Other Observers"),
    ("Acknowl-\nedgments", "Acknowledgments"),
    ("Previously\ncalled", "Previously called"),
    // Decimal points read as commas inside census counts
    ("Solitary Vireo, 1,0;", "Solitary Vireo, 1.0;"),
    ("Common Yellowthroat, 14,0", "Common Yellowthroat, 14.0"),
    ("Downy Wood-\npecker, 1,5", "Downy Wood-\npecker, 1.5"),
    ("Anna’s Hummingbird, 2,0", "Anna's Hummingbird, 2.0"),
    // Delimiters swapped between species entries
    ("Bobolink; 9.0 territories", "Bobolink, 9.0 territories"),
    (
        "Common\nYellowthroat, 4.5, Northern Flicker, 3.0",
        "Common\nYellowthroat, 4.5; Northern Flicker, 3.0",
    ),
    // Coordinates
    ("37°38'N,\n121°46lW", "37°38'N,\n121°46'W"),
    // Coverage punctuation
    (
        "20.9 h; 8 Visits (8 sunrise), 8, 15, 22, 29 April; 6, 13, 20, 27\nMay.",
        "20.9 h; 8 Visits (8 sunrise); 8, 15, 22, 29 April; 6, 13, 20, 27\nMay.",
    ),
    ("19.3 h; 11 visits (11 sunrise;", "19.3 h; 11 visits (11 sunrise);"),
    // Running page header picked up in one volume
    ("\nWinter 1992\n", "\n"),
];

/// Character-level fixes: ligatures, typographic quotes, degree look-alikes.
pub static DEFAULT_CHAR_FIXES: &[(&str, &str)] = &[
    ("ﬁ", "fi"),
    ("ﬂ", "fl"),
    ("ﬀ", "ff"),
    ("ﬃ", "ffi"),
    ("ﬄ", "ffl"),
    ("\u{00AD}", ""),
    ("“", "\""),
    ("”", "\""),
    ("’", "'"),
    ("‘", "'"),
    ("′", "'"),
    ("″", "\""),
    ("º", "°"),
    ("˚", "°"),
];

/// Letter/digit swaps that only apply between two digits.
pub static DIGIT_SWAP_FIXES: &[(&str, &str)] = &[
    (r"(\d)[lI|](\d)", "${1}1${2}"),
    (r"(\d)[oO](\d)", "${1}0${2}"),
];
