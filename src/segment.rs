//! Splits one year's document into per-site blocks.

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

lazy_static! {
    static ref SITE_HEADER_RE: Regex = Regex::new(r"^([0-9]{1,2})\. ([A-Z —-]{2,})").unwrap();
}

const BLOCK_START_MARKERS: [&str; 2] = ["Location: ", "Site Number: "];

/// Raw text of one site's section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub site_number: u32,
    pub site_name: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekingSite,
    AwaitBlockStart,
    Recording,
}

/// Returns `(site number, site name)` if the line is a site header.
pub fn parse_site_header(line: &str) -> Option<(u32, String)> {
    let caps = SITE_HEADER_RE.captures(line)?;
    let number = caps[1].parse::<u32>().ok()?;
    let name = caps[2].trim();
    if !name.chars().any(|c| c.is_ascii_uppercase()) {
        return None;
    }
    Some((number, name.to_string()))
}

pub fn is_block_start(line: &str) -> bool {
    BLOCK_START_MARKERS.iter().any(|marker| line.starts_with(marker))
}

/// Line-driven segmenter. Feed lines with [`Segmenter::push_line`] and
/// collect the flushed blocks with [`Segmenter::finish`].
#[derive(Debug)]
pub struct Segmenter {
    state: State,
    pending: Option<(u32, String)>,
    buffer: String,
    blocks: Vec<Block>,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Segmenter {
    pub fn new() -> Self {
        Self {
            state: State::SeekingSite,
            pending: None,
            buffer: String::new(),
            blocks: Vec::new(),
        }
    }

    pub fn push_line(&mut self, line: &str) {
        if let Some((number, name)) = parse_site_header(line) {
            debug!("Site header {}. {}", number, name);
            self.flush();
            self.pending = Some((number, name));
            self.state = State::AwaitBlockStart;
            return;
        }

        if self.state == State::AwaitBlockStart && is_block_start(line) {
            self.state = State::Recording;
        }

        if self.state == State::Recording && !line.trim().is_empty() {
            self.buffer.push_str(line.trim_end_matches(|c| c == '\r' || c == '\n'));
            self.buffer.push('\n');
        }
    }

    /// Emits the pending site, with whatever was recorded for it (possibly
    /// nothing), and clears the accumulator.
    fn flush(&mut self) {
        if let Some((site_number, site_name)) = self.pending.take() {
            if self.state != State::Recording {
                debug!("Site {}. {} has no data block", site_number, site_name);
            }
            self.blocks.push(Block {
                site_number,
                site_name,
                text: std::mem::take(&mut self.buffer),
            });
        }
        self.buffer.clear();
        self.state = State::SeekingSite;
    }

    pub fn finish(mut self) -> Vec<Block> {
        self.flush();
        self.blocks
    }
}

/// Segments a whole document.
pub fn segment_document(text: &str) -> Vec<Block> {
    let mut segmenter = Segmenter::new();
    for line in text.lines() {
        segmenter.push_line(line);
    }
    segmenter.finish()
}
