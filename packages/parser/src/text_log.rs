//! Plaintext activity log parser.
//!
//! A unit's exported log is a sequence of sections. Each section opens with
//! a header block fenced by lines of dashes; somewhere inside the block the
//! report path names the section (`.../dasdec_originated_events/...`).
//! Between headers, each event starts with a tab-separated record line:
//!
//! ```text
//! 12:	RWT	Required Weekly Test	'ZCZC-EAS-RWT-024031+0015-...'	(From encoder (local))	ORG=EAS
//! ```
//!
//! and continues with lines carrying its validity window, its delivery
//! timestamp, and its locations. Anything else is skipped.

use std::sync::LazyLock;

use eas_ingest_models::{LogCategory, TestCollection, TestRecord};
use regex::{Captures, Regex};

use crate::timestamp::find_timestamps;

/// Minimum run of dashes that makes a line a header delimiter.
const HEADER_DELIMITER_MIN: usize = 70;

/// Literal markers that make a lone timestamp a delivery timestamp.
const DELIVERY_MARKERS: [&str; 3] = ["Decoded", "Originated", "Forwarded"];

/// Section token embedded in the report path inside a header block.
static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"dasdec_(.*?)_events").expect("valid regex"));

/// Record-opening line: id, class code, description, quoted payload,
/// parenthesized detail (one level of nesting), and `ORG=` code.
static RECORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(\d{1,6}):\t([A-Z]{3})\t([^\t]+)\t+'([^']*)'\s*\(((?:[^)]|\([^)]*\))*)\)\s*ORG=([A-Z]{3})",
    )
    .expect("valid regex")
});

/// Free text followed by a parenthesized numeric location code.
static LOCATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b.*?\(\d+\)").expect("valid regex"));

/// Whether the scanner is inside a dash-fenced header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderState {
    Outside,
    Inside,
}

impl HeaderState {
    const fn toggled(self) -> Self {
        match self {
            Self::Outside => Self::Inside,
            Self::Inside => Self::Outside,
        }
    }
}

/// How a single line is interpreted given the current header state.
enum LogLine<'a> {
    /// A dash fence; toggles the header state.
    Delimiter,
    /// Header content naming a section.
    Section(&'a str),
    /// Header content without a section name.
    HeaderNoise,
    /// Outside a header: a record-opening line.
    Record(Captures<'a>),
    /// Outside a header: anything else, applied to the open record.
    Continuation(&'a str),
}

/// Line-oriented scanner that sorts log records into category lists.
///
/// A parser is consumed by [`LogParser::parse`]; each run starts from a
/// clean state, so parsing the same text twice yields equal collections.
#[derive(Debug)]
pub struct LogParser {
    header: HeaderState,
    active: Option<LogCategory>,
    current: Option<TestRecord>,
    tests: TestCollection,
    skipped: usize,
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser {
    /// Creates a parser with no active section.
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: HeaderState::Outside,
            active: None,
            current: None,
            tests: TestCollection::default(),
            skipped: 0,
        }
    }

    /// Tags the resulting collection with the unit it came from.
    #[must_use]
    pub fn with_unit_name(mut self, name: &str) -> Self {
        self.tests.unit_name = Some(name.to_owned());
        self
    }

    /// Parses `content` and returns the categorized records.
    #[must_use]
    pub fn parse(mut self, content: &str) -> TestCollection {
        for line in content.lines() {
            self.dispatch(line);
        }
        self.flush();

        log::debug!(
            "Parsed {} records ({} lines skipped)",
            self.tests.total(),
            self.skipped
        );
        self.tests
    }

    fn classify<'a>(&self, line: &'a str) -> LogLine<'a> {
        if is_header_delimiter(line) {
            return LogLine::Delimiter;
        }
        match self.header {
            HeaderState::Inside => SECTION_RE
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map_or(LogLine::HeaderNoise, |token| LogLine::Section(token.as_str())),
            HeaderState::Outside => RECORD_RE
                .captures(line)
                .map_or(LogLine::Continuation(line), LogLine::Record),
        }
    }

    fn dispatch(&mut self, line: &str) {
        match self.classify(line) {
            LogLine::Delimiter => self.header = self.header.toggled(),
            LogLine::Section(token) => self.switch_section(token),
            LogLine::HeaderNoise => {}
            LogLine::Record(caps) => self.open_record(&caps),
            LogLine::Continuation(text) => self.apply_continuation(text),
        }
    }

    /// Moves the open record onto the active list. Records seen while no
    /// section is active are dropped.
    fn flush(&mut self) {
        let Some(test) = self.current.take() else {
            return;
        };
        match self.active {
            Some(category) => self.tests.list_mut(category).push(test),
            None => log::debug!("Dropping record {} found outside any section", test.id),
        }
    }

    fn switch_section(&mut self, token: &str) {
        self.flush();
        self.active = LogCategory::from_section_token(token);
        match self.active {
            Some(category) => log::trace!("Entering {category} section"),
            None => log::warn!("Unknown log section '{token}', ignoring its records"),
        }
    }

    fn open_record(&mut self, caps: &Captures<'_>) {
        self.flush();
        let field = |i: usize| caps.get(i).map_or("", |m| m.as_str()).to_owned();
        self.current = Some(TestRecord {
            id: field(1),
            test_type: field(2),
            full_test_type: field(3).trim().to_owned(),
            ipaws_code: field(4),
            detail: field(5),
            organization: field(6),
            ..TestRecord::default()
        });
    }

    /// Timestamps are checked before locations; a line carrying both is
    /// treated as a timestamp line.
    fn apply_continuation(&mut self, line: &str) {
        let Some(test) = self.current.as_mut() else {
            self.skip(line);
            return;
        };

        let timestamps = find_timestamps(line);
        match timestamps.as_slice() {
            [start, end, ..] => test.set_window(start, end),
            [single] => {
                if DELIVERY_MARKERS.iter().any(|marker| line.contains(marker)) {
                    test.delivered_timestamp = Some((*single).to_owned());
                } else {
                    log::trace!("Ignoring diagnostic timestamp line: {line}");
                }
            }
            [] => {
                let locations: Vec<&str> = LOCATION_RE
                    .find_iter(line)
                    .map(|m| m.as_str().trim())
                    .collect();
                if locations.is_empty() {
                    self.skip(line);
                } else {
                    test.extend_locations(locations);
                }
            }
        }
    }

    fn skip(&mut self, line: &str) {
        if !line.trim().is_empty() {
            self.skipped += 1;
            log::trace!("Unmatched line: {line}");
        }
    }
}

/// A header delimiter is a line made only of a long run of dashes.
fn is_header_delimiter(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= HEADER_DELIMITER_MIN && trimmed.bytes().all(|b| b == b'-')
}

/// Parses a plaintext activity log into a [`TestCollection`].
#[must_use]
pub fn parse_log(content: &str) -> TestCollection {
    LogParser::new().parse(content)
}
