#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Normalized EAS test records and the per-unit scrape types that carry
//! them.
//!
//! Both parsers in the pipeline produce the types defined here: the text
//! log parser fills a [`TestCollection`] of [`TestRecord`]s, and the live
//! page parser fills a [`page::PageRecords`]. Scrape configuration and
//! results live in [`target`].

pub mod page;
pub mod target;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// `chrono` format for console timestamps once the zone abbreviation has
/// been split off and whitespace collapsed.
const CONSOLE_TIMESTAMP_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// One alert or test event detected in a unit's activity log.
///
/// Which [`LogCategory`] list holds the record determines what
/// `delivered_timestamp` means (decoded, originated, or forwarded).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    /// Unit-local sequence number. Only unique within one unit's log.
    pub id: String,
    /// Three-letter event class code (e.g. `RWT`).
    pub test_type: String,
    /// Free-text description of the event class.
    pub full_test_type: String,
    /// Identifier/payload fragment taken from the single-quoted field.
    pub ipaws_code: String,
    /// Content of the parenthesized field on the record-opening line.
    pub detail: String,
    /// Three-letter issuing authority code from the `ORG=` marker.
    pub organization: String,
    /// Start of the validity window. Always set together with `end_time`.
    pub start_time: Option<String>,
    /// End of the validity window. Always set together with `start_time`.
    pub end_time: Option<String>,
    /// Single decoded/originated/forwarded timestamp.
    pub delivered_timestamp: Option<String>,
    /// Location strings in the order they appeared, possibly spanning
    /// several lines.
    pub locations: Option<Vec<String>>,
}

impl TestRecord {
    /// Sets the validity window from a matched timestamp pair.
    pub fn set_window(&mut self, start: &str, end: &str) {
        self.start_time = Some(start.to_owned());
        self.end_time = Some(end.to_owned());
    }

    /// Appends location tokens, creating the list on first use.
    pub fn extend_locations<I, S>(&mut self, locations: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locations
            .get_or_insert_with(Vec::new)
            .extend(locations.into_iter().map(Into::into));
    }

    /// Parses [`Self::delivered_timestamp`] into a naive date-time.
    #[must_use]
    pub fn delivered_at(&self) -> Option<ConsoleTimestamp> {
        self.delivered_timestamp
            .as_deref()
            .and_then(ConsoleTimestamp::parse)
    }

    /// Parses [`Self::start_time`] into a naive date-time.
    #[must_use]
    pub fn start_at(&self) -> Option<ConsoleTimestamp> {
        self.start_time.as_deref().and_then(ConsoleTimestamp::parse)
    }

    /// Parses [`Self::end_time`] into a naive date-time.
    #[must_use]
    pub fn end_at(&self) -> Option<ConsoleTimestamp> {
        self.end_time.as_deref().and_then(ConsoleTimestamp::parse)
    }
}

/// A console timestamp (`Www Mmm DD HH:MM:SS YYYY ZZZ`) split into its
/// local date-time and zone abbreviation.
///
/// Zone abbreviations like `EST` are ambiguous, so no offset is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleTimestamp {
    /// Wall-clock time as printed by the unit.
    pub local: NaiveDateTime,
    /// Zone abbreviation as printed by the unit (e.g. `EDT`).
    pub zone: String,
}

impl ConsoleTimestamp {
    /// Parses a console timestamp. Day-of-month may be space-padded.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let parts: Vec<&str> = text.split_whitespace().collect();
        let (zone, rest) = parts.split_last()?;
        let local =
            NaiveDateTime::parse_from_str(&rest.join(" "), CONSOLE_TIMESTAMP_FORMAT).ok()?;
        Some(Self {
            local,
            zone: (*zone).to_owned(),
        })
    }
}

/// The five mutually exclusive lists a logged record can belong to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LogCategory {
    /// Alerts the unit originated itself.
    Originated,
    /// Alerts relayed from another source.
    Forwarded,
    /// Alerts decoded from monitored broadcast inputs.
    Decoded,
    /// Alerts decoded from the EAS-NET network.
    EasNetDecoded,
    /// Alerts decoded from CAP feeds.
    CapEasDecoded,
}

impl LogCategory {
    /// Maps a log section token (the `<token>` in `dasdec_<token>_events`)
    /// onto a category.
    #[must_use]
    pub fn from_section_token(token: &str) -> Option<Self> {
        token.parse().ok()
    }
}

/// Records parsed from one unit's text log, grouped by category.
///
/// Built once per parse run and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCollection {
    /// Unit the log came from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_name: Option<String>,
    /// Alerts the unit originated.
    pub originated: Vec<TestRecord>,
    /// Alerts the unit forwarded.
    pub forwarded: Vec<TestRecord>,
    /// Alerts decoded from broadcast inputs.
    pub decoded: Vec<TestRecord>,
    /// Alerts decoded from EAS-NET.
    pub eas_net_decoded: Vec<TestRecord>,
    /// Alerts decoded from CAP feeds.
    pub cap_eas_decoded: Vec<TestRecord>,
}

impl TestCollection {
    /// Returns the list for `category`.
    #[must_use]
    pub fn list(&self, category: LogCategory) -> &[TestRecord] {
        match category {
            LogCategory::Originated => &self.originated,
            LogCategory::Forwarded => &self.forwarded,
            LogCategory::Decoded => &self.decoded,
            LogCategory::EasNetDecoded => &self.eas_net_decoded,
            LogCategory::CapEasDecoded => &self.cap_eas_decoded,
        }
    }

    /// Returns the mutable list for `category`.
    pub fn list_mut(&mut self, category: LogCategory) -> &mut Vec<TestRecord> {
        match category {
            LogCategory::Originated => &mut self.originated,
            LogCategory::Forwarded => &mut self.forwarded,
            LogCategory::Decoded => &mut self.decoded,
            LogCategory::EasNetDecoded => &mut self.eas_net_decoded,
            LogCategory::CapEasDecoded => &mut self.cap_eas_decoded,
        }
    }

    /// Total number of records across every list.
    #[must_use]
    pub fn total(&self) -> usize {
        self.originated.len()
            + self.forwarded.len()
            + self.decoded.len()
            + self.eas_net_decoded.len()
            + self.cap_eas_decoded.len()
    }

    /// Traces every forwarded record back to the decoder list that received
    /// it, by matching ids.
    ///
    /// A unit logs a relayed alert under the same id in both its decoder
    /// list and its forwarded list. Decoded is checked first, then CAP,
    /// then EAS-NET.
    #[must_use]
    pub fn forwarded_origins(&self) -> Vec<ForwardedOrigin> {
        let has_id = |list: &[TestRecord], id: &str| list.iter().any(|t| t.id == id);

        self.forwarded
            .iter()
            .map(|test| {
                let source = if has_id(&self.decoded, &test.id) {
                    ForwardSource::Decoded
                } else if has_id(&self.cap_eas_decoded, &test.id) {
                    ForwardSource::CapEasDecoded
                } else if has_id(&self.eas_net_decoded, &test.id) {
                    ForwardSource::EasNetDecoded
                } else {
                    ForwardSource::Unknown
                };
                ForwardedOrigin {
                    id: test.id.clone(),
                    source,
                }
            })
            .collect()
    }
}

/// Where a forwarded alert was received from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ForwardSource {
    /// Received over a monitored broadcast input.
    Decoded,
    /// Received from a CAP feed.
    CapEasDecoded,
    /// Received over EAS-NET.
    EasNetDecoded,
    /// No decoder list carries the id (e.g. it aged out of the window).
    Unknown,
}

/// Provenance of one forwarded record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardedOrigin {
    /// Id shared by the forwarded record and its decoder record.
    pub id: String,
    /// Decoder list the id was found in.
    pub source: ForwardSource,
}
