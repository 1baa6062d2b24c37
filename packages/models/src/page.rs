//! Records read from a unit's live alert-events page.
//!
//! Unlike the text log, the live page is table-shaped, so each record is a
//! map from (renamed) column header to cell value rather than a fixed
//! struct.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// One row pair (data row + message row) from an alert table.
pub type PageRecord = BTreeMap<String, PageField>;

/// A cell value from the live page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageField {
    /// Plain cell text.
    Text(String),
    /// Multi-line cell split into its lines (e.g. `Locations`).
    Lines(Vec<String>),
}

impl PageField {
    /// Returns the text value, if this is a [`PageField::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Lines(_) => None,
        }
    }

    /// Returns the lines, if this is a [`PageField::Lines`].
    #[must_use]
    pub fn as_lines(&self) -> Option<&[String]> {
        match self {
            Self::Text(_) => None,
            Self::Lines(lines) => Some(lines),
        }
    }
}

impl From<&str> for PageField {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for PageField {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// The three alert tables on the live page, in page order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PageCategory {
    /// Alerts queued for future transmission.
    Scheduled,
    /// Alerts active right now.
    Current,
    /// Alerts whose validity window has ended.
    Expired,
}

impl PageCategory {
    /// Page order of the alert tables.
    pub const ALL: [Self; 3] = [Self::Scheduled, Self::Current, Self::Expired];
}

/// Records from the live page, keyed by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecords {
    /// Alerts queued for future transmission.
    pub scheduled: Vec<PageRecord>,
    /// Alerts active right now.
    pub current: Vec<PageRecord>,
    /// Alerts whose validity window has ended.
    pub expired: Vec<PageRecord>,
}

impl PageRecords {
    /// Returns the list for `category`.
    #[must_use]
    pub fn list(&self, category: PageCategory) -> &[PageRecord] {
        match category {
            PageCategory::Scheduled => &self.scheduled,
            PageCategory::Current => &self.current,
            PageCategory::Expired => &self.expired,
        }
    }

    /// Replaces the list for `category`.
    pub fn set_list(&mut self, category: PageCategory, records: Vec<PageRecord>) {
        match category {
            PageCategory::Scheduled => self.scheduled = records,
            PageCategory::Current => self.current = records,
            PageCategory::Expired => self.expired = records,
        }
    }

    /// Total number of records across all three lists.
    #[must_use]
    pub fn total(&self) -> usize {
        self.scheduled.len() + self.current.len() + self.expired.len()
    }
}
