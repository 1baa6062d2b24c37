//! Per-unit scrape configuration and results.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::TestCollection;
use crate::page::PageRecords;

/// Time window selected when none is configured.
pub const DEFAULT_TIME_WINDOW: &str = "2weeks";

/// What to read from a unit once logged in.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
pub enum ScrapeMode {
    /// Download the plaintext activity log.
    #[default]
    TextLog,
    /// Read the live alert-events page.
    LivePage,
}

/// Connection descriptor for one alert unit. Immutable during a scrape.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeTarget {
    /// Human-readable unit name, used to tag results.
    pub name: String,
    /// Host name or IP address of the unit's web console.
    pub address: String,
    /// Console user name.
    pub username: String,
    /// Console password.
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Log time-window selector value understood by the unit firmware
    /// (e.g. `"2weeks"`, `"7days"`).
    #[serde(default = "default_time_window")]
    pub time_window: String,
    /// Whether to download the text log or read the live page.
    #[serde(default)]
    pub mode: ScrapeMode,
}

fn default_time_window() -> String {
    DEFAULT_TIME_WINDOW.to_owned()
}

impl ScrapeTarget {
    /// Creates a text-log target with the default time window.
    #[must_use]
    pub fn new(name: &str, address: &str, username: &str, password: &str) -> Self {
        Self {
            name: name.to_owned(),
            address: address.to_owned(),
            username: username.to_owned(),
            password: password.to_owned(),
            time_window: default_time_window(),
            mode: ScrapeMode::TextLog,
        }
    }

    /// Sets the log time window.
    #[must_use]
    pub fn with_time_window(mut self, window: &str) -> Self {
        window.clone_into(&mut self.time_window);
        self
    }

    /// Sets the scrape mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: ScrapeMode) -> Self {
        self.mode = mode;
        self
    }
}

impl fmt::Debug for ScrapeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrapeTarget")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("time_window", &self.time_window)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Terminal state of one unit's scrape.
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
pub enum ScrapeStatus {
    /// Content was retrieved.
    Success,
    /// The unit did not respond in time.
    Timeout,
    /// The console rejected the credentials.
    AuthFailure,
    /// Anything else went wrong.
    UnknownError,
}

/// Raw outcome of one unit's scrape.
///
/// `payload` is the raw content on success and a human-readable
/// diagnostic otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeResult {
    /// Terminal state.
    pub status: ScrapeStatus,
    /// Content or diagnostic.
    pub payload: String,
}

impl ScrapeResult {
    /// A successful result carrying raw content.
    #[must_use]
    pub const fn success(content: String) -> Self {
        Self {
            status: ScrapeStatus::Success,
            payload: content,
        }
    }

    /// A failed result carrying a diagnostic.
    #[must_use]
    pub fn failure(status: ScrapeStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            payload: message.into(),
        }
    }

    /// Whether the scrape retrieved content.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ScrapeStatus::Success
    }
}

/// What one unit produced after scraping and parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitOutcome {
    /// Records parsed from the downloaded text log.
    Log(TestCollection),
    /// Records parsed from the live page.
    Page(PageRecords),
    /// The unit produced nothing usable.
    Failed {
        /// Why the unit failed.
        status: ScrapeStatus,
        /// Human-readable diagnostic.
        message: String,
    },
}

impl UnitOutcome {
    /// Status for this outcome.
    #[must_use]
    pub const fn status(&self) -> ScrapeStatus {
        match self {
            Self::Log(_) | Self::Page(_) => ScrapeStatus::Success,
            Self::Failed { status, .. } => *status,
        }
    }
}

/// Result of one unit in a fan-out run, tagged with the unit's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    /// Unit name from its [`ScrapeTarget`].
    pub name: String,
    /// Parsed records or failure.
    pub outcome: UnitOutcome,
    /// How long the unit took, scrape and parse included.
    pub elapsed: Duration,
}
