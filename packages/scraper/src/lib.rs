#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Session automation for EAS alert-unit web consoles.
//!
//! A scrape logs into one unit's console, walks it to the alert-events
//! view, and returns either the downloaded plaintext log or the rendered
//! page markup. The walk itself lives in [`session`] and talks to the
//! console only through the [`ConsoleDriver`] trait, so it runs the same
//! against the headless browser in [`browser`] and against scripted
//! drivers in tests.
//!
//! Every failure is folded into a [`ScrapeResult`] with a
//! [`ScrapeStatus`]; nothing raised here crosses [`scrape`].

pub mod browser;
pub mod console;
pub mod session;

use std::time::Duration;

use async_trait::async_trait;
use eas_ingest_models::target::{ScrapeStatus, ScrapeTarget};

pub use browser::{BrowserOptions, ChromeDriverFactory};
pub use session::{SessionTimeouts, Stage, scrape};

#[doc(no_inline)]
pub use eas_ingest_models::target::ScrapeResult;

/// Errors raised while driving a console session.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// A step did not finish within its time limit.
    #[error("timed out during {stage} after {limit:?}")]
    Timeout {
        /// Step that was running.
        stage: Stage,
        /// Limit that elapsed.
        limit: Duration,
    },

    /// The whole walk outlived the unit deadline.
    #[error("no result within the {limit:?} unit deadline")]
    Deadline {
        /// Deadline that elapsed.
        limit: Duration,
    },

    /// The console answered the login with its failure page.
    #[error("login rejected by console")]
    LoginRejected,

    /// The console did not render what the walk expected.
    #[error("{0}")]
    Navigation(String),

    /// The browser could not be configured or started.
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// A DevTools protocol call failed.
    #[error("browser error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    /// A script result could not be decoded.
    #[error("script result error: {0}")]
    Script(#[from] serde_json::Error),
}

impl ScrapeError {
    /// Terminal status this error maps to.
    #[must_use]
    pub fn status(&self) -> ScrapeStatus {
        match self {
            Self::Timeout { .. } | Self::Deadline { .. } => ScrapeStatus::Timeout,
            Self::LoginRejected => ScrapeStatus::AuthFailure,
            Self::Cdp(chromiumoxide::error::CdpError::Timeout) => ScrapeStatus::Timeout,
            Self::Cdp(err) if is_network_timeout(&err.to_string()) => ScrapeStatus::Timeout,
            Self::Navigation(_) | Self::Launch(_) | Self::Cdp(_) | Self::Script(_) => {
                ScrapeStatus::UnknownError
            }
        }
    }
}

/// Chromium network error codes that mean the unit never answered.
const NETWORK_TIMEOUT_CODES: [&str; 3] = [
    "ERR_TIMED_OUT",
    "ERR_CONNECTION_TIMED_OUT",
    "ERR_ADDRESS_UNREACHABLE",
];

fn is_network_timeout(message: &str) -> bool {
    NETWORK_TIMEOUT_CODES
        .iter()
        .any(|code| message.contains(code))
}

/// One open console session.
///
/// Methods act on the session's main page unless noted. Implementations
/// must tolerate [`ConsoleDriver::close`] being the only call made.
#[async_trait]
pub trait ConsoleDriver: Send {
    /// Navigates the main page to `url` and waits for it to load.
    async fn goto(&mut self, url: &str) -> Result<(), ScrapeError>;

    /// Returns the main page's current markup.
    async fn content(&mut self) -> Result<String, ScrapeError>;

    /// Types `value` into the input matched by `selector`.
    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), ScrapeError>;

    /// Clicks the element matched by `selector` and waits for any
    /// navigation the click triggers.
    async fn click(&mut self, selector: &str) -> Result<(), ScrapeError>;

    /// Checked state of the control matched by `selector`, or `None` if
    /// no such control exists.
    async fn is_checked(&mut self, selector: &str) -> Result<Option<bool>, ScrapeError>;

    /// Current value of the select matched by `selector`, or `None` if no
    /// such select exists.
    async fn selected_value(&mut self, selector: &str) -> Result<Option<String>, ScrapeError>;

    /// Sets the select matched by `selector` to `value` and fires its
    /// change handler.
    async fn select_value(&mut self, selector: &str, value: &str) -> Result<(), ScrapeError>;

    /// Runs a console script on the main page.
    async fn run_script(&mut self, script: &str) -> Result<(), ScrapeError>;

    /// Opens `url` in a new tab and returns the text of the element
    /// matched by `selector` there.
    async fn open_text(&mut self, url: &str, selector: &str) -> Result<String, ScrapeError>;

    /// Ends the session and releases everything it holds.
    async fn close(&mut self) -> Result<(), ScrapeError>;
}

/// Opens console sessions.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Opens a fresh session for `target`. Sessions are never shared
    /// between targets.
    async fn open(&self, target: &ScrapeTarget) -> Result<Box<dyn ConsoleDriver>, ScrapeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_statuses() {
        let timeout = ScrapeError::Timeout {
            stage: Stage::LoadLoginPage,
            limit: Duration::from_secs(3),
        };
        assert_eq!(timeout.status(), ScrapeStatus::Timeout);
        assert_eq!(ScrapeError::LoginRejected.status(), ScrapeStatus::AuthFailure);
        assert_eq!(
            ScrapeError::Navigation("download link not found".to_owned()).status(),
            ScrapeStatus::UnknownError
        );
        assert_eq!(
            ScrapeError::Cdp(chromiumoxide::error::CdpError::Timeout).status(),
            ScrapeStatus::Timeout
        );
    }

    #[test]
    fn timeout_message_names_stage() {
        let err = ScrapeError::Timeout {
            stage: Stage::SubmitCredentials,
            limit: Duration::from_secs(15),
        };
        assert_eq!(err.to_string(), "timed out during submit-credentials after 15s");
    }

    #[test]
    fn network_timeout_codes_are_recognised() {
        assert!(is_network_timeout("net::ERR_CONNECTION_TIMED_OUT at http://10.0.0.5"));
        assert!(!is_network_timeout("net::ERR_CONNECTION_REFUSED"));
    }
}
