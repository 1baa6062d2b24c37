//! Unit list and scrape options, loaded from TOML.
//!
//! ```toml
//! [options]
//! login_timeout_secs = 3
//!
//! [[unit]]
//! name = "studio"
//! address = "10.20.0.11"
//! username = "admin"
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eas_ingest_models::target::ScrapeTarget;
use eas_ingest_scraper::{BrowserOptions, SessionTimeouts};
use serde::Deserialize;

/// Environment variable consulted when no unit filter is given.
pub const UNIT_FILTER_ENV: &str = "EAS_INGEST_UNITS";

/// Errors loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid configuration TOML.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two units share a name.
    #[error("duplicate unit name: {0}")]
    DuplicateUnit(String),

    /// A unit is missing a required value.
    #[error("unit {name:?}: {reason}")]
    InvalidUnit {
        /// Unit name as configured.
        name: String,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Timeouts and browser settings shared by every unit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScrapeOptions {
    /// Limit for loading a unit's login page.
    pub login_timeout_secs: u64,
    /// Limit for each later console step.
    pub step_timeout_secs: u64,
    /// Limit for one unit's whole scrape.
    pub unit_deadline_secs: u64,
    /// Run the browser without a window.
    pub headless: bool,
    /// Browser binary; auto-detected when unset.
    pub chrome_executable: Option<PathBuf>,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            login_timeout_secs: 3,
            step_timeout_secs: 15,
            unit_deadline_secs: 60,
            headless: true,
            chrome_executable: None,
        }
    }
}

impl ScrapeOptions {
    /// Session time limits.
    #[must_use]
    pub const fn timeouts(&self) -> SessionTimeouts {
        SessionTimeouts {
            login: Duration::from_secs(self.login_timeout_secs),
            step: Duration::from_secs(self.step_timeout_secs),
            unit_deadline: Duration::from_secs(self.unit_deadline_secs),
        }
    }

    /// Browser launch settings.
    #[must_use]
    pub fn browser(&self) -> BrowserOptions {
        BrowserOptions {
            headless: self.headless,
            chrome_executable: self.chrome_executable.clone(),
            ..BrowserOptions::default()
        }
    }
}

/// A parsed configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Shared options.
    #[serde(default)]
    pub options: ScrapeOptions,
    /// Configured units, in file order.
    #[serde(default, rename = "unit")]
    pub units: Vec<ScrapeTarget>,
}

impl IngestConfig {
    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed, a unit lacks a
    /// name, address, or user name, or two units share a name.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for unit in &self.units {
            let missing = if unit.name.trim().is_empty() {
                Some("name is empty")
            } else if unit.address.trim().is_empty() {
                Some("address is empty")
            } else if unit.username.is_empty() {
                Some("username is empty")
            } else {
                None
            };
            if let Some(reason) = missing {
                return Err(ConfigError::InvalidUnit {
                    name: unit.name.clone(),
                    reason,
                });
            }
            if !seen.insert(unit.name.as_str()) {
                return Err(ConfigError::DuplicateUnit(unit.name.clone()));
            }
        }
        Ok(())
    }

    /// Returns the units to scrape, filtered by a comma-separated list of
    /// names or, failing that, the [`UNIT_FILTER_ENV`] variable. With
    /// neither set, every unit is returned.
    #[must_use]
    pub fn select_units(&self, cli_filter: Option<String>) -> Vec<ScrapeTarget> {
        let filter = cli_filter.or_else(|| std::env::var(UNIT_FILTER_ENV).ok());
        let Some(filter) = filter else {
            return self.units.clone();
        };

        let names: Vec<&str> = filter.split(',').map(str::trim).collect();
        let selected: Vec<ScrapeTarget> = self
            .units
            .iter()
            .filter(|unit| names.contains(&unit.name.as_str()))
            .cloned()
            .collect();

        if selected.is_empty() {
            log::warn!(
                "No units match {names:?}. Available: {}",
                self.units
                    .iter()
                    .map(|u| u.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use eas_ingest_models::target::ScrapeMode;

    use super::*;

    const EXAMPLE: &str = include_str!("../units.example.toml");

    #[test]
    fn example_config_parses() {
        let config = IngestConfig::from_toml_str(EXAMPLE).unwrap();

        assert_eq!(config.units.len(), 2);
        assert_eq!(config.units[1].mode, ScrapeMode::LivePage);
        assert_eq!(config.units[1].time_window, "7days");
        assert!(config.options.headless);
    }

    #[test]
    fn options_default_when_absent() {
        let config = IngestConfig::from_toml_str("").unwrap();
        let timeouts = config.options.timeouts();

        assert_eq!(timeouts.login, Duration::from_secs(3));
        assert_eq!(timeouts.step, Duration::from_secs(15));
        assert_eq!(timeouts.unit_deadline, Duration::from_secs(60));
        assert!(config.units.is_empty());
    }

    #[test]
    fn partial_options_keep_other_defaults() {
        let config = IngestConfig::from_toml_str(
            r#"
            [options]
            login_timeout_secs = 10
            headless = false
            chrome_executable = "/usr/bin/chromium"
            "#,
        )
        .unwrap();

        assert_eq!(config.options.login_timeout_secs, 10);
        assert_eq!(config.options.step_timeout_secs, 15);
        let browser = config.options.browser();
        assert!(!browser.headless);
        assert_eq!(
            browser.chrome_executable.as_deref(),
            Some(Path::new("/usr/bin/chromium"))
        );
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = IngestConfig::from_toml_str(
            r#"
            [[unit]]
            name = "a"
            address = "10.0.0.1"
            username = "admin"

            [[unit]]
            name = "a"
            address = "10.0.0.2"
            username = "admin"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateUnit(name) if name == "a"));
    }

    #[test]
    fn empty_address_rejected() {
        let err = IngestConfig::from_toml_str(
            r#"
            [[unit]]
            name = "a"
            address = ""
            username = "admin"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUnit { reason: "address is empty", .. }));
    }

    #[test]
    fn unknown_option_rejected() {
        let err = IngestConfig::from_toml_str("[options]\nretries = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn filter_selects_named_units() {
        let config = IngestConfig::from_toml_str(EXAMPLE).unwrap();

        let selected = config.select_units(Some("transmitter, nowhere".to_owned()));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "transmitter");

        assert!(config.select_units(Some("nowhere".to_owned())).is_empty());
    }
}
