#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line harness for EAS alert-unit ingestion.
//!
//! Scrapes the configured units, or parses logs and pages saved to disk,
//! and prints the results as JSON on stdout. Logs go to stderr through
//! [`eas_ingest_cli_utils::init_logger`] so they never interleave with the
//! JSON or the progress bar.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eas_ingest::IngestConfig;
use eas_ingest::offline::unit_name_from_file_name;
use eas_ingest_cli_utils::IndicatifProgress;
use eas_ingest_parser::{LogParser, parse_page};
use eas_ingest_scraper::ChromeDriverFactory;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "eas_ingest", about = "EAS alert-unit log ingestion")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the configured units
    Units {
        /// Unit configuration file
        #[arg(long, default_value = "units.toml")]
        config: PathBuf,
    },
    /// Scrape the configured units and print one report per unit
    Scrape {
        /// Unit configuration file
        #[arg(long, default_value = "units.toml")]
        config: PathBuf,
        /// Comma-separated list of unit names to scrape (overrides
        /// `EAS_INGEST_UNITS` env var)
        #[arg(long)]
        units: Option<String>,
        /// Prompt for passwords missing from the configuration
        #[arg(long)]
        prompt_passwords: bool,
    },
    /// Parse a saved text log
    ParseLog {
        /// Log file
        file: PathBuf,
        /// Unit name to tag the records with. Defaults to the name embedded
        /// in the file name, if any.
        #[arg(long)]
        unit: Option<String>,
        /// Print where each forwarded alert was received from instead of
        /// the records
        #[arg(long)]
        origins: bool,
    },
    /// Parse every exported log in a directory
    ParseLogs {
        /// Directory of exported logs
        dir: PathBuf,
    },
    /// Parse a saved live alert-events page
    ParsePage {
        /// HTML file
        file: PathBuf,
    },
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), serde_json::Error> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

fn read_file(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()).into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = eas_ingest_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Units { config } => {
            let config = IngestConfig::load(&config)?;
            for unit in &config.units {
                println!(
                    "{:<20} {:<16} {:<10} {}",
                    unit.name, unit.address, unit.mode, unit.time_window
                );
            }
        }
        Commands::Scrape {
            config,
            units,
            prompt_passwords,
        } => {
            let config = IngestConfig::load(&config)?;
            let mut targets = config.select_units(units);
            if targets.is_empty() {
                return Err("no units selected".into());
            }

            if prompt_passwords {
                for target in targets.iter_mut().filter(|t| t.password.is_empty()) {
                    target.password = eas_ingest_cli_utils::prompt_password(&target.name)?;
                }
            }

            let factory = Arc::new(ChromeDriverFactory::new(config.options.browser()));
            let progress =
                IndicatifProgress::steps_bar(&multi, "Scraping units", targets.len() as u64);
            let reports =
                eas_ingest::run(&targets, factory, config.options.timeouts(), progress).await;

            print_json(&reports, cli.pretty)?;
        }
        Commands::ParseLog { file, unit, origins } => {
            let content = read_file(&file)?;
            let unit = unit.or_else(|| {
                file.file_name()
                    .and_then(|name| name.to_str())
                    .and_then(unit_name_from_file_name)
                    .map(str::to_owned)
            });

            let mut parser = LogParser::new();
            if let Some(unit) = &unit {
                parser = parser.with_unit_name(unit);
            }
            let tests = parser.parse(&content);
            log::info!("Parsed {} records from {}", tests.total(), file.display());

            if origins {
                print_json(&tests.forwarded_origins(), cli.pretty)?;
            } else {
                print_json(&tests, cli.pretty)?;
            }
        }
        Commands::ParseLogs { dir } => {
            let collections = eas_ingest::ingest_log_dir(&dir)?;
            print_json(&collections, cli.pretty)?;
        }
        Commands::ParsePage { file } => {
            let records = parse_page(&read_file(&file)?)?;
            log::info!("Parsed {} records from {}", records.total(), file.display());
            print_json(&records, cli.pretty)?;
        }
    }

    Ok(())
}
