#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ingests EAS test records from a fleet of alert units.
//!
//! [`run`] scrapes every configured unit concurrently and routes each
//! retrieved document to the text-log or live-page parser. One unit's
//! failure never affects another's: every unit yields exactly one
//! [`UnitReport`], in the order the units were given.

pub mod config;
pub mod offline;
pub mod progress;

use std::sync::Arc;
use std::time::{Duration, Instant};

use eas_ingest_models::target::{
    ScrapeMode, ScrapeResult, ScrapeStatus, ScrapeTarget, UnitOutcome, UnitReport,
};
use eas_ingest_parser::{LogParser, parse_page};
use eas_ingest_scraper::{DriverFactory, SessionTimeouts};

use crate::progress::ProgressCallback;

pub use config::{ConfigError, IngestConfig, ScrapeOptions};
pub use offline::{IngestError, ingest_log_dir};

/// Scrapes and parses every target concurrently.
///
/// Each target runs in its own task with its own session, bounded by the
/// unit deadline in `timeouts`; the batch finishes when the slowest unit
/// does. Reports come back in `targets` order.
pub async fn run(
    targets: &[ScrapeTarget],
    factory: Arc<dyn DriverFactory>,
    timeouts: SessionTimeouts,
    progress: Arc<dyn ProgressCallback>,
) -> Vec<UnitReport> {
    let start = Instant::now();
    progress.set_total(targets.len() as u64);
    log::info!("Scraping {} units", targets.len());

    let handles: Vec<_> = targets
        .iter()
        .cloned()
        .map(|target| {
            let factory = Arc::clone(&factory);
            let progress = Arc::clone(&progress);
            tokio::spawn(async move {
                let report = scrape_unit(factory.as_ref(), target, &timeouts).await;
                progress.set_message(format!("{}: {}", report.name, report.outcome.status()));
                progress.inc(1);
                report
            })
        })
        .collect();

    let joined = futures::future::join_all(handles).await;

    let reports: Vec<UnitReport> = targets
        .iter()
        .zip(joined)
        .map(|(target, joined)| {
            joined.unwrap_or_else(|e| {
                log::error!("{}: unit task failed: {e}", target.name);
                UnitReport {
                    name: target.name.clone(),
                    outcome: UnitOutcome::Failed {
                        status: ScrapeStatus::UnknownError,
                        message: format!("{}: unit task failed: {e}", target.name),
                    },
                    elapsed: start.elapsed(),
                }
            })
        })
        .collect();

    let succeeded = reports
        .iter()
        .filter(|r| r.outcome.status() == ScrapeStatus::Success)
        .count();
    progress.finish(format!("{succeeded}/{} units ingested", reports.len()));
    log::info!(
        "Ingested {succeeded}/{} units in {:.1}s",
        reports.len(),
        start.elapsed().as_secs_f64()
    );

    reports
}

async fn scrape_unit(
    factory: &dyn DriverFactory,
    target: ScrapeTarget,
    timeouts: &SessionTimeouts,
) -> UnitReport {
    let start = Instant::now();
    let result = eas_ingest_scraper::scrape(factory, &target, timeouts).await;
    let outcome = route(&target, result);
    let elapsed = start.elapsed();

    log_outcome(&target.name, &outcome, elapsed);
    UnitReport {
        name: target.name,
        outcome,
        elapsed,
    }
}

/// Parses a successful result with the parser for the target's mode;
/// failures pass through with their diagnostic.
#[must_use]
pub fn route(target: &ScrapeTarget, result: ScrapeResult) -> UnitOutcome {
    if !result.is_success() {
        return UnitOutcome::Failed {
            status: result.status,
            message: result.payload,
        };
    }

    match target.mode {
        ScrapeMode::TextLog => UnitOutcome::Log(
            LogParser::new()
                .with_unit_name(&target.name)
                .parse(&result.payload),
        ),
        ScrapeMode::LivePage => match parse_page(&result.payload) {
            Ok(records) => UnitOutcome::Page(records),
            Err(e) => UnitOutcome::Failed {
                status: ScrapeStatus::UnknownError,
                message: format!("{}: page layout not recognised: {e}", target.name),
            },
        },
    }
}

fn log_outcome(name: &str, outcome: &UnitOutcome, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    match outcome {
        UnitOutcome::Log(tests) => {
            log::info!("{name}: {} log records in {secs:.1}s", tests.total());
        }
        UnitOutcome::Page(records) => {
            log::info!("{name}: {} page records in {secs:.1}s", records.total());
        }
        UnitOutcome::Failed { status, message } => {
            log::warn!("{name}: {status} after {secs:.1}s: {message}");
        }
    }
}
