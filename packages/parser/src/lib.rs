#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Parsers for the two kinds of raw content an alert unit hands back.
//!
//! - [`text_log`] turns a downloaded plaintext activity log into a
//!   [`eas_ingest_models::TestCollection`] with a line-oriented state
//!   machine.
//! - [`page`] turns the live alert-events page into
//!   [`eas_ingest_models::page::PageRecords`] by locating its alert tables
//!   structurally.
//!
//! Neither parser treats unrecognised input as fatal: lines and rows that
//! do not match are skipped and only reported through `log`.

pub mod page;
pub mod text_log;
pub mod timestamp;

pub use page::{PageParseError, PageParser, parse_page};
pub use text_log::{LogParser, parse_log};
