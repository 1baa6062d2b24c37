//! Live alert-events page parser.
//!
//! The unit renders its scheduled, current, and expired alerts as a fixed
//! sequence of nested tables inside a `rules="cols"` layout table. After
//! discarding empty, placeholder, and footer tables, the remaining tables
//! come in (label, data) pairs, one pair per category. Each data table has
//! a header row, then alternating data and message rows, then a summary
//! row.

use std::sync::LazyLock;

use eas_ingest_models::page::{PageCategory, PageField, PageRecord, PageRecords};
use scraper::{ElementRef, Html, Selector};

use crate::timestamp::{find_timestamps, strip_timestamps};

/// Text of tables and rows that carry no data.
const PLACEHOLDER_LABEL: &str = "RMT";

/// Footer text of the per-category record counters.
const FOOTER_MARKER: &str = "alert records displayed";

/// Positions of the (label, data) tables among the kept tables.
const TABLE_POSITIONS: [usize; 6] = [0, 1, 2, 3, 4, 6];

/// Background colour of the duplicate row highlighting the active alert.
const ACTIVE_HIGHLIGHT: &str = "#CC33CC";

/// Column headers renamed to short keys. Unlisted headers pass through.
const HEADER_RENAMES: [(&str, &str); 4] = [
    ("EAS Type", "EAS"),
    ("Start Time", "Started"),
    ("End Time", "Ended"),
    ("Location (Limit)", "Locations"),
];

/// Header of the combined channel/origin column.
const CHANNEL_ORIGIN_HEADER: &str = "Chnl/Orig";

/// Message-row fragments after which only audio links follow.
const AUDIO_LINK_MARKERS: [&str; 2] = ["Audio Portion", "Pre-Alert Audio"];

static LAYOUT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"table[rules="cols"]"#).expect("valid selector"));
static TABLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("valid selector"));
static ROW_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static HEADER_CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td, th").expect("valid selector"));
static CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("valid selector"));

/// Errors raised when a page does not have the expected table layout.
#[derive(Debug, thiserror::Error)]
pub enum PageParseError {
    /// No `rules="cols"` layout table was found.
    #[error("no layout table found")]
    MissingLayout,

    /// Fewer alert tables than the fixed layout requires.
    #[error("expected at least {needed} alert tables, found {found}")]
    MissingTables {
        /// Tables the layout requires.
        needed: usize,
        /// Tables left after filtering.
        found: usize,
    },
}

/// Tracks which category the next data table belongs to.
///
/// Advancing past the last category wraps to the first with a warning: a
/// page only has three pairs, so wrapping means the parser was reused.
#[derive(Debug, Default)]
struct CategoryCursor {
    advanced: usize,
}

impl CategoryCursor {
    fn advance(&mut self) -> PageCategory {
        if self.advanced >= PageCategory::ALL.len() {
            log::warn!("Page parser reused without reset, restarting at scheduled alerts");
            self.advanced = 0;
        }
        let category = PageCategory::ALL[self.advanced];
        self.advanced += 1;
        category
    }
}

/// Parser for the live alert-events page.
///
/// The category cursor persists across [`PageParser::parse`] calls; a
/// reused parser logs a warning and recovers by restarting the cursor.
#[derive(Debug, Default)]
pub struct PageParser {
    cursor: CategoryCursor,
}

impl PageParser {
    /// Creates a parser positioned before the scheduled alerts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one page into its three record lists.
    ///
    /// # Errors
    ///
    /// Returns [`PageParseError`] if the page lacks the layout table or
    /// enough alert tables.
    pub fn parse(&mut self, html: &str) -> Result<PageRecords, PageParseError> {
        let document = Html::parse_document(html);
        let tables = alert_tables(&document)?;

        let mut records = PageRecords::default();
        let mut category = None;

        for (index, table) in tables.iter().enumerate() {
            if index % 2 == 0 {
                category = Some(self.cursor.advance());
            } else if let Some(category) = category {
                let gathered = gather_records(*table);
                log::debug!("Found {} {category} alerts", gathered.len());
                records.set_list(category, gathered);
            }
        }

        Ok(records)
    }
}

/// Parses a live alert-events page with a fresh [`PageParser`].
///
/// # Errors
///
/// Returns [`PageParseError`] if the page layout is not recognised.
pub fn parse_page(html: &str) -> Result<PageRecords, PageParseError> {
    PageParser::new().parse(html)
}

// ── Table location ──────────────────────────────────────────────────────

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

/// Finds the six (label, data) tables in page order.
///
/// The page has an outer and an inner `rules="cols"` table; the inner one
/// holds the alert tables. Pages with a single layout table use it
/// directly.
fn alert_tables(document: &Html) -> Result<Vec<ElementRef<'_>>, PageParseError> {
    let layouts: Vec<ElementRef<'_>> = document.select(&LAYOUT_SEL).collect();
    let layout = layouts
        .get(1)
        .or_else(|| layouts.first())
        .copied()
        .ok_or(PageParseError::MissingLayout)?;

    let kept: Vec<ElementRef<'_>> = std::iter::once(layout)
        .chain(
            layout
                .select(&TABLE_SEL)
                .filter(|table| table.id() != layout.id()),
        )
        .filter(|table| {
            let text = element_text(*table);
            let text = text.trim();
            !text.is_empty() && text != PLACEHOLDER_LABEL && !text.contains(FOOTER_MARKER)
        })
        .collect();

    let needed = TABLE_POSITIONS.iter().max().map_or(0, |max| max + 1);
    TABLE_POSITIONS
        .iter()
        .map(|&i| {
            kept.get(i).copied().ok_or(PageParseError::MissingTables {
                needed,
                found: kept.len(),
            })
        })
        .collect()
}

// ── Row handling ────────────────────────────────────────────────────────

fn header_labels(row: ElementRef<'_>) -> Vec<String> {
    row.select(&HEADER_CELL_SEL)
        .map(|cell| {
            let label = element_text(cell);
            let label = label.trim();
            HEADER_RENAMES
                .iter()
                .find(|(from, _)| *from == label)
                .map_or(label, |(_, to)| *to)
                .to_owned()
        })
        .collect()
}

fn cell_texts(row: ElementRef<'_>) -> Vec<String> {
    row.select(&CELL_SEL)
        .map(|cell| element_text(cell).trim().to_owned())
        .collect()
}

fn is_active_highlight(row: ElementRef<'_>) -> bool {
    row.value()
        .attr("bgcolor")
        .is_some_and(|color| color.eq_ignore_ascii_case(ACTIVE_HIGHLIGHT))
}

fn is_blank_row(row: ElementRef<'_>) -> bool {
    let text = element_text(row);
    let text = text.trim();
    text.is_empty() || text == PLACEHOLDER_LABEL
}

/// Reads the records from one data table.
///
/// The header row and trailing summary row are dropped, as are highlight
/// duplicates and blank rows. A record is kept only once its message row
/// has been read.
fn gather_records(table: ElementRef<'_>) -> Vec<PageRecord> {
    let rows: Vec<ElementRef<'_>> = table.select(&ROW_SEL).collect();
    let Some((header_row, rest)) = rows.split_first() else {
        return Vec::new();
    };
    let headers = header_labels(*header_row);
    let body = rest.split_last().map_or(&[][..], |(_, body)| body);

    let mut records = Vec::new();
    let mut pending: Option<PageRecord> = None;

    let rows = body
        .iter()
        .copied()
        .filter(|row| !is_active_highlight(*row) && !is_blank_row(*row));

    for (index, row) in rows.enumerate() {
        let cells = cell_texts(row);
        if index % 2 == 0 {
            let cells: Vec<String> = cells
                .into_iter()
                .filter(|cell| cell != PLACEHOLDER_LABEL)
                .collect();
            pending = build_record(&headers, &cells);
        } else if let Some(mut record) = pending.take() {
            record.insert("Message".to_owned(), message_text(&cells).into());
            records.push(record);
        } else {
            log::debug!("Dropping message row without a data row");
        }
    }

    records
}

fn build_record(headers: &[String], cells: &[String]) -> Option<PageRecord> {
    if cells.len() < headers.len() {
        log::debug!(
            "Skipping row with {} cells for {} headers",
            cells.len(),
            headers.len()
        );
        return None;
    }

    let mut record = PageRecord::new();
    for (header, cell) in headers.iter().zip(cells) {
        classify_field(&mut record, header, cell);
    }
    Some(record)
}

fn message_text(cells: &[String]) -> String {
    let raw = cells.first().map_or("", String::as_str);
    let mut message = raw.replace("Decoded as: ", "");
    for marker in AUDIO_LINK_MARKERS {
        if let Some(pos) = message.find(marker) {
            message.truncate(pos);
        }
    }
    message.trim_end().to_owned()
}

// ── Field classification ────────────────────────────────────────────────

/// One field-classification rule: a predicate over `(header, cell)` and the
/// handler that writes the cell into the record.
struct FieldRule {
    name: &'static str,
    applies: fn(&str, &str) -> bool,
    apply: fn(&mut PageRecord, &str, &str),
}

/// Rules in priority order; the first that applies wins. Cells no rule
/// claims are stored verbatim under their header.
const FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        name: "channel_origin",
        applies: |header, _| header == CHANNEL_ORIGIN_HEADER,
        apply: split_channel_origin,
    },
    FieldRule {
        name: "node",
        applies: |_, cell| cell.contains("Node:"),
        apply: split_node,
    },
    FieldRule {
        name: "locations",
        applies: |header, _| header == "Locations",
        apply: split_lines,
    },
    FieldRule {
        name: "timestamps",
        applies: |_, cell| !find_timestamps(cell).is_empty(),
        apply: assign_timestamps,
    },
];

fn classify_field(record: &mut PageRecord, header: &str, cell: &str) {
    match FIELD_RULES.iter().find(|rule| (rule.applies)(header, cell)) {
        Some(rule) => {
            log::trace!("{header}: {} rule", rule.name);
            (rule.apply)(record, header, cell);
        }
        None => {
            record.insert(header.to_owned(), cell.into());
        }
    }
}

fn split_channel_origin(record: &mut PageRecord, _header: &str, cell: &str) {
    let (channel, origin) = cell.split_once("from").unwrap_or((cell, ""));
    record.insert("Channel".to_owned(), channel.trim().into());
    let origin = origin.trim();
    if !origin.is_empty() {
        record.insert("Origin".to_owned(), origin.into());
    }
}

fn split_node(record: &mut PageRecord, header: &str, cell: &str) {
    let (value, node) = cell.split_once("Node:").unwrap_or((cell, ""));
    record.insert(header.to_owned(), value.trim().into());
    record.insert("Node".to_owned(), node.trim().replace('\'', "").into());
}

fn split_lines(record: &mut PageRecord, header: &str, cell: &str) {
    let lines = cell
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect();
    record.insert(header.to_owned(), PageField::Lines(lines));
}

/// The first timestamp goes under the column header. A second one goes
/// under the label left once the timestamps are removed (e.g. `Sent`).
fn assign_timestamps(record: &mut PageRecord, header: &str, cell: &str) {
    let timestamps = find_timestamps(cell);
    let Some(first) = timestamps.first() else {
        return;
    };
    record.insert(header.to_owned(), (*first).into());

    if let Some(second) = timestamps.get(1) {
        let label = strip_timestamps(cell).replace(':', "");
        let label = label.split_whitespace().collect::<Vec<_>>().join(" ");
        if label.is_empty() {
            log::debug!("No label for second timestamp in {header}");
        } else {
            record.insert(label, (*second).into());
        }
    }
    if timestamps.len() > 2 {
        log::debug!("Ignoring {} extra timestamps in {header}", timestamps.len() - 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER_ROW: &str = "<tr><td>EAS Type</td><td>Chnl/Orig</td><td>Start Time</td>\
        <td>End Time</td><td>Location (Limit)</td></tr>";

    fn data_row(eas: &str, bgcolor: Option<&str>) -> String {
        let attr = bgcolor.map_or(String::new(), |c| format!(r#" bgcolor="{c}""#));
        format!(
            "<tr{attr}><td>{eas}</td><td>Ch 2 from WXYZ-FM</td>\
             <td>Tue Mar 05 14:02:00 2024 EST</td><td>Tue Mar 05 14:17:00 2024 EST</td>\
             <td>Montgomery, MD\nFrederick, MD</td></tr>"
        )
    }

    fn message_row(text: &str) -> String {
        format!("<tr><td>Decoded as: {text} Audio Portion (mp3)</td></tr>")
    }

    fn data_table(rows: &[String]) -> String {
        format!(
            "<table>{HEADER_ROW}{}<tr><td>Totals</td></tr></table>",
            rows.concat()
        )
    }

    fn label_table(text: &str) -> String {
        format!("<table><tr><td>{text}</td></tr></table>")
    }

    fn mock_page() -> String {
        let scheduled = data_table(&[data_row("RWT", None), message_row("Weekly test")]);
        let current = data_table(&[
            data_row("DMO", Some("#CC33CC")),
            data_row("DMO", None),
            message_row("Monthly test"),
        ]);
        let expired = data_table(&[
            data_row("RWT", None),
            message_row("First"),
            "<tr><td></td></tr>".to_owned(),
            data_row("NPT", None),
            message_row("Second"),
        ]);

        format!(
            "<html><body>\
             <table rules=\"cols\"><tr><td>Menu</td></tr></table>\
             <table rules=\"cols\"><tr><td>\
             {sched_label}{scheduled}{counter}\
             <table></table>\
             {cur_label}{current}\
             {rmt}\
             {exp_label}{exp_sub}{expired}{counter}\
             </td></tr></table>\
             </body></html>",
            sched_label = label_table("Scheduled Alerts"),
            cur_label = label_table("Current Alerts"),
            exp_label = label_table("Expired Alerts"),
            exp_sub = label_table("Expired originated/forwarded alerts:"),
            rmt = label_table("RMT"),
            counter = label_table("2 alert records displayed"),
        )
    }

    #[test]
    fn parses_three_categories() {
        let records = parse_page(&mock_page()).unwrap();

        assert_eq!(records.scheduled.len(), 1);
        assert_eq!(records.current.len(), 1);
        assert_eq!(records.expired.len(), 2);
    }

    #[test]
    fn highlight_duplicate_is_dropped_from_current() {
        let records = parse_page(&mock_page()).unwrap();
        let current = &records.current[0];

        assert_eq!(current["EAS"].as_text(), Some("DMO"));
        assert_eq!(current["Message"].as_text(), Some("Monthly test"));
    }

    #[test]
    fn headers_are_renamed_and_cells_split() {
        let records = parse_page(&mock_page()).unwrap();
        let test = &records.scheduled[0];

        assert_eq!(test["EAS"].as_text(), Some("RWT"));
        assert_eq!(test["Channel"].as_text(), Some("Ch 2"));
        assert_eq!(test["Origin"].as_text(), Some("WXYZ-FM"));
        assert_eq!(test["Started"].as_text(), Some("Tue Mar 05 14:02:00 2024 EST"));
        assert_eq!(test["Ended"].as_text(), Some("Tue Mar 05 14:17:00 2024 EST"));
        assert_eq!(
            test["Locations"].as_lines(),
            Some(&["Montgomery, MD".to_owned(), "Frederick, MD".to_owned()][..])
        );
        assert!(!test.contains_key("Chnl/Orig"));
    }

    #[test]
    fn message_drops_prefix_and_audio_links() {
        let records = parse_page(&mock_page()).unwrap();
        assert_eq!(records.scheduled[0]["Message"].as_text(), Some("Weekly test"));
        assert_eq!(records.expired[1]["Message"].as_text(), Some("Second"));
    }

    #[test]
    fn node_cell_splits_into_two_fields() {
        let mut record = PageRecord::new();
        classify_field(&mut record, "EAS", "RWT Node: 'studio-b'");

        assert_eq!(record["EAS"].as_text(), Some("RWT"));
        assert_eq!(record["Node"].as_text(), Some("studio-b"));
    }

    #[test]
    fn second_timestamp_uses_remaining_label() {
        let mut record = PageRecord::new();
        classify_field(
            &mut record,
            "Started",
            "Tue Mar 05 14:02:00 2024 EST Sent: Tue Mar 05 14:02:30 2024 EST",
        );

        assert_eq!(record["Started"].as_text(), Some("Tue Mar 05 14:02:00 2024 EST"));
        assert_eq!(record["Sent"].as_text(), Some("Tue Mar 05 14:02:30 2024 EST"));
    }

    #[test]
    fn channel_rule_wins_over_timestamp_rule() {
        let mut record = PageRecord::new();
        classify_field(&mut record, "Chnl/Orig", "Ch 1 from Tue Mar 05 14:02:00 2024 EST");
        assert_eq!(record["Channel"].as_text(), Some("Ch 1"));
        assert!(!record.contains_key("Chnl/Orig"));
    }

    #[test]
    fn unrecognised_cells_pass_through() {
        let mut record = PageRecord::new();
        classify_field(&mut record, "Duration", "0015");
        assert_eq!(record["Duration"].as_text(), Some("0015"));
    }

    #[test]
    fn short_rows_are_skipped() {
        let headers = vec!["EAS".to_owned(), "Started".to_owned()];
        assert!(build_record(&headers, &["RWT".to_owned()]).is_none());
    }

    #[test]
    fn missing_layout_is_an_error() {
        let err = parse_page("<html><body><table></table></body></html>").unwrap_err();
        assert!(matches!(err, PageParseError::MissingLayout));
    }

    #[test]
    fn too_few_tables_is_an_error() {
        let html = format!(
            "<table rules=\"cols\"><tr><td>{}</td></tr></table>",
            label_table("Scheduled Alerts")
        );
        let err = parse_page(&html).unwrap_err();
        assert!(matches!(err, PageParseError::MissingTables { needed: 7, .. }));
    }

    #[test]
    fn reused_parser_recovers() {
        let mut parser = PageParser::new();
        let first = parser.parse(&mock_page()).unwrap();
        let second = parser.parse(&mock_page()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn cursor_wraps_after_expired() {
        let mut cursor = CategoryCursor::default();
        let order: Vec<PageCategory> = (0..4).map(|_| cursor.advance()).collect();
        assert_eq!(
            order,
            vec![
                PageCategory::Scheduled,
                PageCategory::Current,
                PageCategory::Expired,
                PageCategory::Scheduled,
            ]
        );
    }
}
