//! Fixed layout of the unit's web console.
//!
//! Selectors, scripts, and the markup checks the session uses to decide
//! whether a navigation step is already done.

use std::sync::LazyLock;

use scraper::{Html, Selector};

/// Login form user name field.
pub const USERNAME_INPUT: &str = "input[name=login_user]";
/// Login form password field.
pub const PASSWORD_INPUT: &str = "input[name=login_password]";
/// Login form submit button.
pub const LOGIN_BUTTON: &str = "input[name=Login]";

/// Text the console renders after rejected credentials. The response
/// status is 200 either way.
pub const LOGIN_FAILED: &str = "Login failed";

/// "All" option of the decoder sub-menu.
pub const SUBMENU_ALL_RADIO: &str = r#"input[type="radio"][name="DecoderSubmenu"][value="All"]"#;
/// Drop-down choosing how far back the event list reaches.
pub const TIME_WINDOW_SELECT: &str = r#"select[name="AlertRange"]"#;

/// Switches the console to the alert-events tab.
pub const SELECT_ALERT_TAB_SCRIPT: &str =
    "select_page_level(document.forms[0], '0', decoder_page, '', '0');";

/// Label of the alert-events tab in the main menu.
const ALERT_TAB_LABEL: &str = "Alert Events";

/// Element holding the downloaded log's text.
pub const LOG_TEXT_SELECTOR: &str = "body pre";

/// Report slots the console may link the originated-events log from.
const REPORT_SLOTS: u8 = 10;

static UNSELECTED_TAB_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.mainmenu_unseltab").expect("valid selector"));
static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Login page URL for a unit.
#[must_use]
pub fn console_url(address: &str) -> String {
    format!("http://{address}/dasdec/dasdec.csp")
}

/// Absolute URL for a console-relative path.
#[must_use]
pub fn absolute_url(address: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_owned()
    } else {
        format!("http://{address}/{}", path.trim_start_matches('/'))
    }
}

/// Whether the alert-events tab is the selected one.
///
/// The menu renders unselected tabs with `mainmenu_unseltab`; the tab is
/// selected unless it appears among them.
#[must_use]
pub fn alert_tab_selected(html: &str) -> bool {
    let document = Html::parse_document(html);
    !document
        .select(&UNSELECTED_TAB_SEL)
        .any(|cell| cell.text().collect::<String>().trim() == ALERT_TAB_LABEL)
}

/// Finds the originated-events report link, trying slots in order.
#[must_use]
pub fn find_report_link(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let hrefs: Vec<&str> = document
        .select(&LINK_SEL)
        .filter_map(|link| link.value().attr("href"))
        .collect();

    (0..REPORT_SLOTS)
        .map(|slot| format!("/dasdec_originated_events/report{slot}.txt"))
        .find_map(|path| {
            hrefs
                .iter()
                .find(|href| href.ends_with(&path))
                .map(|href| (*href).to_owned())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_selected_unless_listed_unselected() {
        let unselected = r#"<table><tr>
            <td class="mainmenu_seltab">Setup</td>
            <td class="mainmenu_unseltab"> Alert Events </td>
        </tr></table>"#;
        let selected = r#"<table><tr>
            <td class="mainmenu_unseltab">Setup</td>
            <td class="mainmenu_seltab">Alert Events</td>
        </tr></table>"#;

        assert!(!alert_tab_selected(unselected));
        assert!(alert_tab_selected(selected));
        assert!(alert_tab_selected(""));
    }

    #[test]
    fn report_link_prefers_lowest_slot() {
        let html = r#"<a href="/dasdec_originated_events/report3.txt">Old</a>
            <a href="/dasdec_originated_events/report1.txt">Report</a>
            <a href="/dasdec_forwarded_events/report0.txt">Forwarded</a>"#;

        assert_eq!(
            find_report_link(html).as_deref(),
            Some("/dasdec_originated_events/report1.txt")
        );
    }

    #[test]
    fn report_link_missing() {
        assert_eq!(find_report_link(r#"<a href="/help.html">Help</a>"#), None);
    }

    #[test]
    fn urls() {
        assert_eq!(console_url("10.0.0.5"), "http://10.0.0.5/dasdec/dasdec.csp");
        assert_eq!(
            absolute_url("10.0.0.5", "/dasdec_originated_events/report0.txt"),
            "http://10.0.0.5/dasdec_originated_events/report0.txt"
        );
        assert_eq!(
            absolute_url("10.0.0.5", "http://10.0.0.5/x.txt"),
            "http://10.0.0.5/x.txt"
        );
    }
}
