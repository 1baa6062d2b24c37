//! The per-unit console walk.
//!
//! ```text
//! init → load-login-page → submit-credentials → authenticated
//!      → navigate-tab → select-submenu → select-time-window
//!      → read-page | download-log
//! ```
//!
//! Each step runs under its own time limit and the whole walk under the
//! unit deadline. Navigation steps inspect the console first and do
//! nothing when it is already in the wanted state. The session is closed
//! on every exit path.

use std::future::Future;
use std::time::{Duration, Instant};

use eas_ingest_models::target::{ScrapeMode, ScrapeResult, ScrapeTarget};
use strum_macros::Display;

use crate::console;
use crate::{ConsoleDriver, DriverFactory, ScrapeError};

/// Time limits for one unit's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// Limit for loading the login page.
    pub login: Duration,
    /// Limit for every other step.
    pub step: Duration,
    /// Limit for the whole walk, login included.
    pub unit_deadline: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            login: Duration::from_secs(3),
            step: Duration::from_secs(15),
            unit_deadline: Duration::from_secs(60),
        }
    }
}

/// Steps of the console walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    /// Opening the browser session.
    Init,
    /// Loading the console's login page.
    LoadLoginPage,
    /// Filling in and submitting the login form.
    SubmitCredentials,
    /// Logged in; nothing navigated yet.
    Authenticated,
    /// Switching to the alert-events tab.
    NavigateTab,
    /// Choosing the "All" decoder sub-menu.
    SelectSubmenu,
    /// Choosing the event time window.
    SelectTimeWindow,
    /// Capturing the live alert-events page.
    ReadPage,
    /// Fetching the originated-events text log.
    DownloadLog,
    /// Closing the session.
    Release,
}

/// Scrapes one unit.
///
/// Never fails: every error becomes a non-success [`ScrapeResult`] whose
/// payload names the unit.
pub async fn scrape(
    factory: &dyn DriverFactory,
    target: &ScrapeTarget,
    timeouts: &SessionTimeouts,
) -> ScrapeResult {
    let start = Instant::now();
    log::info!("{}: starting {} scrape", target.name, target.mode);

    match run(factory, target, timeouts).await {
        Ok(content) => {
            log::info!(
                "{}: retrieved {} bytes in {:.1}s",
                target.name,
                content.len(),
                start.elapsed().as_secs_f64()
            );
            ScrapeResult::success(content)
        }
        Err(err) => {
            let status = err.status();
            log::warn!("{}: {status}: {err}", target.name);
            ScrapeResult::failure(status, format!("{}: {err}", target.name))
        }
    }
}

async fn run(
    factory: &dyn DriverFactory,
    target: &ScrapeTarget,
    timeouts: &SessionTimeouts,
) -> Result<String, ScrapeError> {
    let driver = within(Stage::Init, timeouts.step, factory.open(target)).await?;
    let mut guard = SessionGuard::new(&target.name, driver);

    let walk = Walk {
        driver: &mut *guard.driver,
        target,
        timeouts,
        stage: Stage::Init,
    };
    let result = tokio::time::timeout(timeouts.unit_deadline, walk.run())
        .await
        .unwrap_or(Err(ScrapeError::Deadline {
            limit: timeouts.unit_deadline,
        }));

    guard.release(timeouts.step).await;
    result
}

/// Runs `future` under `limit`, reporting `stage` if it elapses.
async fn within<T>(
    stage: Stage,
    limit: Duration,
    future: impl Future<Output = Result<T, ScrapeError>>,
) -> Result<T, ScrapeError> {
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| ScrapeError::Timeout {
            stage,
            limit,
        })?
}

// ── Session guard ───────────────────────────────────────────────────────

/// Owns an open session until it is released.
///
/// [`SessionGuard::release`] closes the session. A guard dropped
/// unreleased (its future was cancelled) drops the driver with it, which
/// tears the session down without the orderly close.
struct SessionGuard {
    unit: String,
    driver: Box<dyn ConsoleDriver>,
    released: bool,
}

impl SessionGuard {
    fn new(unit: &str, driver: Box<dyn ConsoleDriver>) -> Self {
        Self {
            unit: unit.to_owned(),
            driver,
            released: false,
        }
    }

    async fn release(&mut self, limit: Duration) {
        self.released = true;
        match within(Stage::Release, limit, self.driver.close()).await {
            Ok(()) => log::debug!("{}: session closed", self.unit),
            Err(err) => log::warn!("{}: session close failed: {err}", self.unit),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.released {
            log::warn!("{}: session dropped without release", self.unit);
        }
    }
}

// ── Walk ────────────────────────────────────────────────────────────────

struct Walk<'a> {
    driver: &'a mut dyn ConsoleDriver,
    target: &'a ScrapeTarget,
    timeouts: &'a SessionTimeouts,
    stage: Stage,
}

impl Walk<'_> {
    fn enter(&mut self, stage: Stage) {
        log::debug!("{}: {} -> {stage}", self.target.name, self.stage);
        self.stage = stage;
    }

    async fn run(mut self) -> Result<String, ScrapeError> {
        self.load_login_page().await?;
        self.submit_credentials().await?;
        self.enter(Stage::Authenticated);
        self.navigate_tab().await?;
        self.select_submenu().await?;
        self.select_time_window().await?;

        match self.target.mode {
            ScrapeMode::LivePage => self.read_page().await,
            ScrapeMode::TextLog => self.download_log().await,
        }
    }

    async fn load_login_page(&mut self) -> Result<(), ScrapeError> {
        self.enter(Stage::LoadLoginPage);
        let url = console::console_url(&self.target.address);
        within(self.stage, self.timeouts.login, self.driver.goto(&url)).await
    }

    async fn submit_credentials(&mut self) -> Result<(), ScrapeError> {
        self.enter(Stage::SubmitCredentials);
        let (stage, limit) = (self.stage, self.timeouts.step);
        let target = self.target;

        within(
            stage,
            limit,
            self.driver.fill(console::USERNAME_INPUT, &target.username),
        )
        .await?;
        within(
            stage,
            limit,
            self.driver.fill(console::PASSWORD_INPUT, &target.password),
        )
        .await?;
        within(stage, limit, self.driver.click(console::LOGIN_BUTTON)).await?;

        let page = within(stage, limit, self.driver.content()).await?;
        if page.contains(console::LOGIN_FAILED) {
            return Err(ScrapeError::LoginRejected);
        }
        Ok(())
    }

    async fn navigate_tab(&mut self) -> Result<(), ScrapeError> {
        self.enter(Stage::NavigateTab);
        let (stage, limit) = (self.stage, self.timeouts.step);

        let page = within(stage, limit, self.driver.content()).await?;
        if console::alert_tab_selected(&page) {
            log::debug!("{}: alert events tab already selected", self.target.name);
            return Ok(());
        }
        within(
            stage,
            limit,
            self.driver.run_script(console::SELECT_ALERT_TAB_SCRIPT),
        )
        .await
    }

    async fn select_submenu(&mut self) -> Result<(), ScrapeError> {
        self.enter(Stage::SelectSubmenu);
        let (stage, limit) = (self.stage, self.timeouts.step);

        let checked = within(stage, limit, self.driver.is_checked(console::SUBMENU_ALL_RADIO)).await?;
        match checked {
            Some(false) => {
                within(stage, limit, self.driver.click(console::SUBMENU_ALL_RADIO)).await
            }
            Some(true) => Ok(()),
            None => {
                log::debug!("{}: no sub-menu selector on page", self.target.name);
                Ok(())
            }
        }
    }

    async fn select_time_window(&mut self) -> Result<(), ScrapeError> {
        self.enter(Stage::SelectTimeWindow);
        let (stage, limit) = (self.stage, self.timeouts.step);
        let wanted = self.target.time_window.as_str();

        let current = within(
            stage,
            limit,
            self.driver.selected_value(console::TIME_WINDOW_SELECT),
        )
        .await?;
        match current {
            Some(value) if value != wanted => {
                log::debug!("{}: time window {value} -> {wanted}", self.target.name);
                within(
                    stage,
                    limit,
                    self.driver.select_value(console::TIME_WINDOW_SELECT, wanted),
                )
                .await
            }
            Some(_) | None => Ok(()),
        }
    }

    async fn read_page(&mut self) -> Result<String, ScrapeError> {
        self.enter(Stage::ReadPage);
        within(self.stage, self.timeouts.step, self.driver.content()).await
    }

    async fn download_log(&mut self) -> Result<String, ScrapeError> {
        self.enter(Stage::DownloadLog);
        let (stage, limit) = (self.stage, self.timeouts.step);

        let page = within(stage, limit, self.driver.content()).await?;
        let link = console::find_report_link(&page)
            .ok_or_else(|| ScrapeError::Navigation("download link not found".to_owned()))?;
        let url = console::absolute_url(&self.target.address, &link);

        log::debug!("{}: reading log from {url}", self.target.name);
        within(
            stage,
            limit,
            self.driver.open_text(&url, console::LOG_TEXT_SELECTOR),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use eas_ingest_models::target::ScrapeStatus;

    use super::*;

    const LOG_TEXT: &str = "1:\tEAN\tRWT\t'O-RWT'\t(WXYZ)\tORG=EAS\n";

    /// What the scripted console does. Each field is one behaviour.
    #[derive(Debug, Clone)]
    struct Script {
        login_ok: bool,
        login_delay: Duration,
        tab_selected: bool,
        radio: Option<bool>,
        window: Option<String>,
        report_link: bool,
        download_delay: Duration,
    }

    impl Default for Script {
        fn default() -> Self {
            Self {
                login_ok: true,
                login_delay: Duration::ZERO,
                tab_selected: true,
                radio: Some(true),
                window: Some("2weeks".to_owned()),
                report_link: true,
                download_delay: Duration::ZERO,
            }
        }
    }

    #[derive(Debug, Default)]
    struct Calls(Mutex<Vec<String>>);

    impl Calls {
        fn push(&self, call: impl Into<String>) {
            self.0.lock().unwrap().push(call.into());
        }

        fn all(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        fn contains(&self, prefix: &str) -> bool {
            self.all().iter().any(|call| call.starts_with(prefix))
        }
    }

    struct ScriptedDriver {
        script: Script,
        calls: Arc<Calls>,
        logged_in: bool,
        submitted: bool,
    }

    impl ScriptedDriver {
        fn page(&self) -> String {
            if !self.submitted {
                return "<form><input name=login_user></form>".to_owned();
            }
            if !self.logged_in {
                return "<p>Login failed</p>".to_owned();
            }
            let tab_class = if self.script.tab_selected {
                "mainmenu_seltab"
            } else {
                "mainmenu_unseltab"
            };
            let link = if self.script.report_link {
                r#"<a href="/dasdec_originated_events/report0.txt">Report</a>"#
            } else {
                ""
            };
            format!(r#"<table><tr><td class="{tab_class}">Alert Events</td></tr></table>{link}"#)
        }
    }

    #[async_trait]
    impl ConsoleDriver for ScriptedDriver {
        async fn goto(&mut self, url: &str) -> Result<(), ScrapeError> {
            self.calls.push(format!("goto {url}"));
            tokio::time::sleep(self.script.login_delay).await;
            Ok(())
        }

        async fn content(&mut self) -> Result<String, ScrapeError> {
            Ok(self.page())
        }

        async fn fill(&mut self, selector: &str, value: &str) -> Result<(), ScrapeError> {
            self.calls.push(format!("fill {selector} {value}"));
            Ok(())
        }

        async fn click(&mut self, selector: &str) -> Result<(), ScrapeError> {
            self.calls.push(format!("click {selector}"));
            if selector == console::LOGIN_BUTTON {
                self.submitted = true;
                self.logged_in = self.script.login_ok;
            } else if selector == console::SUBMENU_ALL_RADIO {
                self.script.radio = Some(true);
            }
            Ok(())
        }

        async fn is_checked(&mut self, _selector: &str) -> Result<Option<bool>, ScrapeError> {
            Ok(self.script.radio)
        }

        async fn selected_value(&mut self, _selector: &str) -> Result<Option<String>, ScrapeError> {
            Ok(self.script.window.clone())
        }

        async fn select_value(&mut self, _selector: &str, value: &str) -> Result<(), ScrapeError> {
            self.calls.push(format!("select {value}"));
            self.script.window = Some(value.to_owned());
            Ok(())
        }

        async fn run_script(&mut self, script: &str) -> Result<(), ScrapeError> {
            self.calls.push(format!("script {script}"));
            self.script.tab_selected = true;
            Ok(())
        }

        async fn open_text(&mut self, url: &str, _selector: &str) -> Result<String, ScrapeError> {
            self.calls.push(format!("open {url}"));
            tokio::time::sleep(self.script.download_delay).await;
            Ok(LOG_TEXT.to_owned())
        }

        async fn close(&mut self) -> Result<(), ScrapeError> {
            self.calls.push("close");
            Ok(())
        }
    }

    struct ScriptedFactory {
        script: Script,
        calls: Arc<Calls>,
        fail_open: bool,
    }

    impl ScriptedFactory {
        fn new(script: Script) -> Self {
            Self {
                script,
                calls: Arc::new(Calls::default()),
                fail_open: false,
            }
        }
    }

    #[async_trait]
    impl DriverFactory for ScriptedFactory {
        async fn open(&self, _target: &ScrapeTarget) -> Result<Box<dyn ConsoleDriver>, ScrapeError> {
            if self.fail_open {
                return Err(ScrapeError::Launch("no browser".to_owned()));
            }
            Ok(Box::new(ScriptedDriver {
                script: self.script.clone(),
                calls: Arc::clone(&self.calls),
                logged_in: false,
                submitted: false,
            }))
        }
    }

    fn target() -> ScrapeTarget {
        ScrapeTarget::new("studio", "10.0.0.5", "admin", "secret")
    }

    fn short_timeouts() -> SessionTimeouts {
        SessionTimeouts {
            login: Duration::from_millis(50),
            step: Duration::from_millis(200),
            unit_deadline: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn downloads_log_and_closes() {
        let factory = ScriptedFactory::new(Script::default());
        let result = scrape(&factory, &target(), &short_timeouts()).await;

        assert_eq!(result.status, ScrapeStatus::Success);
        assert_eq!(result.payload, LOG_TEXT);
        let calls = factory.calls.all();
        assert_eq!(calls.first().map(String::as_str), Some("goto http://10.0.0.5/dasdec/dasdec.csp"));
        assert!(calls.contains(&"open http://10.0.0.5/dasdec_originated_events/report0.txt".to_owned()));
        assert_eq!(calls.last().map(String::as_str), Some("close"));
    }

    #[tokio::test]
    async fn live_page_returns_markup() {
        let factory = ScriptedFactory::new(Script::default());
        let target = target().with_mode(ScrapeMode::LivePage);
        let result = scrape(&factory, &target, &short_timeouts()).await;

        assert!(result.is_success());
        assert!(result.payload.contains("Alert Events"));
        assert!(!factory.calls.contains("open "));
    }

    #[tokio::test]
    async fn rejected_login_is_auth_failure() {
        let factory = ScriptedFactory::new(Script {
            login_ok: false,
            ..Script::default()
        });
        let result = scrape(&factory, &target(), &short_timeouts()).await;

        assert_eq!(result.status, ScrapeStatus::AuthFailure);
        assert!(result.payload.starts_with("studio: "));
        assert!(factory.calls.contains("close"));
    }

    #[tokio::test]
    async fn slow_login_page_is_timeout() {
        let factory = ScriptedFactory::new(Script {
            login_delay: Duration::from_millis(300),
            ..Script::default()
        });
        let result = scrape(&factory, &target(), &short_timeouts()).await;

        assert_eq!(result.status, ScrapeStatus::Timeout);
        assert!(result.payload.contains("load-login-page"));
        assert!(factory.calls.contains("close"));
    }

    #[tokio::test]
    async fn unit_deadline_bounds_the_walk() {
        let timeouts = SessionTimeouts {
            step: Duration::from_secs(5),
            unit_deadline: Duration::from_millis(100),
            ..short_timeouts()
        };
        let factory = ScriptedFactory::new(Script {
            download_delay: Duration::from_secs(2),
            ..Script::default()
        });

        let start = Instant::now();
        let result = scrape(&factory, &target(), &timeouts).await;

        assert_eq!(result.status, ScrapeStatus::Timeout);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(factory.calls.contains("close"));
    }

    #[tokio::test]
    async fn settled_console_is_left_alone() {
        let factory = ScriptedFactory::new(Script::default());
        scrape(&factory, &target(), &short_timeouts()).await;

        assert!(!factory.calls.contains("script "));
        assert!(!factory.calls.contains(&format!("click {}", console::SUBMENU_ALL_RADIO)));
        assert!(!factory.calls.contains("select "));
    }

    #[tokio::test]
    async fn unsettled_console_is_navigated() {
        let factory = ScriptedFactory::new(Script {
            tab_selected: false,
            radio: Some(false),
            window: Some("7days".to_owned()),
            ..Script::default()
        });
        let result = scrape(&factory, &target(), &short_timeouts()).await;

        assert!(result.is_success());
        assert!(factory.calls.contains("script select_page_level"));
        assert!(factory.calls.contains(&format!("click {}", console::SUBMENU_ALL_RADIO)));
        assert!(factory.calls.contains("select 2weeks"));
    }

    #[tokio::test]
    async fn missing_controls_are_skipped() {
        let factory = ScriptedFactory::new(Script {
            radio: None,
            window: None,
            ..Script::default()
        });
        let result = scrape(&factory, &target(), &short_timeouts()).await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn missing_link_is_unknown_error() {
        let factory = ScriptedFactory::new(Script {
            report_link: false,
            ..Script::default()
        });
        let result = scrape(&factory, &target(), &short_timeouts()).await;

        assert_eq!(result.status, ScrapeStatus::UnknownError);
        assert_eq!(result.payload, "studio: download link not found");
        assert!(factory.calls.contains("close"));
    }

    #[tokio::test]
    async fn failed_open_is_unknown_error() {
        let mut factory = ScriptedFactory::new(Script::default());
        factory.fail_open = true;
        let result = scrape(&factory, &target(), &short_timeouts()).await;

        assert_eq!(result.status, ScrapeStatus::UnknownError);
        assert!(result.payload.contains("no browser"));
    }

    #[tokio::test]
    async fn credentials_are_typed_into_login_form() {
        let factory = ScriptedFactory::new(Script::default());
        scrape(&factory, &target(), &short_timeouts()).await;

        assert!(factory.calls.contains(&format!("fill {} admin", console::USERNAME_INPUT)));
        assert!(factory.calls.contains(&format!("fill {} secret", console::PASSWORD_INPUT)));
    }
}
