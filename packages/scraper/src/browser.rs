//! Headless Chromium driver over the DevTools protocol.
//!
//! Each session launches its own browser with its own profile directory,
//! so concurrent units never share cookies or tabs. The directory is
//! removed when the session closes or fails to open. HTTP basic
//! credentials ride along on every request the session's pages make.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::{Browser, BrowserConfig, Page};
use eas_ingest_models::target::ScrapeTarget;
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::{ConsoleDriver, DriverFactory, ScrapeError};

/// How to launch the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserOptions {
    /// Run without a visible window.
    pub headless: bool,
    /// Browser binary; auto-detected when `None`.
    pub chrome_executable: Option<PathBuf>,
    /// Limit for a single DevTools request.
    pub request_timeout: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_executable: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Launches one headless Chromium per session.
#[derive(Debug, Clone, Default)]
pub struct ChromeDriverFactory {
    options: BrowserOptions,
}

impl ChromeDriverFactory {
    /// Creates a factory launching browsers with `options`.
    #[must_use]
    pub const fn new(options: BrowserOptions) -> Self {
        Self { options }
    }

    fn config(&self, profile: &Path) -> Result<BrowserConfig, ScrapeError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.options.request_timeout)
            .user_data_dir(profile);
        if !self.options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.options.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(ScrapeError::Launch)
    }

    async fn launch(
        &self,
        target: &ScrapeTarget,
        profile: &Path,
    ) -> Result<ChromeDriver, ScrapeError> {
        let config = self.config(profile)?;
        let (mut browser, mut handler) = Browser::launch(config).await?;

        let unit = target.name.clone();
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    log::trace!("{unit}: browser event error: {e}");
                }
            }
        });

        let auth = basic_auth(&target.username, &target.password);
        let page = match authorized_page(&browser, &auth).await {
            Ok(page) => page,
            Err(err) => {
                shut_down(&mut browser).await;
                events.abort();
                return Err(err);
            }
        };

        Ok(ChromeDriver {
            browser,
            page,
            auth,
            events,
            profile: profile.to_path_buf(),
        })
    }
}

/// Sessions opened by this process; keeps profile directories distinct.
static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

/// Scratch profile directory for one browser session.
fn profile_dir(unit: &str) -> PathBuf {
    let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
    let slug: String = unit
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    std::env::temp_dir().join(format!(
        "eas-ingest-{}-{seq}-{slug}",
        std::process::id()
    ))
}

fn remove_profile(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => log::trace!("Removed browser profile {}", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::debug!("Could not remove browser profile {}: {e}", dir.display()),
    }
}

async fn shut_down(browser: &mut Browser) {
    if let Err(e) = browser.close().await {
        log::debug!("Browser close failed: {e}");
    }
    if let Err(e) = browser.wait().await {
        log::debug!("Browser process did not exit cleanly: {e}");
    }
}

/// `Authorization` header value for HTTP basic auth.
fn basic_auth(username: &str, password: &str) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {encoded}")
}

/// JavaScript string literal for `value`.
fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

#[async_trait]
impl DriverFactory for ChromeDriverFactory {
    async fn open(&self, target: &ScrapeTarget) -> Result<Box<dyn ConsoleDriver>, ScrapeError> {
        let profile = profile_dir(&target.name);
        match self.launch(target, &profile).await {
            Ok(driver) => {
                log::debug!("{}: browser session opened", target.name);
                Ok(Box::new(driver))
            }
            Err(err) => {
                remove_profile(&profile);
                Err(err)
            }
        }
    }
}

async fn authorized_page(browser: &Browser, auth: &str) -> Result<Page, ScrapeError> {
    let page = browser.new_page("about:blank").await?;
    let headers = Headers::new(serde_json::json!({ "Authorization": auth }));
    page.execute(SetExtraHttpHeadersParams::new(headers)).await?;
    Ok(page)
}

/// A live browser session.
struct ChromeDriver {
    browser: Browser,
    page: Page,
    auth: String,
    events: JoinHandle<()>,
    profile: PathBuf,
}

impl ChromeDriver {
    /// Evaluates `expression` and decodes its JSON-stringified result.
    async fn eval_json<T: serde::de::DeserializeOwned>(
        &self,
        expression: &str,
    ) -> Result<T, ScrapeError> {
        let json: String = self
            .page
            .evaluate(format!("JSON.stringify({expression})"))
            .await?
            .into_value()?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[async_trait]
impl ConsoleDriver for ChromeDriver {
    async fn goto(&mut self, url: &str) -> Result<(), ScrapeError> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn content(&mut self) -> Result<String, ScrapeError> {
        Ok(self.page.content().await?)
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), ScrapeError> {
        self.page
            .find_element(selector)
            .await?
            .click()
            .await?
            .type_str(value)
            .await?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), ScrapeError> {
        self.page.find_element(selector).await?.click().await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn is_checked(&mut self, selector: &str) -> Result<Option<bool>, ScrapeError> {
        self.eval_json(&format!(
            "document.querySelector({})?.checked ?? null",
            js_string(selector)
        ))
        .await
    }

    async fn selected_value(&mut self, selector: &str) -> Result<Option<String>, ScrapeError> {
        self.eval_json(&format!(
            "document.querySelector({})?.value ?? null",
            js_string(selector)
        ))
        .await
    }

    async fn select_value(&mut self, selector: &str, value: &str) -> Result<(), ScrapeError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); el.value = {}; \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); }})()",
            js_string(selector),
            js_string(value)
        );
        self.page.evaluate(script).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn run_script(&mut self, script: &str) -> Result<(), ScrapeError> {
        self.page.evaluate(script).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn open_text(&mut self, url: &str, selector: &str) -> Result<String, ScrapeError> {
        let tab = authorized_page(&self.browser, &self.auth).await?;
        tab.goto(url).await?;
        let text = tab
            .find_element(selector)
            .await?
            .inner_text()
            .await?
            .unwrap_or_default();
        tab.close().await?;
        Ok(text)
    }

    async fn close(&mut self) -> Result<(), ScrapeError> {
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            log::debug!("Browser process did not exit cleanly: {e}");
        }
        self.events.abort();
        remove_profile(&self.profile);
        closed?;
        Ok(())
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        self.events.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_header() {
        assert_eq!(basic_auth("admin", "secret"), "Basic YWRtaW46c2VjcmV0");
    }

    #[test]
    fn js_strings_are_quoted() {
        assert_eq!(
            js_string(r#"select[name="AlertRange"]"#),
            r#""select[name=\"AlertRange\"]""#
        );
    }

    #[test]
    fn profile_dirs_are_per_unit() {
        let a = profile_dir("studio a");
        let b = profile_dir("studio/b");
        assert_ne!(a, b);
        assert!(a.to_string_lossy().ends_with("studio_a"));
        assert!(b.to_string_lossy().ends_with("studio_b"));
    }

    #[test]
    fn names_differing_in_punctuation_get_distinct_profiles() {
        assert_ne!(profile_dir("Studio A"), profile_dir("Studio-A"));
        assert_ne!(profile_dir("studio"), profile_dir("studio"));
    }

    #[test]
    fn profile_removal_tolerates_missing_dir() {
        let dir = profile_dir("removal");
        std::fs::create_dir_all(dir.join("Default")).unwrap();
        std::fs::write(dir.join("Default").join("Cookies"), b"").unwrap();

        remove_profile(&dir);
        assert!(!dir.exists());

        remove_profile(&dir);
    }
}
