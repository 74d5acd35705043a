use std::path::{Path, PathBuf};

use chromiumoxide::browser::{BrowserConfig, HeadlessMode};
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use serde::Serialize;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::browser::jitter::pace;
use crate::error::{AgentError, Result};
use crate::trace::writer::ActionLogger;
use crate::trace::{Metadata, metadata};

pub mod jitter;

/// Marker attribute used to hand a text-located element over from the JS
/// probe to a CDP element handle. Removed again before the click lands.
const MARK_ATTRIBUTE: &str = "data-patron-target";

/// Elements considered when locating a click target by visible text.
const TEXT_TARGETS: &str =
    "a, button, span, label, [role='button'], [role='menuitem'], [role='option']";

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub headless: bool,
    pub width: u32,
    pub height: u32,
    pub no_sandbox: bool,
    pub snapshot_dir: PathBuf,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            headless: true,
            width: 1280,
            height: 900,
            no_sandbox: false,
            snapshot_dir: PathBuf::from("data").join("snapshots"),
        }
    }
}

/// Point-in-time capture of a page's rendered markup, persisted to disk.
#[derive(Debug, Clone, Serialize)]
pub struct DomSnapshot {
    pub url: String,
    pub html_path: PathBuf,
}

/// One scripted automation session: engine, a single page, and the action
/// logger every interaction reports to. Constructed inert; [`Session::open`]
/// launches the engine and [`Session::close`] tears it down. Interactions
/// outside that window fail with [`AgentError::NotInitialized`].
pub struct Session {
    options: SessionOptions,
    logger: ActionLogger,
    active: Option<ActiveSession>,
}

struct ActiveSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    // Holds the profile directory alive for the lifetime of the engine.
    _user_data_dir: TempDir,
}

impl Session {
    pub fn new(options: SessionOptions, logger: ActionLogger) -> Self {
        Session {
            options,
            logger,
            active: None,
        }
    }

    /// Launch the engine and acquire the session's single page.
    pub async fn open(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Ok(());
        }
        let user_data_dir = TempDir::new()?;
        let config = session_config(&self.options, user_data_dir.path())?;
        let (browser, mut cdp_handler) = Browser::launch(config).await?;
        let handler =
            tokio::spawn(async move { while cdp_handler.next().await.is_some() {} });
        let page = browser.new_page("about:blank").await?;
        self.active = Some(ActiveSession {
            browser,
            handler,
            page,
            _user_data_dir: user_data_dir,
        });
        Ok(())
    }

    /// Tear down page, then engine. Every step is attempted even when an
    /// earlier one fails, so a broken page cannot leak the Chrome process.
    /// A second close is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        let ActiveSession {
            mut browser,
            handler,
            page,
            _user_data_dir,
        } = active;
        let page_closed = page.close().await;
        let browser_closed = browser.close().await;
        handler.abort();
        page_closed?;
        browser_closed?;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    fn page(&self) -> Result<&Page> {
        self.active
            .as_ref()
            .map(|active| &active.page)
            .ok_or(AgentError::NotInitialized)
    }

    pub async fn current_url(&self) -> String {
        let Ok(page) = self.page() else {
            return String::new();
        };
        page.url().await.ok().flatten().unwrap_or_default()
    }

    /// Navigate, wait for the load to settle, pause like a human would, and
    /// log the navigation.
    pub async fn goto(&self, url: &str) -> Result<()> {
        let page = self.page()?;
        page.goto(url).await?;
        page.wait_for_navigation().await?;
        pace(0.5, 0.5).await;
        self.logger.record("navigate", url, Metadata::new()).await;
        Ok(())
    }

    /// Click the first visible element whose text contains `text`.
    pub async fn click_text(&self, text: &str) -> Result<()> {
        self.click_matching_text(text).await?;
        let url = self.current_url().await;
        self.logger
            .record("click", &url, metadata([("text", text)]))
            .await;
        Ok(())
    }

    /// Same location and click as [`Session::click_text`], but logged as a
    /// banner dismissal.
    pub async fn dismiss_text(&self, label: &str) -> Result<()> {
        self.click_matching_text(label).await?;
        let url = self.current_url().await;
        self.logger
            .record("dismiss", &url, metadata([("label", label)]))
            .await;
        Ok(())
    }

    /// Fill a form field identified by a CSS selector.
    pub async fn fill_form(&self, selector: &str, value: &str) -> Result<()> {
        let page = self.page()?;
        let element = page
            .find_element(selector)
            .await
            .map_err(|_| AgentError::ElementNotFound(selector.to_string()))?;
        element.click().await?;
        element.type_str(value).await?;
        pace(jitter::DEFAULT_BASE_SECONDS, jitter::DEFAULT_VARIANCE_SECONDS).await;
        let url = self.current_url().await;
        self.logger
            .record("fill", &url, metadata([("selector", selector)]))
            .await;
        Ok(())
    }

    /// Click an element identified by a CSS selector.
    pub async fn click_selector(&self, selector: &str) -> Result<()> {
        let page = self.page()?;
        let element = page
            .find_element(selector)
            .await
            .map_err(|_| AgentError::ElementNotFound(selector.to_string()))?;
        let _ = element.scroll_into_view().await;
        pace(jitter::DEFAULT_BASE_SECONDS, jitter::DEFAULT_VARIANCE_SECONDS).await;
        element.click().await?;
        let url = self.current_url().await;
        self.logger
            .record("click", &url, metadata([("selector", selector)]))
            .await;
        Ok(())
    }

    /// Whether any visible element's text contains `text`. Never logs.
    pub async fn is_visible_text(&self, text: &str) -> Result<bool> {
        let page = self.page()?;
        let script = format!(
            r#"(() => {{
                const needle = {needle};
                for (const el of document.querySelectorAll({targets})) {{
                    const content = (el.textContent || '').trim();
                    if (!content.includes(needle)) continue;
                    if (is_shown(el)) return true;
                }}
                return false;
                function is_shown(el) {{
                    const rect = el.getBoundingClientRect();
                    const style = window.getComputedStyle(el);
                    return rect.width > 0 && rect.height > 0
                        && style.visibility !== 'hidden' && style.display !== 'none';
                }}
            }})()"#,
            needle = js_string(text)?,
            targets = js_string(TEXT_TARGETS)?,
        );
        let found = page
            .evaluate(script)
            .await?
            .value()
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        Ok(found)
    }

    /// Whether the CSS selector matches a visible element. Never logs.
    pub async fn is_visible(&self, selector: &str) -> Result<bool> {
        let page = self.page()?;
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                const rect = el.getBoundingClientRect();
                const style = window.getComputedStyle(el);
                return rect.width > 0 && rect.height > 0
                    && style.visibility !== 'hidden' && style.display !== 'none';
            }})()"#,
            selector = js_string(selector)?,
        );
        let visible = page
            .evaluate(script)
            .await?
            .value()
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        Ok(visible)
    }

    /// Serialize the page's rendered HTML to `<snapshot_dir>/<name>.html`.
    pub async fn snapshot_dom(&self, name: &str) -> Result<DomSnapshot> {
        let page = self.page()?;
        tokio::fs::create_dir_all(&self.options.snapshot_dir).await?;
        let html_path = self.options.snapshot_dir.join(format!("{name}.html"));
        let html = page.content().await?;
        tokio::fs::write(&html_path, &html).await?;
        let url = self.current_url().await;
        self.logger
            .record("snapshot", &url, metadata([("path", html_path.as_path())]))
            .await;
        Ok(DomSnapshot { url, html_path })
    }

    /// Persist cookies and localStorage as a JSON blob at `path`.
    pub async fn save_storage(&self, path: &Path) -> Result<()> {
        let page = self.page()?;
        let cookies = serde_json::to_value(page.get_cookies().await?)?;
        let local_storage = page
            .evaluate(
                r#"(() => {
                    const entries = {};
                    for (let i = 0; i < localStorage.length; i += 1) {
                        const key = localStorage.key(i);
                        entries[key] = localStorage.getItem(key);
                    }
                    return entries;
                })()"#,
            )
            .await?
            .value()
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));
        let state = serde_json::json!({
            "cookies": cookies,
            "local_storage": local_storage,
        });
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_string(&state)?).await?;
        let url = self.current_url().await;
        self.logger
            .record("save_storage", &url, metadata([("path", path)]))
            .await;
        Ok(())
    }

    /// All outbound link targets (`a[href]`) on the current page.
    pub async fn links(&self) -> Result<Vec<String>> {
        let page = self.page()?;
        let value = page
            .evaluate(
                "Array.from(document.querySelectorAll('a[href]'))
                    .map((el) => el.href)
                    .filter(Boolean)",
            )
            .await?
            .value()
            .cloned()
            .unwrap_or_else(|| serde_json::json!([]));
        Ok(serde_json::from_value(value)?)
    }

    async fn click_matching_text(&self, text: &str) -> Result<()> {
        let page = self.page()?;
        let script = format!(
            r#"(() => {{
                const needle = {needle};
                for (const el of document.querySelectorAll('[{mark}]')) {{
                    el.removeAttribute('{mark}');
                }}
                for (const el of document.querySelectorAll({targets})) {{
                    const content = (el.textContent || '').trim();
                    if (!content.includes(needle)) continue;
                    const rect = el.getBoundingClientRect();
                    const style = window.getComputedStyle(el);
                    if (rect.width === 0 || rect.height === 0) continue;
                    if (style.visibility === 'hidden' || style.display === 'none') continue;
                    el.setAttribute('{mark}', '1');
                    return true;
                }}
                return false;
            }})()"#,
            needle = js_string(text)?,
            targets = js_string(TEXT_TARGETS)?,
            mark = MARK_ATTRIBUTE,
        );
        let found = page
            .evaluate(script)
            .await?
            .value()
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        if !found {
            return Err(AgentError::ElementNotFound(text.to_string()));
        }
        let element = page
            .find_element(format!("[{MARK_ATTRIBUTE}]"))
            .await
            .map_err(|_| AgentError::ElementNotFound(text.to_string()))?;
        // Unmark before clicking so the attribute never shows up in snapshots
        // taken after a click-triggered navigation.
        page.evaluate(format!(
            r#"document.querySelectorAll('[{MARK_ATTRIBUTE}]')
                .forEach((el) => el.removeAttribute('{MARK_ATTRIBUTE}'))"#
        ))
        .await?;
        let _ = element.scroll_into_view().await;
        pace(jitter::DEFAULT_BASE_SECONDS, jitter::DEFAULT_VARIANCE_SECONDS).await;
        element.click().await?;
        Ok(())
    }
}

fn js_string(value: &str) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn session_config(
    options: &SessionOptions,
    user_data_dir: &Path,
) -> Result<BrowserConfig> {
    let apply_sandbox = |builder: chromiumoxide::browser::BrowserConfigBuilder| {
        if options.no_sandbox {
            builder
                .no_sandbox()
                .args(["--disable-setuid-sandbox", "--disable-dev-shm-usage"])
        } else {
            builder
        }
    };
    apply_sandbox(BrowserConfig::builder())
        .headless_mode(if options.headless {
            HeadlessMode::New
        } else {
            HeadlessMode::False
        })
        .window_size(options.width, options.height)
        .user_data_dir(user_data_dir)
        .build()
        .map_err(AgentError::Configuration)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inert_session() -> Session {
        let logger = ActionLogger::new(
            PathBuf::from("data").join("actions.log"),
            Box::new(std::io::sink()),
        );
        Session::new(SessionOptions::default(), logger)
    }

    #[tokio::test]
    async fn interactions_before_open_are_rejected() {
        let session = inert_session();
        assert!(matches!(
            session.goto("http://localhost/").await,
            Err(AgentError::NotInitialized)
        ));
        assert!(matches!(
            session.click_text("Login").await,
            Err(AgentError::NotInitialized)
        ));
        assert!(matches!(
            session.fill_form("#email", "x@example.com").await,
            Err(AgentError::NotInitialized)
        ));
        assert!(matches!(
            session.snapshot_dom("landing").await,
            Err(AgentError::NotInitialized)
        ));
        assert!(matches!(
            session.save_storage(Path::new("data/storage.json")).await,
            Err(AgentError::NotInitialized)
        ));
        assert!(matches!(
            session.links().await,
            Err(AgentError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn close_on_an_inert_session_is_a_no_op() {
        let mut session = inert_session();
        assert!(!session.is_open());
        session.close().await.unwrap();
        // Still rejects interactions afterwards.
        assert!(matches!(
            session.goto("http://localhost/").await,
            Err(AgentError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn current_url_is_empty_outside_a_session() {
        let session = inert_session();
        assert_eq!(session.current_url().await, "");
    }
}
