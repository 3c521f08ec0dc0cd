//! Native browser sessions using `chromiumoxide`.
//!
//! This module is the single source of truth for:
//! * Finding a usable browser executable (Chrome → Chromium → Brave, cross-platform).
//! * Building the headless `BrowserConfig` for a harvest run.
//! * [`BrowserSession`]: one dedicated browser process per run, opened at run
//!   start and released exactly once on every exit path.
//! * Low-level page primitives the harvest loop builds on: whole-surface text
//!   read-out, programmatic scrolling, raw key dispatch, bounded selector waits.
//!
//! No headless-browser sidecar is required; everything speaks CDP directly.

use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// ── Realistic User-Agent pool ────────────────────────────────────────────────

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Edge 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// Returns a randomly-chosen realistic desktop User-Agent string.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = crate::core::config::chrome_executable_override() {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
            "brave",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/brave-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Session errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no browser found — install Chrome, Chromium, or Brave, or set CHROME_EXECUTABLE")]
    BrowserNotFound,

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("failed to open tab: {0}")]
    TabOpen(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("navigation timed out after {0:?}")]
    NavigationTimeout(Duration),
}

// ── Headless browser config builder ──────────────────────────────────────────

/// Build a `BrowserConfig` for a harvest session.
///
/// Flags chosen for compatibility with CI / restricted environments
/// (`--no-sandbox`, `--disable-dev-shm-usage`) and for suppressing the
/// `navigator.webdriver` automation fingerprint. `action_timeout` becomes the
/// CDP request timeout, so every individual query/click is bounded by it.
pub fn build_session_config(
    exe: &str,
    headless: bool,
    action_timeout: Duration,
    width: u32,
    height: u32,
) -> Result<BrowserConfig> {
    let ua = random_user_agent();

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .request_timeout(action_timeout)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-gpu")
        .arg("--no-sandbox") // often required in CI / restricted environments
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage") // avoids /dev/shm OOM in constrained environments
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", ua));

    if !headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── Session lifecycle ────────────────────────────────────────────────────────

/// One browser process, one page, exclusively owned by a single harvest run.
///
/// `close()` releases the process explicitly; `Drop` is the backstop that
/// spawns a best-effort close if a session is ever abandoned mid-run, so no
/// exit path can leak a Chromium process.
pub struct BrowserSession {
    browser: Option<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    action_timeout: Duration,
}

impl BrowserSession {
    /// Discover an executable, launch the browser, and open a blank tab.
    pub async fn launch(headless: bool, action_timeout: Duration) -> Result<Self, SessionError> {
        let exe = find_chrome_executable().ok_or(SessionError::BrowserNotFound)?;
        debug!(exe = %exe, headless, "launching browser session");

        let config = build_session_config(&exe, headless, action_timeout, 1280, 900)
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Launch(format!("{}: {}", exe, e)))?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::TabOpen(e.to_string()))?;

        Ok(Self {
            browser: Some(browser),
            page,
            handler: handle,
            action_timeout,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Navigate the session's page, bounded by the per-action timeout.
    pub async fn goto(&self, url: &str) -> Result<(), SessionError> {
        match tokio::time::timeout(self.action_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Navigation(e.to_string())),
            Err(_) => Err(SessionError::NavigationTimeout(self.action_timeout)),
        }
    }

    /// Release the browser process. Best-effort: a close error is logged,
    /// never surfaced.
    pub async fn close(mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("browser close error (non-fatal): {}", e);
            }
        }
        self.handler.abort();
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Drop cannot await; if we're inside a tokio runtime, spawn a task to
        // close the browser to avoid zombie Chromium processes.
        self.handler.abort();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if let Some(mut browser) = self.browser.take() {
            handle.spawn(async move {
                let _ = browser.close().await;
            });
        }
    }
}

// ── Page primitives ──────────────────────────────────────────────────────────

/// Full visible text of the document body, or `None` when it cannot be read.
pub async fn surface_text(page: &Page) -> Option<String> {
    page.evaluate("document.body ? document.body.innerText : ''")
        .await
        .ok()
        .and_then(|v| v.into_value::<String>().ok())
        .filter(|t| !t.trim().is_empty())
}

/// Text of the currently focused element, empty when nothing is focused.
pub async fn focused_text(page: &Page) -> String {
    page.evaluate("document.activeElement ? (document.activeElement.innerText || '') : ''")
        .await
        .ok()
        .and_then(|v| v.into_value::<String>().ok())
        .unwrap_or_default()
}

/// Programmatic vertical scroll advance.
pub async fn scroll_by(page: &Page, delta_y: u32) -> Result<()> {
    page.evaluate(format!("window.scrollBy(0, {});", delta_y))
        .await
        .map_err(|e| anyhow!("scroll failed: {}", e))?;
    Ok(())
}

/// Dispatch a raw key down/up pair to the page, independent of any element
/// handle. Used for focus-walk (`Tab`) and submit (`Enter`) keys.
pub async fn press_page_key(page: &Page, key: &str, code: &str, key_code: i64) -> Result<()> {
    let down = DispatchKeyEventParams::builder()
        .r#type(DispatchKeyEventType::RawKeyDown)
        .key(key)
        .code(code)
        .windows_virtual_key_code(key_code)
        .native_virtual_key_code(key_code)
        .build()
        .map_err(|e| anyhow!("key event build error: {}", e))?;
    page.execute(down).await?;

    let up = DispatchKeyEventParams::builder()
        .r#type(DispatchKeyEventType::KeyUp)
        .key(key)
        .code(code)
        .windows_virtual_key_code(key_code)
        .native_virtual_key_code(key_code)
        .build()
        .map_err(|e| anyhow!("key event build error: {}", e))?;
    page.execute(up).await?;
    Ok(())
}

pub async fn press_tab(page: &Page) -> Result<()> {
    press_page_key(page, "Tab", "Tab", 9).await
}

pub async fn press_enter(page: &Page) -> Result<()> {
    press_page_key(page, "Enter", "Enter", 13).await
}

/// Poll for `selector` until it resolves or `timeout` elapses.
/// Returns `true` when the element appeared in time.
pub async fn wait_for_selector(page: &Page, selector: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if page.find_element(selector).await.is_ok() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_pool_is_never_empty() {
        let ua = random_user_agent();
        assert!(ua.contains("Mozilla/5.0"));
    }

    #[test]
    fn session_errors_render_reasonably() {
        let e = SessionError::BrowserNotFound;
        assert!(e.to_string().contains("CHROME_EXECUTABLE"));
        let t = SessionError::NavigationTimeout(Duration::from_secs(30));
        assert!(t.to_string().contains("30"));
    }
}
