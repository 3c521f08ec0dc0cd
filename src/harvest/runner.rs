//! The harvesting loop: one browser session driven over time, with two
//! independent termination ceilings and append-only persistence of every
//! delta. Fatal errors exist only before the loop starts (session
//! acquisition, target navigation); everything that fails inside the loop
//! merely degrades completeness.

use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::config;
use crate::harvest::extract::extract_identifiers;
use crate::harvest::locator;
use crate::harvest::ordering;
use crate::harvest::store::{ContactRecord, ResultStore};
use crate::scraping::browser::{
    press_enter, scroll_by, surface_text, wait_for_selector, BrowserSession,
};

const LOGIN_URL: &str = "https://www.linkedin.com/login";
const LOGIN_INDICATOR: &str = "header";
const LOGIN_INDICATOR_TIMEOUT: Duration = Duration::from_secs(10);

/// Settle after the initial target navigation.
const PAGE_SETTLE: Duration = Duration::from_millis(2000);
/// Settle between lazy-load triggering and the candidate scan.
const ITERATION_SETTLE: Duration = Duration::from_millis(1000);
/// Settle after a load-more click revealed new content.
const LOAD_MORE_SETTLE: Duration = Duration::from_millis(1200);
/// Settle before the final post-loop scan pass.
const FINAL_PASS_SETTLE: Duration = Duration::from_millis(700);

const SCROLL_STEP_PX: u32 = 800;
const SCROLL_STEP_PAUSE: Duration = Duration::from_millis(250);
const MAX_BUTTON_SCAN: usize = 60;

/// Sign-in credentials. Both fields are required for the best-effort login
/// sequence to run at all.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Immutable per-run parameters.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub headless: bool,
    /// Bounds every individual navigation / query / click.
    pub timeout: Duration,
    /// Hard wall-clock ceiling for the whole run.
    pub max_run_duration: Duration,
    /// Maximum time without a new record before the loop concludes.
    pub inactivity_timeout: Duration,
    /// Programmatic scroll advances per iteration.
    pub scroll_steps: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            headless: config::headless(),
            timeout: config::action_timeout(),
            max_run_duration: config::max_run_duration(),
            inactivity_timeout: config::inactivity_timeout(),
            scroll_steps: config::scroll_steps(),
        }
    }
}

/// The only errors that cross the run boundary; everything else is absorbed.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("browser session unavailable: {0}")]
    SessionAcquisition(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
}

/// Why the iteration loop concluded. All of these are success exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Inactivity,
    MaxDuration,
    Cancelled,
}

/// Evaluate both termination predicates. Inactivity is checked first so a
/// stalled run concludes as soon as its progress window closes, even when the
/// wall-clock ceiling is also past due.
pub fn should_stop(
    now: Instant,
    started_at: Instant,
    last_progress_at: Instant,
    config: &HarvestConfig,
) -> Option<StopReason> {
    if now.saturating_duration_since(last_progress_at) >= config.inactivity_timeout {
        return Some(StopReason::Inactivity);
    }
    if now.saturating_duration_since(started_at) >= config.max_run_duration {
        return Some(StopReason::MaxDuration);
    }
    None
}

/// Mutable state of one harvesting invocation. Created at run start, owned
/// exclusively by that invocation, and never shared across runs.
pub struct RunState {
    pub run_id: String,
    pub started_at: Instant,
    pub last_progress_at: Instant,
    pub store: ResultStore,
}

impl RunState {
    fn new(run_id: &str, started_at: Instant, sink: PathBuf) -> Self {
        Self {
            run_id: run_id.to_string(),
            started_at,
            last_progress_at: started_at,
            store: ResultStore::new(sink),
        }
    }
}

/// Snapshot returned to the caller on every exit path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub identifiers_found: usize,
    pub elapsed_seconds: f64,
    pub result_location: String,
    pub finished_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub records: Vec<ContactRecord>,
}

impl RunReport {
    fn failed(run_id: &str, sink: &Path, error: HarvestError) -> Self {
        Self {
            run_id: run_id.to_string(),
            identifiers_found: 0,
            elapsed_seconds: 0.0,
            result_location: sink.display().to_string(),
            finished_at: chrono::Utc::now().to_rfc3339(),
            error: Some(error.to_string()),
            records: Vec::new(),
        }
    }

    fn finished(run_id: &str, sink: &Path, elapsed: Duration, records: Vec<ContactRecord>) -> Self {
        Self {
            run_id: run_id.to_string(),
            identifiers_found: records.len(),
            elapsed_seconds: round2(elapsed.as_secs_f64()),
            result_location: sink.display().to_string(),
            finished_at: chrono::Utc::now().to_rfc3339(),
            error: None,
            records,
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Filesystem-safe run id: anything outside `[A-Za-z0-9._-]` becomes `_`.
pub fn sanitize_run_id(run_id: &str) -> String {
    run_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Flat per-run sink: `<results_dir>/<run_id>.txt`.
pub fn sink_path(results_dir: &Path, run_id: &str) -> PathBuf {
    results_dir.join(format!("{}.txt", sanitize_run_id(run_id)))
}

/// Run one harvest invocation end to end.
///
/// Never panics and never returns an error type: fatal pre-loop failures are
/// reported through `RunReport::error`, and the browser session is released
/// on every exit path.
pub async fn harvest(
    run_id: &str,
    target_url: &str,
    config: &HarvestConfig,
    credentials: Option<&Credentials>,
    results_dir: &Path,
    cancel: &CancellationToken,
) -> RunReport {
    let started = Instant::now();
    let sink = sink_path(results_dir, run_id);
    // A fresh RunState per invocation: nothing is shared with other runs.
    let mut state = RunState::new(run_id, started, sink.clone());

    info!(run_id, target_url, "starting harvest run");

    let session = match BrowserSession::launch(config.headless, config.timeout).await {
        Ok(session) => session,
        Err(e) => {
            error!(run_id, "session acquisition failed: {}", e);
            return RunReport::failed(
                run_id,
                &sink,
                HarvestError::SessionAcquisition(e.to_string()),
            );
        }
    };

    match credentials {
        Some(creds) => login(&session, creds).await,
        None => info!("no credentials provided; proceeding anonymously"),
    }

    if let Err(e) = session.goto(target_url).await {
        error!(run_id, "failed to open target url: {}", e);
        let report = RunReport::failed(
            run_id,
            &sink,
            HarvestError::Navigation {
                url: target_url.to_string(),
                reason: e.to_string(),
            },
        );
        session.close().await;
        return report;
    }

    tokio::time::sleep(PAGE_SETTLE).await;

    // Best-effort: the outcome is informational, never fatal.
    if !ordering::try_set_most_recent(session.page()).await {
        warn!(run_id, "could not confirm most-recent ordering — continuing anyway");
    }

    let stop = loop {
        if cancel.is_cancelled() {
            break StopReason::Cancelled;
        }
        if let Some(reason) = should_stop(
            Instant::now(),
            state.started_at,
            state.last_progress_at,
            config,
        ) {
            break reason;
        }

        trigger_lazy_load(session.page(), config).await;
        tokio::time::sleep(ITERATION_SETTLE).await;

        let batch = collect_batch(session.page()).await;
        let added = state.store.absorb(batch);
        if added > 0 {
            if let Err(e) = state.store.flush().await {
                warn!(run_id, "delta flush failed: {}", e);
            }
            state.last_progress_at = Instant::now();
            info!(run_id, new = added, total = state.store.len(), "new records found");
        }
    };
    info!(run_id, reason = ?stop, "harvest loop concluded");

    // One last pass for content that rendered just before the stop decision.
    tokio::time::sleep(FINAL_PASS_SETTLE).await;
    let added = state.store.absorb(collect_batch(session.page()).await);
    if added > 0 {
        info!(run_id, new = added, "final pass found additional records");
    }
    if let Err(e) = state.store.flush().await {
        warn!(run_id, "final flush failed: {}", e);
    }

    session.close().await;

    RunReport::finished(run_id, &sink, started.elapsed(), state.store.snapshot())
}

/// Best-effort sign-in. Every failure here is logged and swallowed; the run
/// proceeds to the target either way.
async fn login(session: &BrowserSession, creds: &Credentials) {
    info!("attempting sign-in with provided credentials");
    if let Err(e) = session.goto(LOGIN_URL).await {
        warn!("login surface unreachable: {} — continuing anonymously", e);
        return;
    }
    let page = session.page();

    let filled = fill_credentials(page, "input#username", "input#password", creds).await
        || fill_credentials(
            page,
            "input[name='session_key']",
            "input[name='session_password']",
            creds,
        )
        .await;
    if !filled {
        warn!("credential fields not found — skipping sign-in");
        return;
    }

    if let Err(e) = press_enter(page).await {
        warn!("login submit failed: {}", e);
        return;
    }

    if wait_for_selector(page, LOGIN_INDICATOR, LOGIN_INDICATOR_TIMEOUT).await {
        info!("login step completed (post-login indicator found)");
    } else {
        warn!("login may have failed or took too long");
    }
}

async fn fill_credentials(
    page: &Page,
    username_selector: &str,
    password_selector: &str,
    creds: &Credentials,
) -> bool {
    let Ok(username) = page.find_element(username_selector).await else {
        return false;
    };
    let Ok(password) = page.find_element(password_selector).await else {
        return false;
    };

    let filled = async {
        username.click().await?;
        username.type_str(&creds.username).await?;
        password.click().await?;
        password.type_str(&creds.password).await?;
        anyhow::Ok(())
    }
    .await;

    match filled {
        Ok(()) => true,
        Err(e) => {
            debug!("credential fill failed ({username_selector}): {e}");
            false
        }
    }
}

/// Reveal more content: scroll advances, then a best-effort click of any
/// control whose text mentions both "more" and "comment". Every trigger
/// failure is caught and ignored.
async fn trigger_lazy_load(page: &Page, config: &HarvestConfig) {
    for _ in 0..config.scroll_steps {
        if let Err(e) = scroll_by(page, SCROLL_STEP_PX).await {
            debug!("scroll advance failed: {}", e);
        }
        tokio::time::sleep(SCROLL_STEP_PAUSE).await;
    }

    let Ok(buttons) = page.find_elements("button").await else {
        return;
    };
    for button in buttons.into_iter().take(MAX_BUTTON_SCAN) {
        let Ok(Some(text)) = button.inner_text().await else {
            continue;
        };
        let text = text.to_ascii_lowercase();
        if text.contains("more") && text.contains("comment") {
            match button.click().await {
                Ok(_) => {
                    info!("clicked a load-more-comments control");
                    tokio::time::sleep(LOAD_MORE_SETTLE).await;
                }
                Err(e) => debug!("load-more click failed: {}", e),
            }
        }
    }
}

/// One scan pass: locator cascade, per-candidate extraction, and, only when
/// the structured path produced nothing, the whole-surface fallback, whose
/// records carry the unknown-name sentinel.
async fn collect_batch(page: &Page) -> Vec<ContactRecord> {
    let mut records = Vec::new();

    let handles = locator::locate_candidates(page).await;
    for handle in &handles {
        let Some(candidate) = locator::resolve_candidate(handle).await else {
            continue;
        };
        for identifier in extract_identifiers(&candidate.body) {
            records.push(ContactRecord::new(candidate.name.clone(), identifier));
        }
    }

    if records.is_empty() {
        if let Some(text) = surface_text(page).await {
            for identifier in extract_identifiers(&text) {
                records.push(ContactRecord::new(None, identifier));
            }
        }
    }

    records
}
