use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Env-var configuration. Every knob has a default; requests may override the
// per-run values on top of these.
// ---------------------------------------------------------------------------

pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_RESULTS_DIR: &str = "THREADSCOUT_RESULTS_DIR";
pub const ENV_HEADLESS: &str = "THREADSCOUT_HEADLESS";
pub const ENV_ACTION_TIMEOUT_SECS: &str = "THREADSCOUT_ACTION_TIMEOUT_SECS";
pub const ENV_MAX_RUN_SECS: &str = "THREADSCOUT_MAX_RUN_SECS";
pub const ENV_INACTIVITY_SECS: &str = "THREADSCOUT_INACTIVITY_SECS";
pub const ENV_SCROLL_STEPS: &str = "THREADSCOUT_SCROLL_STEPS";
pub const ENV_RUN_LIMIT: &str = "THREADSCOUT_RUN_LIMIT";

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

/// Directory the per-run result sinks are written under.
pub fn results_dir() -> PathBuf {
    match std::env::var(ENV_RESULTS_DIR) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => PathBuf::from("results"),
    }
}

/// Optional override for the Chromium-family browser executable.
///
/// Default behavior is auto-discovery (see `scraping::browser::find_chrome_executable()`).
/// This function only returns a value when `CHROME_EXECUTABLE` is set to an existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}

/// Whether browser sessions run headless. Default: enabled.
/// Set `THREADSCOUT_HEADLESS=0` (or `false`/`no`) to watch the session live.
pub fn headless() -> bool {
    let Ok(v) = std::env::var(ENV_HEADLESS) else {
        return true;
    };
    let v = v.trim().to_ascii_lowercase();
    if v.is_empty() {
        return true;
    }
    !matches!(v.as_str(), "0" | "false" | "no" | "off" | "disabled")
}

/// Per-action timeout: bounds every navigation, element query and click.
pub fn action_timeout() -> Duration {
    Duration::from_secs(env_u64(ENV_ACTION_TIMEOUT_SECS, 30))
}

/// Hard wall-clock ceiling for a single run.
pub fn max_run_duration() -> Duration {
    Duration::from_secs(env_u64(ENV_MAX_RUN_SECS, 300))
}

/// Maximum time without a new record before the loop concludes.
pub fn inactivity_timeout() -> Duration {
    Duration::from_secs(env_u64(ENV_INACTIVITY_SECS, 90))
}

/// Programmatic scroll advances performed per loop iteration.
pub fn scroll_steps() -> u32 {
    env_u64(ENV_SCROLL_STEPS, 2).min(32) as u32
}

/// Maximum concurrent harvest runs (each owns a dedicated browser process).
pub fn run_limit() -> usize {
    env_u64(ENV_RUN_LIMIT, 2).clamp(1, 16) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_without_env() {
        // These keys are unset in the test environment.
        assert_eq!(action_timeout(), Duration::from_secs(30));
        assert_eq!(max_run_duration(), Duration::from_secs(300));
        assert_eq!(inactivity_timeout(), Duration::from_secs(90));
        assert_eq!(scroll_steps(), 2);
        assert!(headless());
    }

    #[test]
    fn results_dir_defaults_relative() {
        assert_eq!(results_dir(), PathBuf::from("results"));
    }
}
