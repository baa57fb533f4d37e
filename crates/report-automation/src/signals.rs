use anyhow::Context;
use chromiumoxide::cdp::browser_protocol::target::TargetId;
use chromiumoxide::{Browser, Page};
use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::AutomationError;

/// How often the race probes re-check their conditions.
const PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Polls `probe` until it yields a value or the deadline passes. The
/// general "wait for one of several signals" primitive: a probe checks all
/// of its signals each round and returns the first that fired.
///
/// The probe runs at least once even with a zero timeout, so an
/// already-satisfied condition is never reported as a miss.
pub async fn first_signal<T, F, Fut>(timeout: Duration, interval: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = Instant::now();
    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }
        if start.elapsed() >= timeout {
            return None;
        }
        sleep(interval).await;
    }
}

/// The page a hop resolved to, and how it got there.
pub struct HopOutcome {
    pub page: Page,
    pub opened_new_tab: bool,
}

/// Snapshot of the targets open before a click, so a hop can tell new tabs
/// from pre-existing ones.
pub async fn baseline_targets(browser: &Browser) -> anyhow::Result<HashSet<TargetId>> {
    let pages = browser
        .pages()
        .await
        .context("Failed to list browser targets for hop baseline")?;
    Ok(pages.iter().map(|p| p.target_id().clone()).collect())
}

/// Resolves the click that may open a new tab *or* navigate in place.
///
/// Races two outcomes: (a) a target not present in `baseline` appears, or
/// (b) the origin page's URL now matches `url_pattern`. Whichever fires
/// first wins; neither within `timeout` is a `Timeout` for `stage`.
/// The portal does not guarantee which behavior it uses, so neither can we.
pub async fn resolve_hop(
    browser: &Browser,
    origin: &Page,
    baseline: &HashSet<TargetId>,
    url_pattern: &str,
    timeout: Duration,
    stage: &str,
) -> Result<HopOutcome, AutomationError> {
    let outcome = first_signal(timeout, PROBE_INTERVAL, || async move {
        // New tab wins the race as soon as it exists; its URL may still be
        // settling and gets verified by the caller afterwards.
        match browser.pages().await {
            Ok(pages) => {
                for page in pages {
                    if !baseline.contains(page.target_id()) {
                        debug!("Hop '{}' resolved via new tab", stage);
                        return Some(HopOutcome {
                            page,
                            opened_new_tab: true,
                        });
                    }
                }
            }
            Err(e) => {
                warn!("Failed to list targets while resolving hop '{}': {}", stage, e);
            }
        }

        match origin.url().await {
            Ok(Some(url)) if url.contains(url_pattern) => {
                debug!("Hop '{}' resolved via same-tab navigation", stage);
                Some(HopOutcome {
                    page: origin.clone(),
                    opened_new_tab: false,
                })
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Failed to read origin URL while resolving hop '{}': {}", stage, e);
                None
            }
        }
    })
    .await;

    outcome.ok_or_else(|| AutomationError::timeout(stage))
}

/// Waits until the page URL contains `pattern`, failing with
/// `UnexpectedPage` carrying the last observed URL. A freshly opened tab
/// needs a moment before its URL stops reading about:blank.
pub async fn verify_url(
    page: &Page,
    pattern: &str,
    timeout: Duration,
) -> Result<String, AutomationError> {
    let matched = first_signal(timeout, PROBE_INTERVAL, || async move {
        match page.url().await {
            Ok(Some(url)) if url.contains(pattern) => Some(url),
            _ => None,
        }
    })
    .await;

    match matched {
        Some(url) => Ok(url),
        None => {
            let actual = page
                .url()
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| "<unknown>".to_string());
            Err(AutomationError::UnexpectedPage { url: actual })
        }
    }
}

/// Convenience wrapper for callers that only need an error on miss.
pub async fn require_signal<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    stage: &str,
    probe: F,
) -> Result<T, AutomationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    first_signal(timeout, interval, probe)
        .await
        .ok_or_else(|| AutomationError::timeout(stage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_first_signal_resolves_on_first_hit() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result = first_signal(Duration::from_secs(5), Duration::from_millis(1), || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n >= 3 {
                Some(n)
            } else {
                None
            }
        })
        .await;
        assert_eq!(result, Some(3));
    }

    #[tokio::test]
    async fn test_first_signal_times_out() {
        let result: Option<u32> =
            first_signal(Duration::from_millis(20), Duration::from_millis(5), || async { None })
                .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_first_signal_probes_once_even_with_zero_timeout() {
        let result = first_signal(Duration::ZERO, Duration::from_millis(1), || async { Some(7) }).await;
        assert_eq!(result, Some(7));
    }

    #[tokio::test]
    async fn test_require_signal_maps_miss_to_timeout() {
        let err = require_signal::<u32, _, _>(
            Duration::from_millis(10),
            Duration::from_millis(5),
            "first hop",
            || async { None },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AutomationError::Timeout { .. }));
        assert!(err.to_string().contains("first hop"));
    }
}
