use chromiumoxide::Page;
use report_config::NavigationConfig;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::AutomationError;

const READY_STATE_TIMEOUT: Duration = Duration::from_secs(30);
const NETWORK_IDLE_TIMEOUT: Duration = Duration::from_secs(10);
const KEY_ELEMENT_ATTEMPTS: u32 = 10;

/// Wait for document.readyState to reach "complete". Timing out is logged
/// and tolerated - a page stuck in "interactive" is usually still usable.
pub async fn wait_for_page_load(page: &Page) -> anyhow::Result<()> {
    let ready_script = "document.readyState === 'complete'";

    let start = std::time::Instant::now();
    while start.elapsed() < READY_STATE_TIMEOUT {
        if let Ok(result) = page.evaluate(ready_script).await {
            if let Some(value) = result.value() {
                if value.as_bool().unwrap_or(false) {
                    return Ok(());
                }
            }
        }
        sleep(Duration::from_millis(100)).await;
    }

    warn!("Page ready state check timed out, continuing anyway");
    Ok(())
}

/// Wait for network activity to settle after an action. The readyState must
/// hold "complete" for several consecutive checks before we call it idle.
pub async fn wait_for_network_idle(page: &Page, timeout: Duration) -> anyhow::Result<()> {
    sleep(Duration::from_millis(500)).await;

    let start = std::time::Instant::now();
    let mut stable_count = 0;
    const STABLE_THRESHOLD: u32 = 3;

    while start.elapsed() < timeout {
        if let Ok(result) = page.evaluate("document.readyState").await {
            if let Some(state) = result.value().and_then(|v| v.as_str()) {
                if state == "complete" {
                    stable_count += 1;
                    if stable_count >= STABLE_THRESHOLD {
                        debug!("Network appears idle (readyState stable)");
                        return Ok(());
                    }
                } else {
                    stable_count = 0;
                }
            }
        }
        sleep(Duration::from_millis(200)).await;
    }

    debug!("Network idle check completed (timeout or stable)");
    Ok(())
}

/// Check whether any of the key elements is present, polling briefly.
/// Absence is a signal worth logging, never a failure: the report viewer's
/// class names drift faster than its behavior.
async fn await_key_elements(page: &Page, selectors: &[String]) -> bool {
    if selectors.is_empty() {
        return true;
    }

    let mut attempts = 0;
    while attempts < KEY_ELEMENT_ATTEMPTS {
        for selector in selectors {
            if page.find_element(selector.as_str()).await.is_ok() {
                debug!("Key element present: {}", selector);
                return true;
            }
        }
        sleep(Duration::from_millis(500)).await;
        attempts += 1;
    }

    false
}

/// Layered wait for the client-rendered report viewer: readyState, network
/// idle, settle delay, key-element presence, final settle. The whole policy
/// is time-boxed; an overrun is a Timeout, not a hang.
pub async fn settle_report_view(page: &Page, cfg: &NavigationConfig) -> Result<(), AutomationError> {
    let budget = Duration::from_secs(cfg.render_timeout_secs);
    let settle = Duration::from_secs(cfg.settle_secs);

    let layered = async {
        if let Err(e) = wait_for_page_load(page).await {
            warn!("Ready-state wait failed on report viewer: {}", e);
        }
        if let Err(e) = wait_for_network_idle(page, NETWORK_IDLE_TIMEOUT).await {
            warn!("Network idle wait failed on report viewer: {}", e);
        }
        sleep(settle).await;

        if !await_key_elements(page, &cfg.report_ready_selectors).await {
            warn!(
                "No report-ready element found (checked {} selectors); proceeding on settle delays alone",
                cfg.report_ready_selectors.len()
            );
        }

        sleep(settle).await;
    };

    tokio::time::timeout(budget, layered)
        .await
        .map_err(|_| AutomationError::timeout("report viewer render"))
}
