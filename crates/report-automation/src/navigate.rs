use anyhow::anyhow;
use chromiumoxide::{Browser, Element, Page};
use report_config::{Config, NavigationConfig};
use report_models::SearchCriterion;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::AutomationError;
use crate::locator::{self, RowFields};
use crate::render;
use crate::signals;

const URL_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// A page parked on the fully rendered report viewer.
pub struct ReportView {
    pub page: Page,
    pub url: String,
    pub opened_new_tab: bool,
}

/// The full walk: inbox row -> submission viewer -> report trigger ->
/// report viewer -> rendered. Each stage either advances or returns a typed
/// failure; nothing inside retries silently.
pub async fn locate_and_open_report(
    browser: &Browser,
    home: &Page,
    criterion: &SearchCriterion,
    config: &Config,
) -> Result<ReportView, AutomationError> {
    let nav = &config.navigation;
    let hop_timeout = Duration::from_secs(nav.hop_timeout_secs);

    // Fresh listing; a stale home page would match yesterday's rows
    home.goto(config.portal.inbox_url.as_str())
        .await
        .map_err(|e| AutomationError::Other(anyhow!("Failed to open inbox listing: {}", e)))?;
    render::wait_for_page_load(home).await.map_err(AutomationError::Other)?;
    sleep(Duration::from_secs(1)).await;

    let target = find_matching_row(home, criterion, nav)
        .await
        .map_err(AutomationError::Other)?
        .ok_or_else(|| AutomationError::NotFound {
            criterion: criterion.label(),
        })?;
    info!("Matched inbox row for {}", criterion.label());

    // First hop: the row click may open a tab or navigate in place
    let baseline = signals::baseline_targets(browser)
        .await
        .map_err(AutomationError::Other)?;
    locator::click_robustly(home, &target, None)
        .await
        .map_err(AutomationError::Other)?;
    let first_hop = signals::resolve_hop(
        browser,
        home,
        &baseline,
        &config.portal.viewer_url_pattern,
        hop_timeout,
        "submission viewer",
    )
    .await?;

    let viewer_url = signals::verify_url(
        &first_hop.page,
        &config.portal.viewer_url_pattern,
        URL_VERIFY_TIMEOUT,
    )
    .await?;
    debug!("Submission viewer resolved at {}", viewer_url);

    cross_check_identifier(&first_hop.page, criterion).await;

    render::wait_for_page_load(&first_hop.page)
        .await
        .map_err(AutomationError::Other)?;
    sleep(Duration::from_secs(nav.settle_secs)).await;

    // Second hop: the report trigger, found through the strategy list
    let Some((trigger, matched_selector)) =
        locator::find_by_strategies(&first_hop.page, &nav.report_trigger_selectors).await
    else {
        return Err(AutomationError::Other(anyhow!(
            "Report control not found on submission viewer (tried {} strategies) at {}",
            nav.report_trigger_selectors.len(),
            viewer_url
        )));
    };
    info!("Report control located via strategy: {}", matched_selector);

    let baseline = signals::baseline_targets(browser)
        .await
        .map_err(AutomationError::Other)?;
    locator::click_robustly(&first_hop.page, &trigger, Some(matched_selector))
        .await
        .map_err(AutomationError::Other)?;
    let second_hop = signals::resolve_hop(
        browser,
        &first_hop.page,
        &baseline,
        &config.portal.report_url_pattern,
        hop_timeout,
        "report viewer",
    )
    .await?;

    let report_url = signals::verify_url(
        &second_hop.page,
        &config.portal.report_url_pattern,
        URL_VERIFY_TIMEOUT,
    )
    .await?;
    info!("Report viewer resolved at {}", report_url);

    // The viewer is client-rendered; wait out its layered settle policy
    render::settle_report_view(&second_hop.page, nav).await?;

    Ok(ReportView {
        page: second_hop.page,
        url: report_url,
        opened_new_tab: first_hop.opened_new_tab || second_hop.opened_new_tab,
    })
}

/// Click the viewer's download control. A missing control is logged rather
/// than fatal: some report viewers start the download on their own, and the
/// confirmation poll is the judge either way.
pub async fn trigger_report_download(page: &Page, nav: &NavigationConfig) -> Result<(), AutomationError> {
    match locator::find_by_strategies(page, &nav.download_trigger_selectors).await {
        Some((button, selector)) => {
            info!("Download control located via strategy: {}", selector);
            locator::click_robustly(page, &button, Some(selector))
                .await
                .map_err(AutomationError::Other)?;
            sleep(Duration::from_secs(1)).await;
            Ok(())
        }
        None => {
            warn!(
                "Download control not found (tried {} strategies); relying on auto-download",
                nav.download_trigger_selectors.len()
            );
            Ok(())
        }
    }
}

/// Scan the listing rows for one whose identifier or title equals the
/// criterion, returning its click target.
async fn find_matching_row(
    home: &Page,
    criterion: &SearchCriterion,
    nav: &NavigationConfig,
) -> anyhow::Result<Option<Element>> {
    let rows = collect_rows(home, nav).await?;
    debug!("Inbox listing has {} row(s)", rows.len());

    for row in rows {
        let fields = extract_row_fields(&row, nav).await;
        if !locator::row_matches(&fields, criterion) {
            continue;
        }

        // The title link is the click target; the bare row anchors as a
        // fallback when the title cell carries no link
        if let Some((link, _)) = locator::find_in_element(&row, &nav.title_link_selectors).await {
            return Ok(Some(link));
        }
        if let Ok(link) = row.find_element("a").await {
            return Ok(Some(link));
        }
        warn!(
            "Row matched {} but exposes no clickable link",
            criterion.label()
        );
    }

    Ok(None)
}

async fn collect_rows(home: &Page, nav: &NavigationConfig) -> anyhow::Result<Vec<Element>> {
    for selector in &nav.row_selectors {
        match home.find_elements(selector.as_str()).await {
            Ok(rows) if !rows.is_empty() => {
                debug!("Row selector matched {} row(s): {}", rows.len(), selector);
                return Ok(rows);
            }
            _ => continue,
        }
    }
    Ok(Vec::new())
}

async fn extract_row_fields(row: &Element, nav: &NavigationConfig) -> RowFields {
    let identifier = match locator::find_in_element(row, &nav.id_cell_selectors).await {
        Some((cell, _)) => cell.inner_text().await.ok().flatten(),
        None => None,
    };
    let title = match locator::find_in_element(row, &nav.title_link_selectors).await {
        Some((link, _)) => link.inner_text().await.ok().flatten(),
        None => None,
    };
    RowFields { identifier, title }
}

/// Advisory cross-check: when searching by identifier, the viewer should
/// mention it somewhere. A miss is logged, never fatal - the check guards
/// against gross mis-navigation, not against page-content drift.
async fn cross_check_identifier(page: &Page, criterion: &SearchCriterion) {
    let SearchCriterion::Id(id) = criterion else {
        return;
    };

    let body = page
        .evaluate("document.body ? document.body.innerText : ''")
        .await
        .ok()
        .and_then(|r| r.value().and_then(|v| v.as_str().map(|s| s.to_string())));

    match body {
        Some(text) if text.contains(id.as_str()) => {
            debug!("Viewer cross-check: identifier {} present on page", id);
        }
        Some(_) => {
            warn!(
                "Viewer cross-check: identifier {} not visible on page (advisory only)",
                id
            );
        }
        None => {
            warn!("Viewer cross-check skipped: could not read page text");
        }
    }
}
