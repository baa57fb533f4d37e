use chromiumoxide::{Element, Page};
use report_models::SearchCriterion;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Try an ordered list of locator strategies, returning the first element
/// that resolves along with the strategy that found it. This is the single
/// fallback primitive every step of the navigation walk goes through;
/// selector drift is absorbed here, not scattered across the flow.
pub async fn find_by_strategies<'a>(
    page: &Page,
    strategies: &'a [String],
) -> Option<(Element, &'a str)> {
    for selector in strategies {
        match page.find_element(selector.as_str()).await {
            Ok(element) => {
                debug!("Locator strategy matched: {}", selector);
                return Some((element, selector.as_str()));
            }
            Err(_) => continue,
        }
    }
    None
}

/// Same ordered fallback, scoped to a child of `element`.
pub async fn find_in_element<'a>(
    element: &Element,
    strategies: &'a [String],
) -> Option<(Element, &'a str)> {
    for selector in strategies {
        match element.find_element(selector.as_str()).await {
            Ok(found) => return Some((found, selector.as_str())),
            Err(_) => continue,
        }
    }
    None
}

/// Click with the full ritual: scroll into view, wait for a non-empty
/// bounding box, then a native click with a JavaScript fallback. The JS
/// fallback needs a document-level selector; element-scoped callers pass
/// None and settle for the native click alone.
pub async fn click_robustly(
    page: &Page,
    element: &Element,
    js_fallback_selector: Option<&str>,
) -> anyhow::Result<()> {
    if let Err(e) = element.scroll_into_view().await {
        warn!("Failed to scroll element into view: {}", e);
    }

    let mut visibility_attempts = 0;
    while visibility_attempts < 20 {
        if let Ok(bbox) = element.bounding_box().await {
            if bbox.width > 0.0 && bbox.height > 0.0 {
                break;
            }
        }
        sleep(Duration::from_millis(100)).await;
        visibility_attempts += 1;
    }
    if visibility_attempts >= 20 {
        warn!("Element visibility check timed out before click");
    }

    match element.click().await {
        Ok(_) => Ok(()),
        Err(e) => {
            let Some(selector) = js_fallback_selector else {
                return Err(anyhow::anyhow!("Click failed with no JS fallback available: {}", e));
            };
            warn!("Native click failed: {}. Trying JavaScript click fallback...", e);
            let escaped = selector.replace('"', "\\\"").replace('\'', "\\'");
            let js_click = format!(
                r#"
                (() => {{
                    const selector = "{}";
                    const el = document.querySelector(selector);
                    if (el) {{
                        el.scrollIntoView({{ behavior: 'instant', block: 'center' }});
                        el.click();
                        return true;
                    }}
                    return false;
                }})()
            "#,
                escaped
            );
            match page.evaluate(js_click).await {
                Ok(result) => {
                    if result.value().and_then(|v| v.as_bool()).unwrap_or(false) {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!("JavaScript click: element not found in DOM"))
                    }
                }
                Err(js_err) => Err(anyhow::anyhow!("JavaScript click failed: {}", js_err)),
            }
        }
    }
}

/// Text extracted from one inbox row. The identifier column and the title
/// link expose different DOM, so both are captured up front and matching
/// happens on plain strings.
#[derive(Debug, Default, Clone)]
pub struct RowFields {
    pub identifier: Option<String>,
    pub title: Option<String>,
}

/// Exact match against the identifier column. Substring matching would make
/// "123" claim "91236" - identifiers only ever match whole.
pub fn row_matches_id(row: &RowFields, wanted: &str) -> bool {
    row.identifier
        .as_deref()
        .map(|id| id.trim() == wanted.trim())
        .unwrap_or(false)
}

/// Exact match against the title link text. Same rule: ambiguous substring
/// hits are worse than a clean NotFound.
pub fn row_matches_title(row: &RowFields, wanted: &str) -> bool {
    row.title
        .as_deref()
        .map(|title| title.trim() == wanted.trim())
        .unwrap_or(false)
}

pub fn row_matches(row: &RowFields, criterion: &SearchCriterion) -> bool {
    match criterion {
        SearchCriterion::Id(value) => row_matches_id(row, value),
        SearchCriterion::Title(value) => row_matches_title(row, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(identifier: Option<&str>, title: Option<&str>) -> RowFields {
        RowFields {
            identifier: identifier.map(|s| s.to_string()),
            title: title.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_id_match_is_exact() {
        let r = row(Some("2696113910"), Some("My Essay"));
        assert!(row_matches_id(&r, "2696113910"));
        assert!(!row_matches_id(&r, "269611391"));
        assert!(!row_matches_id(&r, "96113910"));
    }

    #[test]
    fn test_id_match_trims_whitespace() {
        let r = row(Some("  42 \n"), None);
        assert!(row_matches_id(&r, "42"));
    }

    #[test]
    fn test_title_match_is_exact_not_substring() {
        let r = row(None, Some("Climate Essay"));
        assert!(row_matches_title(&r, "Climate Essay"));
        assert!(!row_matches_title(&r, "Climate"));
        assert!(!row_matches_title(&r, "Climate Essay Draft"));
    }

    #[test]
    fn test_missing_field_never_matches() {
        let r = row(None, None);
        assert!(!row_matches_id(&r, "1"));
        assert!(!row_matches_title(&r, "anything"));
    }

    #[test]
    fn test_row_matches_dispatches_on_kind() {
        let r = row(Some("7"), Some("Seven"));
        assert!(row_matches(&r, &SearchCriterion::id("7")));
        assert!(row_matches(&r, &SearchCriterion::title("Seven")));
        assert!(!row_matches(&r, &SearchCriterion::title("7")));
    }
}
