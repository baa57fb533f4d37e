use anyhow::{Context, Result};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::TraceConfig;

/// What was persisted for one failure. Paths are only present for the
/// capture kinds enabled in the config.
#[derive(Debug, Default, Clone)]
pub struct FailureCapture {
    pub screenshot: Option<PathBuf>,
    pub page_state: Option<PathBuf>,
    pub html: Option<PathBuf>,
}

/// Writes diagnostics for a page into the trace directory. One recorder
/// lives as long as the process; the counter keeps filenames ordered across
/// requests.
pub struct TraceRecorder {
    config: TraceConfig,
    counter: u32,
}

impl TraceRecorder {
    pub fn new(config: TraceConfig) -> Self {
        Self { config, counter: 0 }
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Capture everything configured for a failed request. Capture errors
    /// are logged and swallowed - diagnostics must never mask the original
    /// failure.
    pub async fn capture_failure(&mut self, page: &Page, label: &str) -> FailureCapture {
        let mut capture = FailureCapture::default();

        if let Err(e) = std::fs::create_dir_all(&self.config.output_dir) {
            warn!(
                "Failed to create trace directory {:?}: {}",
                self.config.output_dir, e
            );
            return capture;
        }

        self.counter += 1;

        if self.config.capture_screenshots {
            match self.screenshot(page, label).await {
                Ok(path) => capture.screenshot = Some(path),
                Err(e) => warn!("Failed to capture failure screenshot: {}", e),
            }
        }

        if self.config.capture_page_state {
            match self.save_page_state(page, label).await {
                Ok(path) => capture.page_state = Some(path),
                Err(e) => warn!("Failed to capture page state: {}", e),
            }
        }

        if self.config.capture_html {
            match self.save_html(page, label).await {
                Ok(path) => capture.html = Some(path),
                Err(e) => warn!("Failed to capture page HTML: {}", e),
            }
        }

        capture
    }

    async fn screenshot(&self, page: &Page, label: &str) -> Result<PathBuf> {
        let filename = format!("{:03}_{}.png", self.counter, sanitize_label(label));
        let path = self.config.output_dir.join(&filename);

        let params = ScreenshotParams::builder()
            .format(chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat::Png)
            .build();

        let data = page.screenshot(params).await?;
        std::fs::write(&path, data)
            .with_context(|| format!("Failed to write screenshot to {:?}", path))?;
        info!("Failure screenshot saved: {:?}", path);
        Ok(path)
    }

    async fn save_page_state(&self, page: &Page, label: &str) -> Result<PathBuf> {
        let filename = format!("{:03}_{}_state.json", self.counter, sanitize_label(label));
        let path = self.config.output_dir.join(&filename);

        let state = page_state(page).await;
        std::fs::write(&path, serde_json::to_string_pretty(&state)?)
            .with_context(|| format!("Failed to write page state to {:?}", path))?;
        Ok(path)
    }

    async fn save_html(&self, page: &Page, label: &str) -> Result<PathBuf> {
        let filename = format!("{:03}_{}.html", self.counter, sanitize_label(label));
        let path = self.config.output_dir.join(&filename);

        let html = page.content().await?;
        std::fs::write(&path, html)
            .with_context(|| format!("Failed to write HTML to {:?}", path))?;
        Ok(path)
    }
}

/// Snapshot of what the page thinks it is, gathered in one evaluate call so
/// a half-dead page yields as much as it still can.
async fn page_state(page: &Page) -> Value {
    let url = page
        .url()
        .await
        .ok()
        .flatten()
        .unwrap_or_default();

    let js = r#"
    (() => {
        return {
            url: window.location.href,
            title: document.title,
            readyState: document.readyState,
            viewport: {
                width: window.innerWidth,
                height: window.innerHeight,
            },
            bodyPreview: document.body ? document.body.innerText.substring(0, 1000) : null,
        };
    })()
    "#;

    let mut state = json!({ "url": url });

    match page.evaluate(js).await {
        Ok(result) => {
            if let Some(value) = result.value() {
                if let Some(obj) = value.as_object() {
                    for (key, val) in obj {
                        state[key] = val.clone();
                    }
                }
            }
        }
        Err(e) => {
            warn!("Failed to evaluate page state script: {}", e);
            state["evaluateError"] = json!(e.to_string());
        }
    }

    state
}

fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_label_replaces_separators() {
        assert_eq!(sanitize_label("first hop: timeout"), "first_hop__timeout");
        assert_eq!(sanitize_label("ok-label_1"), "ok-label_1");
    }
}
