use browser_trace::{TraceConfig, TraceRecorder};
use chromiumoxide::{Browser, Page};
use report_config::{Config, PathManager};
use report_models::{RequestOutcome, SearchCriterion};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::download;
use crate::error::AutomationError;
use crate::navigate;
use crate::session::{Credentials, SessionManager};

struct Inner {
    sessions: SessionManager,
    trace: TraceRecorder,
}

/// Wraps session management, navigation, and download confirmation into one
/// "process one request" operation. The mutex is the serialization point:
/// concurrent requests queue here instead of racing on shared tabs.
pub struct Coordinator {
    config: Arc<Config>,
    artifact_dir: PathBuf,
    inner: tokio::sync::Mutex<Inner>,
}

impl Coordinator {
    pub fn new(config: Arc<Config>, credentials: Credentials, paths: &PathManager) -> Self {
        let artifact_dir = config
            .download
            .artifact_dir
            .clone()
            .unwrap_or_else(|| paths.artifact_dir());

        let mut trace_config = TraceConfig::from_env();
        if std::env::var("PAPERCHASE_TRACE_DIR").is_err() {
            trace_config.output_dir = paths.trace_dir();
        }

        let sessions = SessionManager::new(
            Arc::clone(&config),
            credentials,
            paths.browser_profile_dir(),
            paths.download_scratch_dir(),
        );

        Self {
            config,
            artifact_dir,
            inner: tokio::sync::Mutex::new(Inner {
                sessions,
                trace: TraceRecorder::new(trace_config),
            }),
        }
    }

    /// Process one fetch request end to end. Always returns a structured
    /// outcome; every failure mode, expected or not, is flattened into it.
    /// The session is returned to its home view afterwards regardless of
    /// how the request went.
    pub async fn process_request(&self, criterion: &SearchCriterion) -> RequestOutcome {
        info!("Processing report request for {}", criterion.label());

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let download_dir = inner.sessions.download_dir().to_path_buf();

        let session = match inner.sessions.acquire().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not acquire browser session: {}", e);
                return outcome_for_error(&e, criterion, None);
            }
        };

        // Bound tab accumulation left over from earlier requests
        if let Err(e) = close_stale_tabs(session.browser(), session.home()).await {
            warn!("Stale tab cleanup failed: {}", e);
        }

        let navigation = navigate::locate_and_open_report(
            session.browser(),
            session.home(),
            criterion,
            &self.config,
        )
        .await;

        let outcome = match navigation {
            Ok(view) => {
                debug!(
                    "Report viewer ready at {} ({})",
                    view.url,
                    if view.opened_new_tab { "new tab" } else { "same tab" }
                );

                if let Err(e) =
                    navigate::trigger_report_download(&view.page, &self.config.navigation).await
                {
                    warn!("Download trigger failed: {}", e);
                }

                let dirs = download::candidate_dirs(&download_dir, &self.config.download);
                let confirmed = download::confirm_download(
                    &dirs,
                    criterion,
                    &self.config.download,
                    &self.artifact_dir,
                )
                .await;

                match confirmed {
                    Ok(Some(path)) => RequestOutcome::succeeded(
                        format!("Report for {} saved to {}", criterion.label(), path.display()),
                        path,
                    ),
                    Ok(None) => outcome_for_error(&AutomationError::DownloadUnconfirmed, criterion, None),
                    Err(e) => {
                        let err = AutomationError::Other(e);
                        let capture = inner
                            .trace
                            .capture_failure(&view.page, "download-error")
                            .await;
                        outcome_for_error(&err, criterion, capture.screenshot.as_deref())
                    }
                }
            }
            Err(e) => {
                let screenshot = if e.is_expected() {
                    None
                } else {
                    let capture = inner
                        .trace
                        .capture_failure(session.home(), "navigation-error")
                        .await;
                    capture.screenshot
                };
                outcome_for_error(&e, criterion, screenshot.as_deref())
            }
        };

        // Best-effort recovery regardless of outcome: drop every tab the
        // request opened and park the home page back on the inbox, so the
        // tab count is back at baseline and the session stays reusable
        if let Err(e) = close_stale_tabs(session.browser(), session.home()).await {
            warn!("End-of-request tab cleanup failed: {}", e);
        }
        if let Err(e) = session.home().goto(self.config.portal.inbox_url.as_str()).await {
            warn!("Failed to return session to inbox view: {}", e);
        }

        outcome
    }

    /// Tear down the browser session. Idempotent; used on shutdown signals.
    pub async fn close_session(&self) {
        let mut guard = self.inner.lock().await;
        guard.sessions.close().await;
    }
}

/// Close every tab except the home page.
async fn close_stale_tabs(browser: &Browser, home: &Page) -> anyhow::Result<()> {
    let home_id = home.target_id().clone();
    let pages = browser.pages().await?;
    for page in pages {
        if *page.target_id() == home_id {
            continue;
        }
        debug!("Closing stale tab {:?}", page.target_id());
        if let Err(e) = page.close().await {
            warn!("Failed to close stale tab: {}", e);
        }
    }
    Ok(())
}

/// Flatten an automation error into the caller-visible outcome, attaching
/// the diagnostic screenshot path when one was captured.
fn outcome_for_error(
    err: &AutomationError,
    criterion: &SearchCriterion,
    screenshot: Option<&Path>,
) -> RequestOutcome {
    let mut message = match err {
        AutomationError::LoginRequired => {
            "login required: the portal session could not be established; \
             re-run `paperchase config init` and check the credentials"
                .to_string()
        }
        AutomationError::DownloadUnconfirmed => format!(
            "report for {} was requested but the download could not be confirmed; \
             it may still complete - check the artifact directory shortly",
            criterion.label()
        ),
        _ => err.to_string(),
    };

    if let Some(path) = screenshot {
        message.push_str(&format!(" (diagnostic screenshot: {})", path.display()));
    }

    RequestOutcome::failed(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_outcome_mentions_not_found() {
        let err = AutomationError::NotFound {
            criterion: "title \"Ghost Paper\"".to_string(),
        };
        let outcome = outcome_for_error(&err, &SearchCriterion::title("Ghost Paper"), None);
        assert!(!outcome.success);
        assert!(outcome.message.contains("not found"));
        assert!(outcome.file_path.is_none());
    }

    #[test]
    fn test_unconfirmed_outcome_is_soft() {
        let outcome = outcome_for_error(
            &AutomationError::DownloadUnconfirmed,
            &SearchCriterion::id("42"),
            None,
        );
        assert!(!outcome.success);
        assert!(outcome.message.contains("could not be confirmed"));
    }

    #[test]
    fn test_screenshot_path_lands_in_message() {
        let err = AutomationError::Other(anyhow::anyhow!("boom"));
        let outcome = outcome_for_error(
            &err,
            &SearchCriterion::id("42"),
            Some(Path::new("/trace/001_navigation-error.png")),
        );
        assert!(outcome.message.contains("001_navigation-error.png"));
    }

    #[test]
    fn test_timeout_outcome_names_the_stage() {
        let outcome = outcome_for_error(
            &AutomationError::timeout("first hop"),
            &SearchCriterion::id("42"),
            None,
        );
        assert!(outcome.message.contains("first hop"));
    }
}
