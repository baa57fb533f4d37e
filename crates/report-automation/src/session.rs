use anyhow::{anyhow, Context};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use chromiumoxide::{Browser, BrowserConfig, Page};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use report_config::Config;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use which::which;

use crate::error::AutomationError;
use crate::login;

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// One live automated browser: the process handle, its event-handler task,
/// and the authenticated "home" page parked on the inbox listing.
pub struct BrowserSession {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    home: Page,
    created_at: DateTime<Utc>,
}

impl BrowserSession {
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    pub fn home(&self) -> &Page {
        &self.home
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Owns the at-most-one live session per process. Lazy creation on first
/// acquire, teardown-and-relaunch when the liveness probe fails, idempotent
/// close on shutdown.
pub struct SessionManager {
    config: Arc<Config>,
    credentials: Credentials,
    profile_dir: PathBuf,
    download_dir: PathBuf,
    session: Option<BrowserSession>,
}

impl SessionManager {
    pub fn new(
        config: Arc<Config>,
        credentials: Credentials,
        profile_dir: PathBuf,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            credentials,
            profile_dir,
            download_dir,
            session: None,
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Return the existing session when its liveness probe passes;
    /// otherwise tear down whatever is left and launch fresh, including the
    /// login/home handshake.
    pub async fn acquire(&mut self) -> Result<&BrowserSession, AutomationError> {
        let alive = match &self.session {
            Some(session) => Self::probe(session).await,
            None => false,
        };

        if !alive {
            if self.session.is_some() {
                warn!("Existing browser session failed liveness probe, relaunching");
            }
            self.close().await;
            let session = self.launch().await?;
            self.session = Some(session);
        }

        self.session
            .as_ref()
            .ok_or_else(|| AutomationError::Other(anyhow!("session missing after launch")))
    }

    /// Idempotent teardown. Safe with no session, safe when the browser
    /// process already exited, safe to call twice.
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            info!(
                "Shutting down browser session (created {})",
                session.created_at
            );
            // Browser closes when dropped; just bound the handler drain
            drop(session.browser);
            let _ = tokio::time::timeout(Duration::from_secs(2), session.handler_task).await;
            info!("Browser session shut down");
        }
    }

    /// Cheap health check: the browser answers a version query and the home
    /// page still evaluates a trivial expression.
    async fn probe(session: &BrowserSession) -> bool {
        if let Err(e) = session.browser.version().await {
            warn!("Browser health check failed: {}", e);
            return false;
        }
        match session.home.evaluate("1 + 1").await {
            Ok(_) => true,
            Err(e) => {
                warn!("Home page probe failed: {}", e);
                false
            }
        }
    }

    async fn launch(&self) -> Result<BrowserSession, AutomationError> {
        let (browser, handler_task) = self.launch_browser().await.map_err(AutomationError::Other)?;

        let result = self.handshake(&browser).await;
        match result {
            Ok(home) => Ok(BrowserSession {
                browser,
                handler_task,
                home,
                created_at: Utc::now(),
            }),
            Err(e) => {
                // Handshake failures must not leak a half-built browser
                drop(browser);
                let _ = tokio::time::timeout(Duration::from_secs(2), handler_task).await;
                Err(e)
            }
        }
    }

    /// Sign in (or reuse the profile's session) and park the home page on
    /// the inbox listing with download behavior configured.
    async fn handshake(&self, browser: &Browser) -> Result<Page, AutomationError> {
        let portal = &self.config.portal;

        let home = browser
            .new_page("about:blank")
            .await
            .map_err(|e| AutomationError::Other(anyhow!("Failed to open home page: {}", e)))?;

        let signed_in = login::is_signed_in(&home, portal)
            .await
            .map_err(AutomationError::Other)?;
        if !signed_in {
            login::sign_in(&home, portal, &self.credentials).await?;
        }

        // Home must sit on the inbox listing for row matching to work
        home.goto(portal.inbox_url.as_str())
            .await
            .map_err(|e| AutomationError::Other(anyhow!("Failed to open inbox: {}", e)))?;
        crate::render::wait_for_page_load(&home)
            .await
            .map_err(AutomationError::Other)?;

        if let Err(e) = Self::configure_downloads(&home, &self.download_dir).await {
            warn!("Failed to configure download behavior: {}", e);
        }

        info!("Browser session ready on inbox");
        Ok(home)
    }

    async fn launch_browser(&self) -> anyhow::Result<(Browser, tokio::task::JoinHandle<()>)> {
        let mut chrome_path = self
            .config
            .browser
            .chrome_executable
            .clone()
            .or_else(Self::find_system_chromium);

        // No system Chromium found; fetch one next to the profile dir
        if chrome_path.is_none() {
            info!("No system Chromium found, downloading via BrowserFetcher...");
            let fetcher_download_path = self
                .profile_dir
                .parent()
                .ok_or_else(|| anyhow!("Could not determine parent directory"))?
                .join("chromium_downloads");
            tokio::fs::create_dir_all(&fetcher_download_path).await?;

            let fetcher = BrowserFetcher::new(
                BrowserFetcherOptions::builder()
                    .with_path(&fetcher_download_path)
                    .build()
                    .map_err(|e| anyhow!("Failed to create BrowserFetcherOptions: {}", e))?,
            );

            let browser_info = fetcher
                .fetch()
                .await
                .map_err(|e| anyhow!("Failed to fetch Chromium: {}", e))?;
            chrome_path = Some(browser_info.executable_path);
            info!("Chromium downloaded to: {:?}", chrome_path);
        }

        let config = self.build_browser_config(chrome_path)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Failed to launch browser: {}", e))?;

        // Drain browser events; consecutive errors mean a crashed process
        let handler_task = tokio::spawn(async move {
            let mut error_count = 0;
            const MAX_ERRORS: usize = 10;

            while let Some(h) = handler.next().await {
                match h {
                    Ok(_) => {
                        error_count = 0;
                    }
                    Err(e) => {
                        error_count += 1;
                        warn!(
                            "Browser handler error (count: {}/{}): {:?}",
                            error_count, MAX_ERRORS, e
                        );
                        if error_count >= MAX_ERRORS {
                            error!(
                                "Browser handler received {} consecutive errors. Browser process may have crashed.",
                                error_count
                            );
                            break;
                        }
                    }
                }
            }

            if error_count > 0 {
                error!(
                    "Browser handler task ended after {} errors. Browser may have crashed.",
                    error_count
                );
            } else {
                info!("Browser handler task ended normally");
            }
        });

        Ok((browser, handler_task))
    }

    fn is_docker() -> bool {
        std::path::Path::new("/.dockerenv").exists()
            || std::fs::read_to_string("/proc/self/cgroup")
                .ok()
                .map(|s| s.contains("docker") || s.contains("containerd"))
                .unwrap_or(false)
    }

    /// Find a system Chromium: container paths first, then macOS bundles,
    /// then standard Linux paths, then PATH lookup.
    fn find_system_chromium() -> Option<PathBuf> {
        if Self::is_docker() {
            let docker_paths = ["/usr/bin/chromium", "/usr/bin/chromium-browser"];
            for path in &docker_paths {
                if std::path::Path::new(path).exists() {
                    return Some(PathBuf::from(path));
                }
            }
        }

        if cfg!(target_os = "macos") {
            let macos_paths = [
                "/Applications/Chromium.app/Contents/MacOS/Chromium",
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                "/opt/homebrew/bin/chromium",
                "/usr/local/bin/chromium",
            ];
            for path in &macos_paths {
                let path_buf = PathBuf::from(path);
                if path_buf.exists() {
                    return Some(path_buf);
                }
            }
        }

        let system_paths = [
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/local/bin/chromium",
            "/usr/local/bin/chromium-browser",
            "/opt/chromium/chromium",
        ];
        for path in &system_paths {
            if std::path::Path::new(path).exists() {
                return Some(PathBuf::from(path));
            }
        }

        which("chromium").or_else(|_| which("chromium-browser")).ok()
    }

    fn build_browser_config(&self, chrome_path: Option<PathBuf>) -> anyhow::Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder();

        if let Some(path) = chrome_path {
            builder = builder.chrome_executable(path);
            info!("Configuring browser with system Chromium");
        }

        let is_docker = Self::is_docker();
        let is_macos = cfg!(target_os = "macos");

        if self.config.browser.headless || is_docker {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }

        if is_docker || !is_macos {
            builder = builder
                .arg("--no-sandbox")
                .arg("--disable-dev-shm-usage");
        }

        builder = builder
            .arg("--disable-extensions")
            .arg("--disable-notifications")
            .arg("--disable-third-party-cookies")
            .arg("--log-level=3")
            .arg("--disable-sync")
            .arg("--disable-default-apps")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-renderer-backgrounding")
            .arg("--window-size=1280,900")
            .arg(format!("--download-directory={}", self.download_dir.display()));

        if is_docker {
            builder = builder
                .arg("--disable-gpu")
                .arg("--disable-crash-reporter")
                .arg("--disable-breakpad");
        }

        let profile_dir = self
            .config
            .browser
            .user_data_dir
            .clone()
            .unwrap_or_else(|| self.profile_dir.clone());
        builder = builder.arg(format!("--user-data-dir={}", profile_dir.display()));

        builder
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {}", e))
    }

    /// Point Chromium's download machinery at the scratch directory via
    /// CDP, so confirmation has a primary place to look.
    async fn configure_downloads(page: &Page, download_dir: &Path) -> anyhow::Result<()> {
        use chromiumoxide::cdp::browser_protocol::browser::{
            SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
        };

        std::fs::create_dir_all(download_dir)
            .with_context(|| format!("Failed to create download directory {:?}", download_dir))?;

        let params = SetDownloadBehaviorParams {
            behavior: SetDownloadBehaviorBehavior::Allow,
            download_path: Some(download_dir.to_string_lossy().to_string()),
            browser_context_id: None,
            events_enabled: None,
        };

        page.execute(params)
            .await
            .map_err(|e| anyhow!("Failed to configure download behavior: {}", e))?;

        debug!("Download directory configured: {:?}", download_dir);
        Ok(())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Closing browser on drop");
            drop(session.browser);
            session.handler_task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(
            Arc::new(Config::example("https://portal.example.com")),
            Credentials {
                username: "grader@example.com".to_string(),
                password: "hunter2".to_string(),
            },
            PathBuf::from("/tmp/paperchase-test/profile"),
            PathBuf::from("/tmp/paperchase-test/downloads"),
        )
    }

    #[tokio::test]
    async fn test_close_without_session_is_a_noop() {
        let mut m = manager();
        m.close().await;
    }

    #[tokio::test]
    async fn test_close_twice_does_not_panic() {
        let mut m = manager();
        m.close().await;
        m.close().await;
    }

    #[test]
    fn test_download_dir_accessor() {
        let m = manager();
        assert_eq!(
            m.download_dir(),
            Path::new("/tmp/paperchase-test/downloads")
        );
    }
}
