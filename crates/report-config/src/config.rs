use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration, stored as TOML under the platform config dir.
///
/// Selector lists are ordered: the navigation driver tries each entry in
/// turn and stops at the first that resolves, so the most stable selector
/// belongs first and the loosest fallback last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub portal: PortalConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub download: DownloadConfig,
}

/// The target portal. URLs and URL patterns are configuration, never
/// hardcoded - the portal can move without a recompile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Landing page of the portal.
    pub base_url: String,
    /// Sign-in form page.
    pub login_url: String,
    /// The submission inbox listing - the session's "home" view.
    pub inbox_url: String,
    /// Substring a submission viewer URL must contain.
    #[serde(default = "default_viewer_url_pattern")]
    pub viewer_url_pattern: String,
    /// Substring a report viewer URL must contain.
    #[serde(default = "default_report_url_pattern")]
    pub report_url_pattern: String,
    /// Marker element present only when signed in (ordered fallbacks).
    #[serde(default = "default_signed_in_selectors")]
    pub signed_in_selectors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Explicit Chromium executable; when unset, system discovery and the
    /// fetcher fallback run in that order.
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,
    /// Browser profile dir override; defaults to the data dir.
    #[serde(default)]
    pub user_data_dir: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_executable: None,
            user_data_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// Bound on each tab-open/url-change race, in seconds.
    #[serde(default = "default_hop_timeout_secs")]
    pub hop_timeout_secs: u64,
    /// Bound on the whole layered render wait, in seconds.
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,
    /// Fixed settle delay applied between render-wait layers, in seconds.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    /// Rows of the inbox listing.
    #[serde(default = "default_row_selectors")]
    pub row_selectors: Vec<String>,
    /// Identifier cell within a row.
    #[serde(default = "default_id_cell_selectors")]
    pub id_cell_selectors: Vec<String>,
    /// Title link within a row (also the first-hop click target).
    #[serde(default = "default_title_link_selectors")]
    pub title_link_selectors: Vec<String>,
    /// The "open report" control inside the submission viewer.
    #[serde(default = "default_report_trigger_selectors")]
    pub report_trigger_selectors: Vec<String>,
    /// Elements whose presence indicates the report viewer finished
    /// rendering. Absence is logged, not fatal.
    #[serde(default = "default_report_ready_selectors")]
    pub report_ready_selectors: Vec<String>,
    /// The download control inside the report viewer.
    #[serde(default = "default_download_trigger_selectors")]
    pub download_trigger_selectors: Vec<String>,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            hop_timeout_secs: default_hop_timeout_secs(),
            render_timeout_secs: default_render_timeout_secs(),
            settle_secs: default_settle_secs(),
            row_selectors: default_row_selectors(),
            id_cell_selectors: default_id_cell_selectors(),
            title_link_selectors: default_title_link_selectors(),
            report_trigger_selectors: default_report_trigger_selectors(),
            report_ready_selectors: default_report_ready_selectors(),
            download_trigger_selectors: default_download_trigger_selectors(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Canonical artifact directory; confirmed reports are renamed into it.
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
    /// Extra directories to scan besides the session download dir and the
    /// user's Downloads folder.
    #[serde(default)]
    pub extra_candidate_dirs: Vec<PathBuf>,
    /// Expected artifact extension, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Files older than this are ignored as stale, in seconds.
    #[serde(default = "default_recency_window_secs")]
    pub recency_window_secs: u64,
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Fraction of significant title words that must appear in a filename
    /// for a fuzzy match. Empirically chosen; tighten with care.
    #[serde(default = "default_fuzzy_word_threshold")]
    pub fuzzy_word_threshold: f64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            artifact_dir: None,
            extra_candidate_dirs: Vec::new(),
            extension: default_extension(),
            recency_window_secs: default_recency_window_secs(),
            poll_attempts: default_poll_attempts(),
            poll_interval_secs: default_poll_interval_secs(),
            fuzzy_word_threshold: default_fuzzy_word_threshold(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_viewer_url_pattern() -> String {
    "/submission/".to_string()
}

fn default_report_url_pattern() -> String {
    "/report/".to_string()
}

fn default_signed_in_selectors() -> Vec<String> {
    to_strings(&[
        "[data-testid='user-menu']",
        ".user-menu",
        "a[href*='logout']",
    ])
}

fn default_hop_timeout_secs() -> u64 {
    15
}

fn default_render_timeout_secs() -> u64 {
    45
}

fn default_settle_secs() -> u64 {
    2
}

fn default_row_selectors() -> Vec<String> {
    to_strings(&[
        "[data-testid='inbox-row']",
        "table.inbox-table tbody tr",
        "#inbox tbody tr",
    ])
}

fn default_id_cell_selectors() -> Vec<String> {
    to_strings(&[
        "[data-testid='submission-id']",
        "td.submission-id",
        "td[data-label='Submission ID']",
    ])
}

fn default_title_link_selectors() -> Vec<String> {
    to_strings(&[
        "[data-testid='submission-title'] a",
        "td.title a",
        "a.submission-link",
    ])
}

fn default_report_trigger_selectors() -> Vec<String> {
    to_strings(&[
        "button.report-launch",
        ".sidebar .tools button.report",
        "button[aria-label*='report' i]",
        "[data-testid*='report-button']",
    ])
}

fn default_report_ready_selectors() -> Vec<String> {
    to_strings(&[
        "[data-testid='report-summary']",
        ".report-score",
        "main .report-body",
    ])
}

fn default_download_trigger_selectors() -> Vec<String> {
    to_strings(&[
        "button[aria-label*='download' i]",
        ".toolbar button.download",
        "[data-testid*='download']",
    ])
}

fn default_extension() -> String {
    "pdf".to_string()
}

fn default_recency_window_secs() -> u64 {
    600
}

fn default_poll_attempts() -> u32 {
    10
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_fuzzy_word_threshold() -> f64 {
    0.6
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {:?}", path))?;
        Ok(())
    }

    /// A starting config with placeholder portal URLs, for `config init`.
    pub fn example(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            portal: PortalConfig {
                base_url: base.to_string(),
                login_url: format!("{}/login", base),
                inbox_url: format!("{}/inbox", base),
                viewer_url_pattern: default_viewer_url_pattern(),
                report_url_pattern: default_report_url_pattern(),
                signed_in_selectors: default_signed_in_selectors(),
            },
            browser: BrowserConfig::default(),
            navigation: NavigationConfig::default(),
            download: DownloadConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_through_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::example("https://portal.example.com");
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.portal.base_url, "https://portal.example.com");
        assert_eq!(loaded.portal.inbox_url, "https://portal.example.com/inbox");
        assert_eq!(loaded.download.extension, "pdf");
    }

    #[test]
    fn test_defaults_match_empirical_constants() {
        let download = DownloadConfig::default();
        assert_eq!(download.recency_window_secs, 600);
        assert_eq!(download.poll_attempts, 10);
        assert!((download.fuzzy_word_threshold - 0.6).abs() < f64::EPSILON);

        let nav = NavigationConfig::default();
        assert!(nav.hop_timeout_secs >= 8 && nav.hop_timeout_secs <= 20);
    }

    #[test]
    fn test_minimal_toml_fills_defaults() {
        let toml = r#"
            [portal]
            base_url = "https://p.example.com"
            login_url = "https://p.example.com/login"
            inbox_url = "https://p.example.com/inbox"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.browser.headless);
        assert!(!config.navigation.report_trigger_selectors.is_empty());
        assert_eq!(config.download.poll_interval_secs, 3);
    }
}
