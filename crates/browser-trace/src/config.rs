use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Controls what gets captured when the automation fails mid-request.
/// Failure screenshots are always on (the coordinator depends on them);
/// the heavier HTML/page-state dumps are opt-in via environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_true")]
    pub capture_screenshots: bool,

    #[serde(default = "default_capture_html")]
    pub capture_html: bool,

    #[serde(default = "default_capture_html")]
    pub capture_page_state: bool,
}

fn default_output_dir() -> PathBuf {
    env::var("PAPERCHASE_TRACE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./trace"))
}

fn default_true() -> bool {
    true
}

fn default_capture_html() -> bool {
    env::var("PAPERCHASE_TRACE")
        .map(|v| v == "1" || !v.is_empty())
        .unwrap_or(false)
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            capture_screenshots: true,
            capture_html: default_capture_html(),
            capture_page_state: default_capture_html(),
        }
    }
}

impl TraceConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_output_dir(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
