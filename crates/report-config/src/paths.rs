use anyhow::Result;
use std::path::{Path, PathBuf};

/// Get the container base path from environment variable, defaulting to "/app"
pub fn container_base_path() -> PathBuf {
    std::env::var("PAPERCHASE_BASE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/app"))
}

pub struct PathManager {
    config_dir: PathBuf,
    data_dir: PathBuf,
    log_dir: PathBuf,
}

impl PathManager {
    pub fn new() -> Result<Self> {
        let base_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("paperchase");

        Ok(Self {
            config_dir: base_dir.clone(),
            data_dir: base_dir.join("data"),
            log_dir: base_dir.join("logs"),
        })
    }

    pub fn from_container_env() -> Self {
        let base = container_base_path();
        // In containers, config files live at the base level, data/logs in subdirs
        Self {
            config_dir: base.clone(),
            data_dir: base.join("data"),
            log_dir: base.join("logs"),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.config_dir.join("credentials.toml")
    }

    /// Canonical destination for confirmed report artifacts.
    pub fn artifact_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    /// Browser profile directory so the signed-in state survives restarts.
    pub fn browser_profile_dir(&self) -> PathBuf {
        self.data_dir.join("browser")
    }

    /// Scratch directory the browser downloads into before confirmation.
    pub fn download_scratch_dir(&self) -> PathBuf {
        std::env::temp_dir().join("paperchase_downloads")
    }

    /// Where failure screenshots and page-state dumps land.
    pub fn trace_dir(&self) -> PathBuf {
        self.data_dir.join("trace")
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join("paperchase.log")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        std::fs::create_dir_all(self.artifact_dir())?;
        std::fs::create_dir_all(self.browser_profile_dir())?;
        std::fs::create_dir_all(self.trace_dir())?;
        Ok(())
    }
}

impl Default for PathManager {
    fn default() -> Self {
        // A pre-existing container base directory indicates we run containerized
        let base = container_base_path();
        if base.exists() {
            return Self::from_container_env();
        }

        Self::new().unwrap_or_else(|_| Self::from_container_env())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_paths_hang_off_config_dir() {
        let pm = PathManager {
            config_dir: PathBuf::from("/cfg"),
            data_dir: PathBuf::from("/cfg/data"),
            log_dir: PathBuf::from("/cfg/logs"),
        };
        assert_eq!(pm.config_file(), PathBuf::from("/cfg/config.toml"));
        assert_eq!(pm.credentials_file(), PathBuf::from("/cfg/credentials.toml"));
        assert_eq!(pm.artifact_dir(), PathBuf::from("/cfg/data/reports"));
        assert_eq!(pm.log_file(), PathBuf::from("/cfg/logs/paperchase.log"));
    }
}
