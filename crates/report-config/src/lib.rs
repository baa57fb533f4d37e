pub mod config;
pub mod credentials;
pub mod paths;

pub use config::{BrowserConfig, Config, DownloadConfig, NavigationConfig, PortalConfig};
pub use credentials::CredentialStore;
pub use paths::{container_base_path, PathManager};
