use anyhow::Result;
use report_config::{Config, CredentialStore, PathManager};
use std::io::{self, Write};

use crate::output::Output;

/// Interactive first-time setup: portal base URL, username, password.
/// The generated config.toml carries the default selector strategies and
/// timeouts, ready to be tuned by hand for the actual portal.
pub fn init(out: &Output) -> Result<()> {
    let paths = PathManager::default();
    paths.ensure_directories()?;

    let base_url = prompt("Portal base URL (e.g. https://portal.example.com): ")?;
    let username = prompt("Portal username: ")?;
    let password = rpassword::prompt_password("Portal password: ")?;

    let config_path = paths.config_file();
    if config_path.exists() {
        out.warn(format!(
            "Overwriting existing configuration at {}",
            config_path.display()
        ));
    }

    let config = Config::example(&base_url);
    config.save(&config_path)?;

    let mut store = CredentialStore::new(paths.credentials_file());
    store.load()?;
    store.set_portal_username(username);
    store.set_portal_password(password);
    store.save()?;

    out.success(format!("Configuration written to {}", config_path.display()));
    out.info("Review the [navigation] selector lists in config.toml and adjust them to the portal's DOM.");
    Ok(())
}

/// Print the current configuration with credentials masked.
pub fn show(out: &Output) -> Result<()> {
    let paths = PathManager::default();

    let config = Config::load(&paths.config_file())?;
    out.info(format!("Config file: {}", paths.config_file().display()));
    out.info(format!("Portal base URL:  {}", config.portal.base_url));
    out.info(format!("Inbox URL:        {}", config.portal.inbox_url));
    out.info(format!(
        "Artifact dir:     {}",
        config
            .download
            .artifact_dir
            .clone()
            .unwrap_or_else(|| paths.artifact_dir())
            .display()
    ));
    out.info(format!(
        "Hop timeout:      {}s, render timeout: {}s",
        config.navigation.hop_timeout_secs, config.navigation.render_timeout_secs
    ));
    out.info(format!(
        "Download polling: {} attempts x {}s, recency window {}s, fuzzy threshold {}",
        config.download.poll_attempts,
        config.download.poll_interval_secs,
        config.download.recency_window_secs,
        config.download.fuzzy_word_threshold
    ));

    let mut store = CredentialStore::new(paths.credentials_file());
    store.load()?;
    let username = store
        .get_portal_username()
        .cloned()
        .unwrap_or_else(|| "<not set>".to_string());
    let password = if store.get_portal_password().is_some() {
        "********"
    } else {
        "<not set>"
    };
    out.info(format!("Portal username:  {}", username));
    out.info(format!("Portal password:  {}", password));

    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
