use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use report_automation::{Coordinator, Credentials};
use report_config::{Config, CredentialStore, PathManager};
use report_models::{RequestOutcome, SearchCriterion};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::output::Output;

pub fn criterion_from_args(id: Option<String>, title: Option<String>) -> Result<SearchCriterion> {
    match (id, title) {
        (Some(id), None) => Ok(SearchCriterion::id(id)),
        (None, Some(title)) => Ok(SearchCriterion::title(title)),
        (None, None) => Err(anyhow!("one of --id or --title is required")),
        (Some(_), Some(_)) => Err(anyhow!("--id and --title are mutually exclusive")),
    }
}

pub async fn run(
    paths: &PathManager,
    criterion: SearchCriterion,
    out: &Output,
) -> Result<RequestOutcome> {
    let config = Config::load(&paths.config_file()).map_err(|e| {
        anyhow!(
            "{}. Run `paperchase config init` to create the configuration.",
            e
        )
    })?;

    let mut store = CredentialStore::new(paths.credentials_file());
    store.load()?;
    let credentials = Credentials {
        username: store
            .get_portal_username()
            .ok_or_else(|| anyhow!("no portal username configured; run `paperchase config init`"))?
            .clone(),
        password: store
            .get_portal_password()
            .ok_or_else(|| anyhow!("no portal password configured; run `paperchase config init`"))?
            .clone(),
    };

    paths.ensure_directories()?;

    let coordinator = Coordinator::new(Arc::new(config), credentials, paths);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Fetching report for {}...", criterion.label()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    // A termination signal must close the session before exit so no
    // orphaned browser process survives us. The in-flight request is
    // abandoned; session-level cleanup still runs.
    let outcome = tokio::select! {
        outcome = coordinator.process_request(&criterion) => {
            spinner.finish_and_clear();
            coordinator.close_session().await;
            outcome
        }
        _ = tokio::signal::ctrl_c() => {
            spinner.finish_and_clear();
            warn!("Interrupted; closing browser session before exit");
            out.warn("Interrupted; closing browser session...");
            coordinator.close_session().await;
            RequestOutcome::failed("interrupted before the request completed")
        }
    };

    info!(
        success = outcome.success,
        message = %outcome.message,
        "Fetch request finished"
    );
    Ok(outcome)
}
