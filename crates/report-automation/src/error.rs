use thiserror::Error;

/// Failure taxonomy for one fetch request. Expected conditions travel as
/// the named variants; anything the automation did not anticipate lands in
/// `Other` and gets a diagnostic capture at the coordinator boundary.
#[derive(Debug, Error)]
pub enum AutomationError {
    /// The login handshake never reached the inbox. Needs operator
    /// intervention (fresh credentials, captcha), so callers must not
    /// retry automatically.
    #[error("login required: session handshake did not reach the inbox view")]
    LoginRequired,

    /// No inbox row matched the criterion. Not retried.
    #[error("submission matching {criterion} not found in the inbox")]
    NotFound { criterion: String },

    /// A bounded wait expired. The stage names which one.
    #[error("timed out waiting for {stage}")]
    Timeout { stage: String },

    /// Navigation landed somewhere that does not match the expected URL
    /// pattern. Carries the actual URL as a UI-drift signal.
    #[error("navigation landed on unexpected page: {url}")]
    UnexpectedPage { url: String },

    /// Navigation succeeded but no matching file appeared within the poll
    /// budget. Unconfirmed, not definitely failed - slow downloads are a
    /// known false negative.
    #[error("report download could not be confirmed on disk")]
    DownloadUnconfirmed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AutomationError {
    pub fn timeout(stage: impl Into<String>) -> Self {
        AutomationError::Timeout { stage: stage.into() }
    }

    /// True for conditions that leave the session itself healthy enough to
    /// serve the next request without a relaunch.
    pub fn is_expected(&self) -> bool {
        !matches!(self, AutomationError::Other(_))
    }
}

pub type Result<T> = std::result::Result<T, AutomationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_mentions_not_found() {
        let err = AutomationError::NotFound {
            criterion: "title \"My Essay\"".to_string(),
        };
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_expected_classification() {
        assert!(AutomationError::DownloadUnconfirmed.is_expected());
        assert!(AutomationError::timeout("first hop").is_expected());
        assert!(!AutomationError::Other(anyhow::anyhow!("boom")).is_expected());
    }
}
