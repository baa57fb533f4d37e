use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The only externally observable result of a fetch request. Every internal
/// failure is flattened into `success = false` plus a human-readable
/// message; callers never see raw automation errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
}

impl RequestOutcome {
    pub fn succeeded(message: impl Into<String>, file_path: PathBuf) -> Self {
        Self {
            success: true,
            message: message.into(),
            file_path: Some(file_path),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            file_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_carries_path() {
        let outcome = RequestOutcome::succeeded("done", PathBuf::from("/tmp/report.pdf"));
        assert!(outcome.success);
        assert_eq!(outcome.file_path, Some(PathBuf::from("/tmp/report.pdf")));
    }

    #[test]
    fn test_failed_omits_path_in_json() {
        let outcome = RequestOutcome::failed("submission not found");
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(!json.contains("filePath"));
    }

    #[test]
    fn test_camel_case_field_names() {
        let outcome = RequestOutcome::succeeded("ok", PathBuf::from("a.pdf"));
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"filePath\""));
    }
}
