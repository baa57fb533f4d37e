use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use toml;

#[derive(Debug, Serialize, Deserialize, Default)]
struct CredentialsData {
    #[serde(flatten)]
    data: HashMap<String, String>,
}

/// Key/value credential file, kept separate from config.toml so the config
/// can be shared or committed without secrets.
pub struct CredentialStore {
    path: PathBuf,
    credentials: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            credentials: HashMap::new(),
        }
    }

    pub fn load(&mut self) -> Result<()> {
        if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)?;
            let creds_data: CredentialsData = toml::from_str(&content)?;
            self.credentials = creds_data.data;
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let creds_data = CredentialsData {
            data: self.credentials.clone(),
        };
        let content = toml::to_string_pretty(&creds_data)?;
        std::fs::write(&self.path, content)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.credentials.get(key)
    }

    pub fn set(&mut self, key: String, value: String) {
        self.credentials.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.credentials.remove(key);
    }

    // Convenience methods for the portal credentials
    pub fn get_portal_username(&self) -> Option<&String> {
        self.get("portal_username")
    }

    pub fn set_portal_username(&mut self, username: String) {
        self.set("portal_username".to_string(), username);
    }

    pub fn get_portal_password(&self) -> Option<&String> {
        self.get("portal_password")
    }

    pub fn set_portal_password(&mut self, password: String) {
        self.set("portal_password".to_string(), password);
    }

    pub fn get_last_successful_login(&self) -> Option<DateTime<Utc>> {
        self.get("last_successful_login")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn set_last_successful_login(&mut self, when: DateTime<Utc>) {
        self.set("last_successful_login".to_string(), when.to_rfc3339());
    }

    pub fn get_all_keys(&self) -> Vec<String> {
        self.credentials.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_credential_store_load_and_save() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        let mut store = CredentialStore::new(path.clone());
        store.set_portal_username("grader@example.com".to_string());
        store.set_portal_password("hunter2".to_string());
        store.save().unwrap();

        let mut loaded = CredentialStore::new(path);
        loaded.load().unwrap();
        assert_eq!(
            loaded.get_portal_username(),
            Some(&"grader@example.com".to_string())
        );
        assert_eq!(loaded.get_portal_password(), Some(&"hunter2".to_string()));
    }

    #[test]
    fn test_last_login_timestamp_roundtrip() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        let mut store = CredentialStore::new(path.clone());
        let when = Utc::now();
        store.set_last_successful_login(when);
        store.save().unwrap();

        let mut loaded = CredentialStore::new(path);
        loaded.load().unwrap();
        let loaded_when = loaded.get_last_successful_login().unwrap();
        assert!((loaded_when - when).num_seconds().abs() < 2);
    }

    #[test]
    fn test_remove() {
        let mut store = CredentialStore::new(PathBuf::from("/tmp/creds"));
        store.set("a".to_string(), "1".to_string());
        store.set("b".to_string(), "2".to_string());

        store.remove("a");
        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b"), Some(&"2".to_string()));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let mut store = CredentialStore::new(PathBuf::from("/nonexistent/creds.toml"));
        store.load().unwrap();
        assert!(store.get_all_keys().is_empty());
    }
}
