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

/// Flat key/value secret store persisted as `credentials.toml`.
///
/// Holds everything that should not live in `config.toml`: IMDb session
/// cookies, the Trakt login used for device activation, and the Trakt token
/// pair obtained by the device flow.
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
        Ok(())
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.credentials.get(key).filter(|value| !value.is_empty())
    }

    pub fn set(&mut self, key: String, value: String) {
        self.credentials.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.credentials.remove(key);
    }

    // IMDb session cookies
    pub fn get_imdb_cookie_at_main(&self) -> Option<&String> {
        self.get("imdb_cookie_at_main")
    }

    pub fn set_imdb_cookie_at_main(&mut self, cookie: String) {
        self.set("imdb_cookie_at_main".to_string(), cookie);
    }

    pub fn get_imdb_cookie_ubid_main(&self) -> Option<&String> {
        self.get("imdb_cookie_ubid_main")
    }

    pub fn set_imdb_cookie_ubid_main(&mut self, cookie: String) {
        self.set("imdb_cookie_ubid_main".to_string(), cookie);
    }

    // Trakt web login, used to activate the device code
    pub fn get_trakt_email(&self) -> Option<&String> {
        self.get("trakt_email")
    }

    pub fn set_trakt_email(&mut self, email: String) {
        self.set("trakt_email".to_string(), email);
    }

    pub fn get_trakt_password(&self) -> Option<&String> {
        self.get("trakt_password")
    }

    pub fn set_trakt_password(&mut self, password: String) {
        self.set("trakt_password".to_string(), password);
    }

    // Trakt token pair
    pub fn get_trakt_access_token(&self) -> Option<&String> {
        self.get("trakt_access_token")
    }

    pub fn set_trakt_access_token(&mut self, token: String) {
        self.set("trakt_access_token".to_string(), token);
    }

    pub fn get_trakt_refresh_token(&self) -> Option<&String> {
        self.get("trakt_refresh_token")
    }

    pub fn set_trakt_refresh_token(&mut self, token: String) {
        self.set("trakt_refresh_token".to_string(), token);
    }

    pub fn get_trakt_token_expires(&self) -> Option<DateTime<Utc>> {
        self.get("trakt_token_expires")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn set_trakt_token_expires(&mut self, expires: DateTime<Utc>) {
        self.set("trakt_token_expires".to_string(), expires.to_rfc3339());
    }

    /// Drop the stored Trakt token pair, forcing a new device flow on the next run
    pub fn clear_trakt_tokens(&mut self) {
        self.remove("trakt_access_token");
        self.remove("trakt_refresh_token");
        self.remove("trakt_token_expires");
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
        store.set_imdb_cookie_at_main("at-cookie".to_string());
        store.set_trakt_access_token("test_token".to_string());
        store.save().unwrap();

        let mut loaded_store = CredentialStore::new(path);
        loaded_store.load().unwrap();
        assert_eq!(loaded_store.get_imdb_cookie_at_main(), Some(&"at-cookie".to_string()));
        assert_eq!(loaded_store.get_trakt_access_token(), Some(&"test_token".to_string()));
        assert_eq!(loaded_store.get_imdb_cookie_ubid_main(), None);
    }

    #[test]
    fn test_credential_store_trakt_token_expires() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        let mut store = CredentialStore::new(path.clone());
        let expires = Utc::now() + chrono::Duration::hours(1);
        store.set_trakt_token_expires(expires);
        store.save().unwrap();

        let mut loaded_store = CredentialStore::new(path);
        loaded_store.load().unwrap();
        let loaded_expires = loaded_store.get_trakt_token_expires().unwrap();
        assert!((loaded_expires - expires).num_seconds().abs() < 2);
    }

    #[test]
    fn test_empty_values_read_as_missing() {
        let mut store = CredentialStore::new(PathBuf::from("/tmp/test"));
        store.set_trakt_email(String::new());
        assert_eq!(store.get_trakt_email(), None);
    }

    #[test]
    fn test_clear_trakt_tokens() {
        let mut store = CredentialStore::new(PathBuf::from("/tmp/test"));
        store.set_trakt_access_token("a".to_string());
        store.set_trakt_refresh_token("r".to_string());
        store.set_trakt_token_expires(Utc::now());
        store.set_trakt_email("me@example.com".to_string());

        store.clear_trakt_tokens();
        assert_eq!(store.get_trakt_access_token(), None);
        assert_eq!(store.get_trakt_refresh_token(), None);
        assert!(store.get_trakt_token_expires().is_none());
        assert_eq!(store.get_trakt_email(), Some(&"me@example.com".to_string()));
    }
}
