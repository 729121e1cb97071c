use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    pub trakt: TraktConfig,
    #[serde(default)]
    pub imdb: ImdbConfig,
    #[serde(default)]
    pub sync: SyncOptions,
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TraktConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ImdbConfig {
    /// Explicit `ls…` list ids. Empty means every list on the account.
    #[serde(default)]
    pub lists: Vec<String>,
}

/// How mutations are applied to the target.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Additions and removals are executed
    #[default]
    Full,
    /// Additions are executed, removals are only logged
    AddOnly,
    /// Nothing is executed, everything is logged
    DryRun,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::AddOnly => "add-only",
            SyncMode::DryRun => "dry-run",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(SyncMode::Full),
            "add-only" | "add_only" | "addonly" => Ok(SyncMode::AddOnly),
            "dry-run" | "dry_run" | "dryrun" => Ok(SyncMode::DryRun),
            other => Err(anyhow::anyhow!(
                "Invalid sync mode '{}' (expected full, add-only or dry-run)",
                other
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncOptions {
    #[serde(default)]
    pub mode: SyncMode,
    #[serde(default = "default_true")]
    pub lists: bool,
    #[serde(default = "default_true")]
    pub watchlist: bool,
    #[serde(default = "default_true")]
    pub ratings: bool,
    #[serde(default = "default_true")]
    pub history: bool,
    /// Overall run timeout; unset means no limit
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_max_concurrent_list_fetches")]
    pub max_concurrent_list_fetches: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            lists: true,
            watchlist: true,
            ratings: true,
            history: true,
            timeout_secs: None,
            max_concurrent_list_fetches: default_max_concurrent_list_fetches(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_schedule")]
    pub schedule: String,
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_list_fetches() -> usize {
    8
}

fn default_schedule() -> String {
    "0 0 */6 * * *".to_string() // Every 6 hours
}

pub fn default_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        schedule: default_schedule(),
        run_on_startup: default_true(),
    }
}

impl Config {
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.is_trakt_configured() {
            return Err(anyhow::anyhow!(
                "Trakt client_id and client_secret must be configured"
            ));
        }

        if self.sync.max_concurrent_list_fetches == 0 {
            return Err(anyhow::anyhow!("max_concurrent_list_fetches must be at least 1"));
        }

        if self.sync.timeout_secs == Some(0) {
            return Err(anyhow::anyhow!("timeout_secs must be positive when set"));
        }

        for id in &self.imdb.lists {
            if !id.starts_with("ls") {
                return Err(anyhow::anyhow!("Invalid IMDb list id: {}", id));
            }
        }

        Ok(())
    }

    pub fn is_trakt_configured(&self) -> bool {
        !self.trakt.client_id.is_empty()
            && self.trakt.client_id != "YOUR_CLIENT_ID"
            && !self.trakt.client_secret.is_empty()
            && self.trakt.client_secret != "YOUR_CLIENT_SECRET"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_config() -> Config {
        Config {
            trakt: TraktConfig {
                client_id: "test_id".to_string(),
                client_secret: "test_secret".to_string(),
            },
            imdb: ImdbConfig {
                lists: vec!["ls000000001".to_string()],
            },
            sync: SyncOptions {
                mode: SyncMode::AddOnly,
                history: false,
                ..SyncOptions::default()
            },
            scheduler: None,
        }
    }

    #[test]
    fn test_config_load_and_save() {
        let file = NamedTempFile::new().unwrap();
        let config = test_config();

        let path = file.path().to_path_buf();
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.trakt.client_id, "test_id");
        assert_eq!(loaded.trakt.client_secret, "test_secret");
        assert_eq!(loaded.imdb.lists, vec!["ls000000001".to_string()]);
        assert_eq!(loaded.sync.mode, SyncMode::AddOnly);
        assert!(loaded.sync.watchlist);
        assert!(!loaded.sync.history);
        assert_eq!(loaded.sync.max_concurrent_list_fetches, 8);
    }

    #[test]
    fn test_config_validate() {
        let mut config = test_config();
        config.trakt = TraktConfig {
            client_id: "YOUR_CLIENT_ID".to_string(),
            client_secret: "YOUR_CLIENT_SECRET".to_string(),
        };
        assert!(config.validate().is_err());
        assert!(!config.is_trakt_configured());

        config.trakt = TraktConfig {
            client_id: "real_id".to_string(),
            client_secret: "real_secret".to_string(),
        };
        assert!(config.validate().is_ok());
        assert!(config.is_trakt_configured());

        config.sync.max_concurrent_list_fetches = 0;
        assert!(config.validate().is_err());
        config.sync.max_concurrent_list_fetches = 4;

        config.imdb.lists.push("ur1234567".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let content = r#"
[trakt]
client_id = "id"
client_secret = "secret"

[sync]
mode = "dry-run"
"#;
        let config: Config = toml::from_str(content).unwrap();
        assert_eq!(config.sync.mode, SyncMode::DryRun);
        assert!(config.sync.lists);
        assert!(config.sync.ratings);
        assert!(config.sync.timeout_secs.is_none());
        assert!(config.imdb.lists.is_empty());
        assert!(config.scheduler.is_none());
    }

    #[test]
    fn test_sync_mode_parsing() {
        assert_eq!("full".parse::<SyncMode>().unwrap(), SyncMode::Full);
        assert_eq!("add-only".parse::<SyncMode>().unwrap(), SyncMode::AddOnly);
        assert_eq!("DRY_RUN".parse::<SyncMode>().unwrap(), SyncMode::DryRun);
        assert!("mirror".parse::<SyncMode>().is_err());
        assert_eq!(SyncMode::AddOnly.to_string(), "add-only");
    }
}
