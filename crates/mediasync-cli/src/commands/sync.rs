use crate::output::Output;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use media_sync_config::{Config, CredentialStore, PathManager, SyncMode, SyncOptions};
use media_sync_core::SyncOrchestrator;
use media_sync_sources::trakt::{build_transport, BrowserActivator, TransportSettings, TRAKT_API_URL};
use media_sync_sources::{ImdbCookies, ImdbSource, TraktClient};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Phases requested on the command line; none set means "as configured".
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseSelection {
    pub lists: bool,
    pub watchlist: bool,
    pub ratings: bool,
    pub history: bool,
}

impl PhaseSelection {
    fn any(&self) -> bool {
        self.lists || self.watchlist || self.ratings || self.history
    }

    /// Restrict `options` to the selected phases.
    pub fn apply(&self, options: &mut SyncOptions) {
        if !self.any() {
            return;
        }
        options.lists = self.lists;
        options.watchlist = self.watchlist;
        options.ratings = self.ratings;
        options.history = self.history;
    }
}

pub fn load_config(config_path: Option<PathBuf>, paths: &PathManager) -> Result<Config> {
    let config_file = config_path.unwrap_or_else(|| paths.config_file());
    if !config_file.exists() {
        return Err(eyre!(
            "Configuration file not found at {}. Create it with [trakt] client_id/client_secret and optional [imdb] lists.",
            config_file.display()
        ));
    }
    let config = Config::load_from_file(&config_file)
        .map_err(|e| eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
    config
        .validate()
        .map_err(|e| eyre!("Configuration validation failed: {}", e))?;
    Ok(config)
}

pub fn load_credentials(paths: &PathManager) -> Result<CredentialStore> {
    let credentials_file = paths.credentials_file();
    let mut store = CredentialStore::new(credentials_file.clone());
    store
        .load()
        .map_err(|e| eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;
    Ok(store)
}

/// Wire IMDb, the Trakt transport stack and the orchestrator together.
pub fn build_orchestrator(
    config: &Config,
    paths: &PathManager,
    cancel: CancellationToken,
) -> Result<SyncOrchestrator> {
    paths
        .ensure_directories()
        .map_err(|e| eyre!("Failed to create data directories: {}", e))?;
    let credentials = load_credentials(paths)?;

    let cookies = ImdbCookies::from_parts(
        credentials.get_imdb_cookie_at_main().cloned(),
        credentials.get_imdb_cookie_ubid_main().cloned(),
    );
    if cookies.is_none() {
        warn!("IMDb cookies not configured, only explicitly configured lists will be synced");
    }
    let source = ImdbSource::new(cookies, paths.export_cache_dir()).wrap_err("Failed to create IMDb client")?;

    let has_tokens = credentials.get_trakt_refresh_token().is_some();
    let email = credentials.get_trakt_email().cloned();
    let password = credentials.get_trakt_password().cloned();
    if !has_tokens && (email.is_none() || password.is_none()) {
        return Err(eyre!(
            "No stored Trakt tokens and no trakt_email/trakt_password in {} to authorize a new device",
            credentials.path().display()
        ));
    }
    let activator = BrowserActivator::new(
        email.unwrap_or_default(),
        password.unwrap_or_default(),
        paths.browser_dir(),
    );

    let transport = build_transport(
        TransportSettings {
            base_url: TRAKT_API_URL.to_string(),
            client_id: config.trakt.client_id.clone(),
            client_secret: config.trakt.client_secret.clone(),
            credentials_file: Some(paths.credentials_file()),
            cancel: cancel.clone(),
        },
        Arc::new(activator),
    );
    let target = TraktClient::new(transport).with_max_concurrent_fetches(config.sync.max_concurrent_list_fetches);

    debug!(mode = %config.sync.mode, lists = config.imdb.lists.len(), "Built sync orchestrator");
    Ok(SyncOrchestrator::new(
        Arc::new(source),
        Arc::new(target),
        config.sync.clone(),
        config.imdb.lists.clone(),
    )
    .with_cancellation(cancel))
}

/// Cancel `token` on Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(operation = "shutdown", "Interrupt received, cancelling");
            token.cancel();
        }
    });
}

pub async fn run_sync(
    config_path: Option<PathBuf>,
    mode: Option<SyncMode>,
    selection: PhaseSelection,
    timeout: Option<u64>,
    output: &Output,
) -> Result<()> {
    debug!("Sync command started");

    let paths = PathManager::default();
    let mut config = load_config(config_path, &paths)?;
    if let Some(mode) = mode {
        config.sync.mode = mode;
    }
    if timeout.is_some() {
        config.sync.timeout_secs = timeout;
    }
    selection.apply(&mut config.sync);

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let orchestrator = build_orchestrator(&config, &paths, cancel)?;
    let report = match orchestrator.sync().await {
        Ok(report) => report,
        Err(e) => {
            output.error(format!("Sync failed: {:#}", e));
            return Err(eyre!("Sync operation failed: {}", e));
        }
    };

    if report.mode == SyncMode::DryRun {
        output.info("Dry-run mode: no changes were made on Trakt, planned payloads are in the log");
    }
    output.sync_report(&report);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_selection_keeps_configured_phases() {
        let mut options = SyncOptions {
            history: false,
            ..SyncOptions::default()
        };
        PhaseSelection::default().apply(&mut options);
        assert!(options.lists && options.watchlist && options.ratings);
        assert!(!options.history);
    }

    #[test]
    fn test_selection_restricts_phases() {
        let mut options = SyncOptions::default();
        let selection = PhaseSelection {
            ratings: true,
            ..PhaseSelection::default()
        };
        selection.apply(&mut options);
        assert!(options.ratings);
        assert!(!options.lists && !options.watchlist && !options.history);
    }

    #[test]
    fn test_missing_config_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathManager::with_base(dir.path().to_path_buf());
        let err = load_config(None, &paths).unwrap_err();
        assert!(err.to_string().contains("Configuration file not found"));
    }
}
