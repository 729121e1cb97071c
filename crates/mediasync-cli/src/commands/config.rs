use super::sync::load_credentials;
use crate::output::{check_mark, styled_table, Output, OutputFormat};
use crate::ConfigCommands;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use comfy_table::{Attribute, Cell, Table};
use media_sync_config::{Config, CredentialStore, PathManager};
use serde_json::json;
use std::path::PathBuf;

pub async fn run_config(cmd: ConfigCommands, config_path: Option<PathBuf>, output: &Output) -> Result<()> {
    let paths = PathManager::default();
    match cmd {
        ConfigCommands::Show { full } => show_config(full, config_path, &paths, output),
        ConfigCommands::Paths => show_paths(&paths, output),
    }
}

fn show_config(full: bool, config_path: Option<PathBuf>, paths: &PathManager, output: &Output) -> Result<()> {
    let config_file = config_path.unwrap_or_else(|| paths.config_file());
    if !config_file.exists() {
        output.warn(format!("Configuration file not found at: {}", config_file.display()));
        return Ok(());
    }

    // Not validated: show is how a broken config gets inspected
    let config = Config::load_from_file(&config_file)
        .map_err(|e| eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
    let credentials = load_credentials(paths)?;
    let secret = |value: Option<&String>| match value {
        Some(v) if full => v.clone(),
        Some(v) => mask_string(v),
        None => "<not set>".to_string(),
    };

    match output.format() {
        OutputFormat::Human => {
            if output.is_quiet() {
                return Ok(());
            }

            let mut info_table = Table::new();
            info_table.set_header(vec![
                Cell::new("Config File").add_attribute(Attribute::Bold),
                Cell::new(config_file.display().to_string()),
            ]);
            info_table.load_preset(comfy_table::presets::UTF8_FULL);
            info_table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
            output.table(&info_table);

            let mut trakt = styled_table("Trakt Configuration");
            trakt.add_row(vec![Cell::new("Client ID"), Cell::new(secret(Some(&config.trakt.client_id)))]);
            trakt.add_row(vec![Cell::new("Client Secret"), Cell::new(secret(Some(&config.trakt.client_secret)))]);
            trakt.add_row(vec![Cell::new("Email"), Cell::new(secret(credentials.get_trakt_email()))]);
            trakt.add_row(vec![Cell::new("Password"), Cell::new(secret(credentials.get_trakt_password()))]);
            trakt.add_row(vec![
                Cell::new("Authorized"),
                Cell::new(check_mark(credentials.get_trakt_refresh_token().is_some())),
            ]);
            if let Some(expires) = credentials.get_trakt_token_expires() {
                trakt.add_row(vec![Cell::new("Token Expires"), Cell::new(expires.to_rfc3339())]);
            }
            output.table(&trakt);

            let mut imdb = styled_table("IMDb Configuration");
            let lists = if config.imdb.lists.is_empty() {
                "all lists on the account".to_string()
            } else {
                config.imdb.lists.join(", ")
            };
            imdb.add_row(vec![Cell::new("Lists"), Cell::new(lists)]);
            imdb.add_row(vec![Cell::new("at-main Cookie"), Cell::new(secret(credentials.get_imdb_cookie_at_main()))]);
            imdb.add_row(vec![Cell::new("ubid-main Cookie"), Cell::new(secret(credentials.get_imdb_cookie_ubid_main()))]);
            output.table(&imdb);

            let mut sync = styled_table("Sync Options");
            sync.add_row(vec![Cell::new("Mode"), Cell::new(config.sync.mode.as_str())]);
            sync.add_row(vec![Cell::new("Sync Lists"), Cell::new(check_mark(config.sync.lists))]);
            sync.add_row(vec![Cell::new("Sync Watchlist"), Cell::new(check_mark(config.sync.watchlist))]);
            sync.add_row(vec![Cell::new("Sync Ratings"), Cell::new(check_mark(config.sync.ratings))]);
            sync.add_row(vec![Cell::new("Sync History"), Cell::new(check_mark(config.sync.history))]);
            sync.add_row(vec![
                Cell::new("Timeout"),
                Cell::new(
                    config
                        .sync
                        .timeout_secs
                        .map(|s| format!("{}s", s))
                        .unwrap_or_else(|| "none".to_string()),
                ),
            ]);
            sync.add_row(vec![
                Cell::new("Concurrent List Fetches"),
                Cell::new(config.sync.max_concurrent_list_fetches),
            ]);
            output.table(&sync);

            if let Some(scheduler) = &config.scheduler {
                let mut table = styled_table("Scheduler Configuration");
                table.add_row(vec![Cell::new("Schedule"), Cell::new(&scheduler.schedule)]);
                table.add_row(vec![Cell::new("Run on Startup"), Cell::new(check_mark(scheduler.run_on_startup))]);
                output.table(&table);
            }

            if let Err(e) = config.validate() {
                output.warn(format!("Configuration is not valid yet: {}", e));
            }
        }
        OutputFormat::Json | OutputFormat::JsonPretty => {
            output.json(&json!({
                "config_file": config_file.display().to_string(),
                "valid": config.validate().is_ok(),
                "trakt": {
                    "client_id": secret(Some(&config.trakt.client_id)),
                    "client_secret": secret(Some(&config.trakt.client_secret)),
                    "email": secret(credentials.get_trakt_email()),
                    "authorized": credentials.get_trakt_refresh_token().is_some(),
                },
                "imdb": {
                    "lists": &config.imdb.lists,
                    "authenticated": has_imdb_cookies(&credentials),
                },
                "sync": {
                    "mode": config.sync.mode.as_str(),
                    "lists": config.sync.lists,
                    "watchlist": config.sync.watchlist,
                    "ratings": config.sync.ratings,
                    "history": config.sync.history,
                    "timeout_secs": config.sync.timeout_secs,
                    "max_concurrent_list_fetches": config.sync.max_concurrent_list_fetches,
                },
                "scheduler": config.scheduler.as_ref().map(|s| json!({
                    "schedule": s.schedule,
                    "run_on_startup": s.run_on_startup,
                })),
            }));
        }
    }

    Ok(())
}

fn show_paths(paths: &PathManager, output: &Output) -> Result<()> {
    let entries = [
        ("config", paths.config_file()),
        ("credentials", paths.credentials_file()),
        ("exports", paths.export_cache_dir()),
        ("browser", paths.browser_dir()),
        ("log", paths.daemon_log_file()),
    ];

    match output.format() {
        OutputFormat::Human => {
            let mut table = styled_table("Paths");
            for (name, path) in &entries {
                table.add_row(vec![Cell::new(name), Cell::new(path.display().to_string())]);
            }
            output.table(&table);
        }
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let map: serde_json::Map<String, serde_json::Value> = entries
                .iter()
                .map(|(name, path)| (name.to_string(), json!(path.display().to_string())))
                .collect();
            output.json(&serde_json::Value::Object(map));
        }
    }
    Ok(())
}

fn has_imdb_cookies(credentials: &CredentialStore) -> bool {
    credentials.get_imdb_cookie_at_main().is_some() && credentials.get_imdb_cookie_ubid_main().is_some()
}

fn mask_string(s: &str) -> String {
    if s.is_empty() || s == "YOUR_CLIENT_ID" || s == "YOUR_CLIENT_SECRET" {
        return "<not set>".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_string() {
        assert_eq!(mask_string(""), "<not set>");
        assert_eq!(mask_string("YOUR_CLIENT_ID"), "<not set>");
        assert_eq!(mask_string("abc"), "***");
        assert_eq!(mask_string("0123456789abcdef"), "01***ef");
        assert_eq!(mask_string("héllo wörld"), "hé***ld");
    }
}
