use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use media_sync_config::{CredentialStore, PathManager};
use std::fs;
use std::path::Path;

pub async fn run_clear(all: bool, cache: bool, credentials: bool, tokens: bool, output: &Output) -> Result<()> {
    let paths = PathManager::default();

    if all {
        clear_cache(&paths, output)?;
        clear_credentials(&paths, output)?;
        output.success("All cache and credentials cleared");
        return Ok(());
    }

    if cache {
        clear_cache(&paths, output)?;
    }
    if credentials {
        clear_credentials(&paths, output)?;
    } else if tokens {
        clear_tokens(&paths, output)?;
    }

    if !(cache || credentials || tokens) {
        output.warn("No clear option specified. Use --cache, --credentials, --tokens, or --all");
        output.info("\nExample: mediasync clear --cache");
    }

    Ok(())
}

fn remove_dir(dir: &Path, label: &str, output: &Output) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)
            .map_err(|e| eyre!("Failed to remove {} at {}: {}", label, dir.display(), e))?;
        output.success(format!("Cleared {}: {}", label, dir.display()));
    } else {
        output.info(format!("No {} found to clear", label));
    }
    Ok(())
}

fn clear_cache(paths: &PathManager, output: &Output) -> Result<()> {
    remove_dir(&paths.export_cache_dir(), "IMDb export cache", output)?;
    remove_dir(&paths.browser_dir(), "browser profile", output)
}

fn clear_credentials(paths: &PathManager, output: &Output) -> Result<()> {
    let credentials_file = paths.credentials_file();
    if credentials_file.exists() {
        fs::remove_file(&credentials_file)
            .map_err(|e| eyre!("Failed to remove credentials file at {}: {}", credentials_file.display(), e))?;
        output.success(format!("Cleared credentials: {}", credentials_file.display()));
    } else {
        output.info("No credentials file found to clear");
    }
    Ok(())
}

fn clear_tokens(paths: &PathManager, output: &Output) -> Result<()> {
    let credentials_file = paths.credentials_file();
    if !credentials_file.exists() {
        output.info("No credentials file found, nothing to clear");
        return Ok(());
    }

    let mut store = CredentialStore::new(credentials_file);
    store.load().map_err(|e| eyre!("Failed to load credentials: {}", e))?;
    if store.get_trakt_refresh_token().is_none() && store.get_trakt_access_token().is_none() {
        output.info("No Trakt tokens stored");
        return Ok(());
    }
    store.clear_trakt_tokens();
    store.save().map_err(|e| eyre!("Failed to save credentials: {}", e))?;
    output.success("Cleared stored Trakt tokens");
    Ok(())
}
