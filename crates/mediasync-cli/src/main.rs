use clap::{ArgAction, Parser, Subcommand};
use commands::{clear, config, daemon, sync};
use media_sync_config::SyncMode;
use std::path::PathBuf;

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "mediasync")]
#[command(about = "mediasync - Keep Trakt in step with your IMDb lists, ratings and watchlist")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync IMDb into Trakt once
    #[command(long_about = "Run one one-way sync from IMDb to Trakt. If no phase flags are given, every phase enabled in the configuration runs.")]
    Sync {
        /// Sync mode: full, add-only or dry-run (overrides the configuration)
        #[arg(long, value_name = "MODE")]
        mode: Option<SyncMode>,

        /// Shorthand for --mode dry-run
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "mode")]
        dry_run: bool,

        /// Sync custom lists
        #[arg(long, action = ArgAction::SetTrue)]
        lists: bool,

        /// Sync the watchlist
        #[arg(long, action = ArgAction::SetTrue)]
        watchlist: bool,

        /// Sync ratings
        #[arg(long, action = ArgAction::SetTrue)]
        ratings: bool,

        /// Sync watch history
        #[arg(long, action = ArgAction::SetTrue)]
        history: bool,

        /// Abort the run after this many seconds
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,
    },
    /// Run as daemon with internal scheduler
    #[command(long_about = "Run mediasync in the foreground and sync on the configured cron schedule. An initial sync runs on startup unless --no-startup-sync is given.")]
    Daemon {
        /// Cron schedule expression with seconds (e.g. '0 0 */6 * * *' for every 6 hours)
        #[arg(long, value_name = "SCHEDULE")]
        schedule: Option<String>,

        /// Skip initial sync on startup
        #[arg(long, action = ArgAction::SetTrue)]
        no_startup_sync: bool,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
    /// Clear cached data
    #[command(long_about = "Clear cached exports, stored Trakt tokens or the whole credentials file.")]
    Clear {
        /// Clear cache and credentials
        #[arg(long, action = ArgAction::SetTrue, conflicts_with_all = ["cache", "credentials", "tokens"])]
        all: bool,

        /// Clear cached IMDb exports and the browser profile
        #[arg(long, action = ArgAction::SetTrue)]
        cache: bool,

        /// Delete the credentials file
        #[arg(long, action = ArgAction::SetTrue)]
        credentials: bool,

        /// Forget the stored Trakt tokens (forces device authorization on next run)
        #[arg(long, action = ArgAction::SetTrue)]
        tokens: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration (masks sensitive data)
    Show {
        /// Show secrets unmasked
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,
    },
    /// Print where configuration, credentials, caches and logs live
    Paths,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let output = output::Output::new(cli.output, cli.quiet);

    match cli.command {
        Commands::Sync {
            mode,
            dry_run,
            lists,
            watchlist,
            ratings,
            history,
            timeout,
        } => {
            logging::init_logging(cli.verbose, cli.quiet).map_err(|e| color_eyre::eyre::eyre!("{}", e))?;
            let mode = if dry_run { Some(SyncMode::DryRun) } else { mode };
            let selection = sync::PhaseSelection {
                lists,
                watchlist,
                ratings,
                history,
            };
            sync::run_sync(cli.config, mode, selection, timeout, &output).await
        }
        Commands::Daemon {
            schedule,
            no_startup_sync,
        } => {
            let paths = media_sync_config::PathManager::default();
            logging::init_logging_with_file(cli.verbose, cli.quiet, Some(paths.daemon_log_file()))
                .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;
            daemon::run_daemon(cli.config, schedule, no_startup_sync, &output).await
        }
        Commands::Config { cmd } => {
            logging::init_logging(cli.verbose, cli.quiet).map_err(|e| color_eyre::eyre::eyre!("{}", e))?;
            config::run_config(cmd, cli.config, &output).await
        }
        Commands::Clear {
            all,
            cache,
            credentials,
            tokens,
        } => {
            logging::init_logging(cli.verbose, cli.quiet).map_err(|e| color_eyre::eyre::eyre!("{}", e))?;
            clear::run_clear(all, cache, credentials, tokens, &output).await
        }
    }
}
