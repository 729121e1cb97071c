use super::sync::{build_orchestrator, load_config};
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use media_sync_config::{default_scheduler_config, PathManager, SchedulerConfig};
use media_sync_core::SyncOrchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs the orchestrator on a cron schedule. Overlapping runs are skipped.
pub struct Scheduler {
    scheduler: JobScheduler,
    orchestrator: Arc<SyncOrchestrator>,
    running: Arc<Mutex<()>>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub async fn new(orchestrator: SyncOrchestrator, config: SchedulerConfig) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| eyre!("Failed to create job scheduler: {}", e))?;

        Ok(Self {
            scheduler,
            orchestrator: Arc::new(orchestrator),
            running: Arc::new(Mutex::new(())),
            config,
        })
    }

    /// Start the schedule and block until `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        if self.config.run_on_startup {
            info!(operation = "scheduler_startup", "Running initial sync on startup");
            run_once(&self.orchestrator, &self.running).await;
        }

        let orchestrator = self.orchestrator.clone();
        let running = self.running.clone();
        let job = Job::new_async(self.config.schedule.as_str(), move |_id, _scheduler| {
            let orchestrator = orchestrator.clone();
            let running = running.clone();
            Box::pin(async move {
                info!(operation = "scheduled_sync_start", "Starting scheduled sync");
                run_once(&orchestrator, &running).await;
            })
        })
        .map_err(|e| eyre!("Invalid cron schedule '{}': {}", self.config.schedule, e))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| eyre!("Failed to add sync job: {}", e))?;
        self.scheduler
            .start()
            .await
            .map_err(|e| eyre!("Failed to start scheduler: {}", e))?;

        info!(
            operation = "scheduler_started",
            schedule = %self.config.schedule,
            "Scheduler started"
        );

        shutdown.cancelled().await;
        info!(operation = "scheduler_stopping", "Stopping scheduler");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| eyre!("Failed to stop scheduler: {}", e))?;
        Ok(())
    }
}

async fn run_once(orchestrator: &SyncOrchestrator, running: &Mutex<()>) {
    let Ok(_guard) = running.try_lock() else {
        warn!(operation = "scheduled_sync_skipped", "Previous sync still running, skipping this run");
        return;
    };

    match orchestrator.sync().await {
        Ok(report) => {
            info!(
                operation = "scheduled_sync_complete",
                lists_added = report.lists.applied_add,
                ratings_added = report.ratings.applied_add,
                history_added = report.history.applied_add,
                duration_ms = report.duration.as_millis() as u64,
                "Scheduled sync completed successfully"
            );
        }
        Err(e) => {
            error!(operation = "scheduled_sync_error", error = %format!("{:#}", e), "Scheduled sync failed");
        }
    }
}

/// Pick the effective scheduler settings from config and flags.
fn scheduler_config(
    configured: Option<&SchedulerConfig>,
    schedule_override: Option<String>,
    no_startup_sync: bool,
) -> SchedulerConfig {
    let defaults = default_scheduler_config();
    let configured = configured.unwrap_or(&defaults);
    SchedulerConfig {
        schedule: schedule_override.unwrap_or_else(|| configured.schedule.clone()),
        run_on_startup: configured.run_on_startup && !no_startup_sync,
    }
}

pub async fn run_daemon(
    config_path: Option<PathBuf>,
    schedule_override: Option<String>,
    no_startup_sync: bool,
    output: &Output,
) -> Result<()> {
    let paths = PathManager::default();
    let config = load_config(config_path, &paths)?;
    let scheduler_config = scheduler_config(config.scheduler.as_ref(), schedule_override, no_startup_sync);

    let shutdown = CancellationToken::new();
    super::sync::cancel_on_ctrl_c(shutdown.clone());

    let orchestrator = build_orchestrator(&config, &paths, shutdown.clone())?;
    output.info(format!(
        "Daemon running with schedule '{}', logs in {}",
        scheduler_config.schedule,
        paths.daemon_log_file().display()
    ));

    let scheduler = Scheduler::new(orchestrator, scheduler_config).await?;
    scheduler.run(shutdown).await
}
