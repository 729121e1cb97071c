use anyhow::{anyhow, Context, Result};
use media_sync_config::{SyncMode, SyncOptions};
use media_sync_models::{Diff, IdMeta, Item, List};
use media_sync_sources::trakt::api::{TraktItem, TraktList};
use media_sync_sources::{SourceProvider, TargetProvider, TraktError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::diff;
use crate::policy::SyncPolicy;

/// Counts for one phase of a run.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PhaseReport {
    pub ran: bool,
    pub planned_add: usize,
    pub planned_remove: usize,
    pub applied_add: usize,
    pub applied_remove: usize,
}

impl PhaseReport {
    /// Removals computed but not executed because of the sync mode
    pub fn skipped_removals(&self) -> usize {
        self.planned_remove - self.applied_remove
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub lists: PhaseReport,
    pub ratings: PhaseReport,
    pub history: PhaseReport,
    /// Target lists created because they were missing
    pub lists_created: usize,
    pub duration: Duration,
}

/// A source list paired with its target counterpart
struct ListPair {
    source: List,
    target: TraktList,
}

struct Hydrated {
    lists: Vec<ListPair>,
    ratings: Option<Diff>,
}

/// Runs one one-way sync: Hydrate, Lists, Ratings, History, in that order.
pub struct SyncOrchestrator {
    source: Arc<dyn SourceProvider>,
    target: Arc<dyn TargetProvider>,
    policy: SyncPolicy,
    options: SyncOptions,
    list_ids: Vec<String>,
    cancel: CancellationToken,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn SourceProvider>,
        target: Arc<dyn TargetProvider>,
        options: SyncOptions,
        list_ids: Vec<String>,
    ) -> Self {
        Self {
            source,
            target,
            policy: SyncPolicy::new(options.mode),
            options,
            list_ids,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the sync, honoring cancellation and the configured timeout.
    /// Mutations made before a failure are not rolled back.
    pub async fn sync(&self) -> Result<SyncReport> {
        let guarded = async {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(anyhow!(TraktError::Cancelled)),
                result = self.run() => result,
            }
        };

        match self.options.timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), guarded)
                .await
                .map_err(|_| anyhow!("sync timed out after {}s", secs))?,
            None => guarded.await,
        }
    }

    #[instrument(skip(self), fields(source = self.source.source_name(), mode = %self.policy.mode()))]
    async fn run(&self) -> Result<SyncReport> {
        let start = Instant::now();
        let mut report = SyncReport {
            mode: self.policy.mode(),
            lists: PhaseReport::default(),
            ratings: PhaseReport::default(),
            history: PhaseReport::default(),
            lists_created: 0,
            duration: Duration::ZERO,
        };

        info!("Starting sync");
        let hydrated = self.hydrate(&mut report).await.context("hydrate phase failed")?;

        self.sync_lists(&hydrated.lists, &mut report.lists)
            .await
            .context("list sync failed")?;

        match (&hydrated.ratings, self.options.ratings) {
            (Some(ratings), true) => self
                .sync_ratings(ratings, &mut report.ratings)
                .await
                .context("ratings sync failed")?,
            _ => info!(phase = "ratings", "Skipping ratings sync"),
        }

        match (&hydrated.ratings, self.options.history) {
            (Some(ratings), true) => self
                .sync_history(ratings, &mut report.history)
                .await
                .context("history sync failed")?,
            _ => info!(phase = "history", "Skipping history sync"),
        }

        report.duration = start.elapsed();
        info!(
            duration_ms = report.duration.as_millis() as u64,
            lists_added = report.lists.applied_add,
            lists_removed = report.lists.applied_remove,
            ratings_added = report.ratings.applied_add,
            ratings_removed = report.ratings.applied_remove,
            history_added = report.history.applied_add,
            history_removed = report.history.applied_remove,
            "Sync completed"
        );
        Ok(report)
    }

    async fn hydrate(&self, report: &mut SyncReport) -> Result<Hydrated> {
        let authenticated = self.source.is_authenticated();
        if !authenticated {
            info!("Source has no credentials, skipping watchlist, ratings and history");
        }

        let mut lists = Vec::new();

        if self.options.watchlist && authenticated {
            let source = self.source.get_watchlist().await?;
            let target = self.target.watchlist_get().await?;
            debug!(source = source.items.len(), target = target.items.len(), "Hydrated watchlist");
            lists.push(ListPair { source, target });
        } else {
            info!(phase = "watchlist", "Skipping watchlist sync");
        }

        if !self.options.lists {
            info!(phase = "lists", "Skipping list sync");
        } else if !authenticated && self.list_ids.is_empty() {
            info!(phase = "lists", "No list ids configured and list discovery needs credentials, skipping list sync");
        } else {
            lists.extend(self.hydrate_lists(report).await?);
        }

        let ratings = if (self.options.ratings || self.options.history) && authenticated {
            let source = self.source.get_ratings().await?;
            let target = self.target.ratings_get().await?;
            debug!(source = source.len(), target = target.len(), "Hydrated ratings");
            Some(diff::items(&diff::item_map(&source), &diff::target_item_map(&target)))
        } else {
            None
        };

        Ok(Hydrated { lists, ratings })
    }

    async fn hydrate_lists(&self, report: &mut SyncReport) -> Result<Vec<ListPair>> {
        for id in &self.list_ids {
            self.source.export_list(id).await?;
        }
        let sources = self.source.get_lists(&self.list_ids).await?;

        let metas: Vec<IdMeta> = sources
            .iter()
            .map(|list| {
                let slug = match infer_slug(&list.name) {
                    slug if slug.is_empty() => list.id.to_lowercase(),
                    slug => slug,
                };
                IdMeta::new(list.id.as_str(), slug).with_name(list.name.as_str())
            })
            .collect();

        let (found, missing) = self.target.lists_get(&metas).await?;
        let mut targets: HashMap<String, TraktList> = found
            .into_iter()
            .map(|list| (list.ids.slug.clone(), list))
            .collect();

        for error in missing {
            let slug = match error {
                TraktError::ListNotFound { slug } => slug,
                other => return Err(other.into()),
            };
            let Some(meta) = metas.iter().find(|m| m.slug == slug) else {
                warn!(slug = %slug, "Missing list does not match any source list");
                continue;
            };
            let name = meta.name.as_deref().unwrap_or(&meta.id);

            if self.policy.is_dry_run() {
                info!(list_id = %meta.id, slug = %slug, name = %name, "Dry run: would create missing Trakt list");
            } else {
                self.target.list_add(&meta.id, name).await?;
                report.lists_created += 1;
            }
            targets.insert(
                slug,
                TraktList {
                    ids: meta.clone(),
                    items: Vec::new(),
                    is_watchlist: false,
                },
            );
        }

        let mut pairs = Vec::with_capacity(sources.len());
        for (source, meta) in sources.into_iter().zip(&metas) {
            match targets.remove(&meta.slug) {
                Some(target) => pairs.push(ListPair { source, target }),
                None => warn!(list_id = %meta.id, slug = %meta.slug, "Two source lists share a slug, skipping duplicate"),
            }
        }
        Ok(pairs)
    }

    async fn sync_lists(&self, pairs: &[ListPair], report: &mut PhaseReport) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        report.ran = true;

        for pair in pairs {
            let diff = diff::list(&pair.source, &pair.target);
            let slug = pair.target.ids.slug.as_str();
            let name = pair.source.name.as_str();
            report.planned_add += diff.add.len();
            report.planned_remove += diff.remove.len();

            if !diff.add.is_empty() {
                if self.policy.allows_add() {
                    let response = if pair.source.is_watchlist {
                        self.target.watchlist_items_add(&diff.add).await?
                    } else {
                        self.target.list_items_add(slug, &diff.add).await?
                    };
                    report.applied_add += diff.add.len();
                    info!(list = %name, count = diff.add.len(), added = response.added.total(), "Added list items");
                } else {
                    log_skipped("add", name, &diff.add);
                }
            }

            if !diff.remove.is_empty() {
                if self.policy.allows_remove() {
                    let response = if pair.source.is_watchlist {
                        self.target.watchlist_items_remove(&diff.remove).await?
                    } else {
                        self.target.list_items_remove(slug, &diff.remove).await?
                    };
                    report.applied_remove += diff.remove.len();
                    info!(list = %name, count = diff.remove.len(), deleted = response.deleted.total(), "Removed list items");
                } else {
                    log_skipped("remove", name, &diff.remove);
                }
            }
        }
        Ok(())
    }

    async fn sync_ratings(&self, diff: &Diff, report: &mut PhaseReport) -> Result<()> {
        report.ran = true;
        report.planned_add = diff.add.len();
        report.planned_remove = diff.remove.len();

        if !diff.add.is_empty() {
            if self.policy.allows_add() {
                let response = self.target.ratings_add(&diff.add).await?;
                report.applied_add = diff.add.len();
                info!(count = diff.add.len(), added = response.added.total(), "Added ratings");
            } else {
                log_skipped("add", "ratings", &diff.add);
            }
        }

        if !diff.remove.is_empty() {
            if self.policy.allows_remove() {
                let response = self.target.ratings_remove(&diff.remove).await?;
                report.applied_remove = diff.remove.len();
                info!(count = diff.remove.len(), deleted = response.deleted.total(), "Removed ratings");
            } else {
                log_skipped("remove", "ratings", &diff.remove);
            }
        }
        Ok(())
    }

    /// History follows ratings: a newly rated item without a play gets one,
    /// an unrated item loses its plays.
    async fn sync_history(&self, ratings: &Diff, report: &mut PhaseReport) -> Result<()> {
        report.ran = true;
        let mut to_add = Vec::new();
        let mut to_remove = Vec::new();

        for item in ratings.add.iter().filter(|i| i.kind.has_history()) {
            if self.history_of(item).await?.is_empty() {
                to_add.push(item.clone());
            }
        }
        for item in ratings.remove.iter().filter(|i| i.kind.has_history()) {
            if !self.history_of(item).await?.is_empty() {
                to_remove.push(item.clone());
            }
        }

        report.planned_add = to_add.len();
        report.planned_remove = to_remove.len();

        if !to_add.is_empty() {
            if self.policy.allows_add() {
                let response = self.target.history_add(&to_add).await?;
                report.applied_add = to_add.len();
                info!(count = to_add.len(), added = response.added.total(), "Added history");
            } else {
                log_skipped("add", "history", &to_add);
            }
        }

        if !to_remove.is_empty() {
            if self.policy.allows_remove() {
                let response = self.target.history_remove(&to_remove).await?;
                report.applied_remove = to_remove.len();
                info!(count = to_remove.len(), deleted = response.deleted.total(), "Removed history");
            } else {
                log_skipped("remove", "history", &to_remove);
            }
        }
        Ok(())
    }

    async fn history_of(&self, item: &Item) -> Result<Vec<TraktItem>> {
        Ok(self.target.history_get(item.kind, &item.id).await?)
    }
}

fn log_skipped(action: &str, scope: &str, items: &[Item]) {
    let payload = serde_json::to_string(items).unwrap_or_default();
    info!(
        action = action,
        scope = scope,
        count = items.len(),
        payload = %payload,
        "Skipped by sync mode"
    );
}

/// Derive the target slug from a list's display name: lowercase, whitespace
/// to `-`, drop anything outside `[-_a-z0-9]`, collapse repeated hyphens.
pub fn infer_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        let c = if c.is_whitespace() { '-' } else { c };
        if !(c == '-' || c == '_' || c.is_ascii_lowercase() || c.is_ascii_digit()) {
            continue;
        }
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    slug
}
