use async_trait::async_trait;
use media_sync_models::{IdMeta, Item, List, MediaKind};

use crate::error::{SourceError, TraktError};
use crate::trakt::api::{CrudResponse, TraktItem, TraktList};

/// Authoritative side of a sync. Read-only from our point of view.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    fn source_name(&self) -> &str;

    /// Whether account-scoped reads (watchlist, ratings, list discovery) are possible
    fn is_authenticated(&self) -> bool;

    /// Refresh the local export of a single list
    async fn export_list(&self, id: &str) -> Result<(), SourceError>;

    /// Read the given lists; an empty slice means every list on the account
    async fn get_lists(&self, ids: &[String]) -> Result<Vec<List>, SourceError>;

    async fn get_watchlist(&self) -> Result<List, SourceError>;

    async fn get_ratings(&self) -> Result<Vec<Item>, SourceError>;
}

/// Side of a sync that is updated to match the source.
#[async_trait]
pub trait TargetProvider: Send + Sync {
    async fn watchlist_get(&self) -> Result<TraktList, TraktError>;
    async fn watchlist_items_add(&self, items: &[Item]) -> Result<CrudResponse, TraktError>;
    async fn watchlist_items_remove(&self, items: &[Item]) -> Result<CrudResponse, TraktError>;

    async fn list_get(&self, meta: &IdMeta) -> Result<TraktList, TraktError>;

    /// Fetch many lists at once. `ListNotFound` failures are returned in the
    /// second vector; any other failure aborts the whole call.
    async fn lists_get(&self, metas: &[IdMeta]) -> Result<(Vec<TraktList>, Vec<TraktError>), TraktError>;

    /// Create a private list named `name` for source list `id`
    async fn list_add(&self, id: &str, name: &str) -> Result<(), TraktError>;
    async fn list_items_add(&self, slug: &str, items: &[Item]) -> Result<CrudResponse, TraktError>;
    async fn list_items_remove(&self, slug: &str, items: &[Item]) -> Result<CrudResponse, TraktError>;

    async fn ratings_get(&self) -> Result<Vec<TraktItem>, TraktError>;
    async fn ratings_add(&self, items: &[Item]) -> Result<CrudResponse, TraktError>;
    async fn ratings_remove(&self, items: &[Item]) -> Result<CrudResponse, TraktError>;

    async fn history_get(&self, kind: MediaKind, id: &str) -> Result<Vec<TraktItem>, TraktError>;
    async fn history_add(&self, items: &[Item]) -> Result<CrudResponse, TraktError>;
    async fn history_remove(&self, items: &[Item]) -> Result<CrudResponse, TraktError>;
}
