// Set reconciliation between a source and a target snapshot

use chrono::{DateTime, Utc};
use media_sync_models::{Diff, Item, List};
use media_sync_sources::trakt::api::{TraktItem, TraktList};
use std::collections::HashMap;
use tracing::debug;

/// Compute what the target needs to match the source.
///
/// - ids only in `source` are added
/// - ids in both with a different rating are added again (re-adding overwrites)
/// - ids only in `target` are removed, with `created` set to the Unix epoch
///
/// Both sequences are ordered by `created`, then by `id`.
pub fn items(source: &HashMap<String, Item>, target: &HashMap<String, Item>) -> Diff {
    let mut diff = Diff::default();

    for (id, item) in source {
        match target.get(id) {
            None => diff.add.push(item.clone()),
            Some(existing) if existing.rating != item.rating => diff.add.push(item.clone()),
            Some(_) => {}
        }
    }

    for (id, item) in target {
        if source.contains_key(id) {
            continue;
        }
        // The source has no timestamp for this id
        let mut removed = item.clone();
        removed.created = DateTime::<Utc>::default();
        diff.remove.push(removed);
    }

    sort_chronologically(&mut diff.add);
    sort_chronologically(&mut diff.remove);

    debug!(add = diff.add.len(), remove = diff.remove.len(), "Computed diff");
    diff
}

/// Diff one source list against its target counterpart
pub fn list(source: &List, target: &TraktList) -> Diff {
    items(&item_map(&source.items), &target_item_map(&target.items))
}

/// Key source items by id; later duplicates win
pub fn item_map(items: &[Item]) -> HashMap<String, Item> {
    items
        .iter()
        .map(|item| (item.id.clone(), item.clone()))
        .collect()
}

/// Key target items by their cross-provider id, dropping items without one
pub fn target_item_map(items: &[TraktItem]) -> HashMap<String, Item> {
    let mut map = HashMap::with_capacity(items.len());
    for entry in items {
        match entry.to_item() {
            Some(item) => {
                map.insert(item.id.clone(), item);
            }
            None => debug!(kind = %entry.kind.media_kind(), "Skipping target item without external id"),
        }
    }
    map
}

fn sort_chronologically(items: &mut [Item]) {
    items.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
}
