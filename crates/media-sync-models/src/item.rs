use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single rated, listed or watched subject, normalized across providers.
///
/// `id` is the only identity: two items with the same `id` refer to the same
/// title (or person) on both sides of a sync.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub kind: MediaKind,
    /// When the user's action (listing, rating) happened on the source.
    pub created: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Item {
    pub fn new(id: impl Into<String>, kind: MediaKind, created: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            kind,
            created,
            rating: None,
            title: None,
        }
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Title when known, id otherwise. Used for log lines only.
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Show,
    Episode,
    Season,
    Person,
}

impl MediaKind {
    /// Plural collection name used by the target's sync endpoints
    /// (`movies`, `shows`, ...).
    pub fn plural(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movies",
            MediaKind::Show => "shows",
            MediaKind::Episode => "episodes",
            MediaKind::Season => "seasons",
            MediaKind::Person => "people",
        }
    }

    /// Whether the kind can carry a watch history entry.
    pub fn has_history(&self) -> bool {
        matches!(self, MediaKind::Movie | MediaKind::Show | MediaKind::Episode)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaKind::Movie => "movie",
            MediaKind::Show => "show",
            MediaKind::Episode => "episode",
            MediaKind::Season => "season",
            MediaKind::Person => "person",
        };
        f.write_str(name)
    }
}
