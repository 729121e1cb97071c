use chrono::{DateTime, Utc};
use media_sync_models::{IdMeta, Item, MediaKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraktIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trakt: Option<u64>,
}

/// The identity and title block shared by every media object Trakt returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraktMedia {
    #[serde(default, alias = "name")]
    pub title: Option<String>,
    pub ids: TraktIds,
}

/// The subject of a Trakt item, one variant per `type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraktKind {
    Movie(TraktMedia),
    Show(TraktMedia),
    Episode(TraktMedia),
    Season(TraktMedia),
    Person(TraktMedia),
}

impl TraktKind {
    /// Cross-provider id of the subject. Seasons have no IMDb identity.
    pub fn external_id(&self) -> Option<&str> {
        match self {
            TraktKind::Movie(media)
            | TraktKind::Show(media)
            | TraktKind::Episode(media)
            | TraktKind::Person(media) => media.ids.imdb.as_deref(),
            TraktKind::Season(_) => None,
        }
    }

    pub fn media_kind(&self) -> MediaKind {
        match self {
            TraktKind::Movie(_) => MediaKind::Movie,
            TraktKind::Show(_) => MediaKind::Show,
            TraktKind::Episode(_) => MediaKind::Episode,
            TraktKind::Season(_) => MediaKind::Season,
            TraktKind::Person(_) => MediaKind::Person,
        }
    }

    pub fn media(&self) -> &TraktMedia {
        match self {
            TraktKind::Movie(media)
            | TraktKind::Show(media)
            | TraktKind::Episode(media)
            | TraktKind::Season(media)
            | TraktKind::Person(media) => media,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTraktItem {
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    listed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    rated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    watched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    rating: Option<u8>,
    #[serde(default)]
    movie: Option<TraktMedia>,
    #[serde(default)]
    show: Option<TraktMedia>,
    #[serde(default)]
    episode: Option<TraktMedia>,
    #[serde(default)]
    season: Option<TraktMedia>,
    #[serde(default)]
    person: Option<TraktMedia>,
}

/// A watchlist, list, rating or history entry as returned by Trakt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawTraktItem")]
pub struct TraktItem {
    pub kind: TraktKind,
    pub listed_at: Option<DateTime<Utc>>,
    pub rated_at: Option<DateTime<Utc>>,
    pub watched_at: Option<DateTime<Utc>>,
    pub rating: Option<u8>,
}

impl TryFrom<RawTraktItem> for TraktItem {
    type Error = String;

    fn try_from(raw: RawTraktItem) -> Result<Self, Self::Error> {
        let missing = |field: &str| format!("{} item without a {} object", raw.item_type, field);
        let kind = match raw.item_type.as_str() {
            "movie" => TraktKind::Movie(raw.movie.clone().ok_or_else(|| missing("movie"))?),
            "show" => TraktKind::Show(raw.show.clone().ok_or_else(|| missing("show"))?),
            "episode" => TraktKind::Episode(raw.episode.clone().ok_or_else(|| missing("episode"))?),
            "season" => TraktKind::Season(raw.season.clone().ok_or_else(|| missing("season"))?),
            "person" => TraktKind::Person(raw.person.clone().ok_or_else(|| missing("person"))?),
            other => return Err(format!("unknown item type: {}", other)),
        };

        Ok(Self {
            kind: normalize_ids(kind),
            listed_at: raw.listed_at,
            rated_at: raw.rated_at,
            watched_at: raw.watched_at,
            rating: raw.rating,
        })
    }
}

/// Trakt occasionally returns IMDb ids with stray slashes
fn normalize_ids(mut kind: TraktKind) -> TraktKind {
    let media = match &mut kind {
        TraktKind::Movie(m)
        | TraktKind::Show(m)
        | TraktKind::Episode(m)
        | TraktKind::Season(m)
        | TraktKind::Person(m) => m,
    };
    if let Some(imdb) = media.ids.imdb.take() {
        let cleaned = imdb.replace('/', "");
        media.ids.imdb = (!cleaned.is_empty()).then_some(cleaned);
    }
    kind
}

impl TraktItem {
    pub fn external_id(&self) -> Option<&str> {
        self.kind.external_id()
    }

    /// When the user acted on the item, whichever timestamp the endpoint returns.
    pub fn created(&self) -> DateTime<Utc> {
        self.listed_at
            .or(self.rated_at)
            .or(self.watched_at)
            .unwrap_or_default()
    }

    /// Normalized form, or `None` when the item has no cross-provider id.
    pub fn to_item(&self) -> Option<Item> {
        let id = self.external_id()?;
        let mut item = Item::new(id, self.kind.media_kind(), self.created());
        item.rating = self.rating;
        item.title = self.kind.media().title.clone();
        Some(item)
    }
}

/// One entry of a sync request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraktItemSpec {
    pub ids: TraktIds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watched_at: Option<DateTime<Utc>>,
}

impl TraktItemSpec {
    pub fn from_imdb(id: &str) -> Self {
        Self {
            ids: TraktIds {
                imdb: Some(id.to_string()),
                ..TraktIds::default()
            },
            ..Self::default()
        }
    }
}

/// Body of every `/sync/*` and list-items mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraktSyncPayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub movies: Vec<TraktItemSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shows: Vec<TraktItemSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub episodes: Vec<TraktItemSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub people: Vec<TraktItemSpec>,
}

impl TraktSyncPayload {
    /// Identity only, for watchlist, list and removal calls
    pub fn ids(items: &[Item]) -> Self {
        Self::build(items, |item| TraktItemSpec::from_imdb(&item.id))
    }

    /// Ratings with the time they were given
    pub fn rated(items: &[Item]) -> Self {
        Self::build(items, |item| TraktItemSpec {
            rated_at: Some(item.created),
            rating: item.rating,
            ..TraktItemSpec::from_imdb(&item.id)
        })
    }

    /// History entries watched at the item's timestamp
    pub fn watched(items: &[Item]) -> Self {
        Self::build(items, |item| TraktItemSpec {
            watched_at: Some(item.created),
            ..TraktItemSpec::from_imdb(&item.id)
        })
    }

    fn build(items: &[Item], spec: impl Fn(&Item) -> TraktItemSpec) -> Self {
        let mut payload = Self::default();
        for item in items {
            let bucket = match item.kind {
                MediaKind::Movie => &mut payload.movies,
                MediaKind::Show => &mut payload.shows,
                MediaKind::Episode => &mut payload.episodes,
                MediaKind::Person => &mut payload.people,
                MediaKind::Season => {
                    debug!(id = %item.id, "Skipping season item, no sync payload slot");
                    continue;
                }
            };
            bucket.push(spec(item));
        }
        payload
    }

    pub fn len(&self) -> usize {
        self.movies.len() + self.shows.len() + self.episodes.len() + self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrudCounts {
    #[serde(default)]
    pub movies: u32,
    #[serde(default)]
    pub shows: u32,
    #[serde(default)]
    pub seasons: u32,
    #[serde(default)]
    pub episodes: u32,
    #[serde(default)]
    pub people: u32,
}

impl CrudCounts {
    pub fn total(&self) -> u32 {
        self.movies + self.shows + self.seasons + self.episodes + self.people
    }
}

/// Result of a Trakt add/remove call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrudResponse {
    #[serde(default)]
    pub added: CrudCounts,
    #[serde(default)]
    pub deleted: CrudCounts,
    #[serde(default)]
    pub existing: CrudCounts,
    #[serde(default)]
    pub not_found: TraktSyncPayload,
}

/// Body of `POST /users/{user}/lists`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewList {
    pub name: String,
    pub description: String,
    pub privacy: String,
    pub display_numbers: bool,
    pub allow_comments: bool,
    pub sort_by: String,
    pub sort_how: String,
}

impl NewList {
    pub fn private(name: &str, description: String) -> Self {
        Self {
            name: name.to_string(),
            description,
            privacy: "private".to_string(),
            display_numbers: false,
            allow_comments: true,
            sort_by: "rank".to_string(),
            sort_how: "asc".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TraktUser {
    pub ids: TraktUserIds,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TraktUserIds {
    pub slug: String,
}

/// A Trakt list (or the watchlist) with its items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraktList {
    pub ids: IdMeta,
    pub items: Vec<TraktItem>,
    pub is_watchlist: bool,
}
