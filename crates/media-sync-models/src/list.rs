use serde::{Deserialize, Serialize};
use crate::item::Item;

/// A named collection of items on the source side. Item order carries no meaning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct List {
    pub id: String,
    pub name: String,
    pub items: Vec<Item>,
    /// At most one list per account is the watchlist
    #[serde(default)]
    pub is_watchlist: bool,
}

impl List {
    pub fn new(id: impl Into<String>, name: impl Into<String>, items: Vec<Item>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            items,
            is_watchlist: false,
        }
    }

    pub fn watchlist(id: impl Into<String>, items: Vec<Item>) -> Self {
        Self {
            id: id.into(),
            name: "Watchlist".to_string(),
            items,
            is_watchlist: true,
        }
    }
}

/// Links a source list to the target list that mirrors it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct IdMeta {
    /// Source list id (e.g. `ls012345678`)
    pub id: String,
    /// Target-side slug, inferred from the display name
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl IdMeta {
    pub fn new(id: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            slug: slug.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
