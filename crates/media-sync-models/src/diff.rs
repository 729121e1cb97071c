use serde::{Deserialize, Serialize};
use crate::item::Item;

/// Items to add to and remove from the target for one data category.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diff {
    pub add: Vec<Item>,
    pub remove: Vec<Item>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}
