pub mod diff;
pub mod item;
pub mod list;

pub use diff::Diff;
pub use item::{Item, MediaKind};
pub use list::{IdMeta, List};
