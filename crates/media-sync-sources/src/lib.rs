pub mod error;
pub mod imdb;
pub mod traits;
pub mod trakt;

pub use error::{SourceError, TraktError};
pub use imdb::{ImdbCookies, ImdbSource};
pub use traits::{SourceProvider, TargetProvider};
pub use trakt::TraktClient;
