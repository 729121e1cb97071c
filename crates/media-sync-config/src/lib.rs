pub mod config;
pub mod credentials;
pub mod paths;

pub use config::{Config, ImdbConfig, SchedulerConfig, SyncMode, SyncOptions, TraktConfig, default_scheduler_config};
pub use credentials::CredentialStore;
pub use paths::{PathManager, container_base_path};
