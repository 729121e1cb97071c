pub mod diff;
pub mod policy;
pub mod sync;

pub use policy::SyncPolicy;
pub use sync::{infer_slug, PhaseReport, SyncOrchestrator, SyncReport};
