use media_sync_config::SyncMode;

/// Gate consulted immediately before every mutating call. Reads are never gated.
#[derive(Debug, Clone, Copy)]
pub struct SyncPolicy {
    mode: SyncMode,
}

impl SyncPolicy {
    pub fn new(mode: SyncMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn allows_add(&self) -> bool {
        matches!(self.mode, SyncMode::Full | SyncMode::AddOnly)
    }

    pub fn allows_remove(&self) -> bool {
        matches!(self.mode, SyncMode::Full)
    }

    pub fn is_dry_run(&self) -> bool {
        self.mode == SyncMode::DryRun
    }
}
