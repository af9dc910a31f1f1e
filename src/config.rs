use anyhow::{Result, bail};
use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};

/// Environment variable prefix, e.g. `VMOVE_WORKERS=4`.
pub const ENV_PREFIX: &str = "VMOVE_";

/// Queue slots per worker when no explicit depth is configured.
const QUEUE_SLOTS_PER_WORKER: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveConfig {
    /// Number of concurrent move workers
    pub workers: usize,
    /// Jobs the walker may queue ahead of the workers; defaults to four per worker
    pub queue_depth: Option<usize>,
    /// fsync each destination file before verifying it
    pub sync_files: bool,
    /// Remove emptied source directories after a successful move
    pub prune_source_dirs: bool,
    /// Render the live progress line on stdout
    pub show_progress: bool,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for MoveConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            workers,
            queue_depth: None,
            sync_files: false,
            prune_source_dirs: true,
            show_progress: true,
            verbose: false,
            json_logs: false,
        }
    }
}

impl MoveConfig {
    /// Build the effective config: defaults, then `VMOVE_*` env vars, then CLI overrides.
    pub fn new<T: Serialize>(overrides: Option<&T>) -> Result<Self> {
        let mut figment = Self::figment().merge(Env::prefixed(ENV_PREFIX));

        if let Some(args) = overrides {
            figment = figment.merge(Serialized::defaults(args));
        }

        Self::from_figment(figment)
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(MoveConfig::default()))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let config: MoveConfig = figment.extract()?;

        if config.workers == 0 {
            bail!("workers must be at least 1");
        }
        if config.queue_depth == Some(0) {
            bail!("queue_depth must be at least 1");
        }

        Ok(config)
    }

    pub fn effective_queue_depth(&self) -> usize {
        self.queue_depth
            .unwrap_or(self.workers * QUEUE_SLOTS_PER_WORKER)
    }
}
