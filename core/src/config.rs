//! Orchestrator settings.
//!
//! Loaded once per process from a JSON file. Every field has a default so a
//! missing file, or a file naming only a few keys, is valid.

use crate::types::SimulationInfo;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MAX_PROCESSES: usize = 20;
pub const DEFAULT_TURNS: u32 = 24;
pub const DEFAULT_O_ALG: &str = "d6,a,1";
pub const DEFAULT_F_ALG: &str = "n";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Upper bound on simultaneously running simulator processes.
    pub max_processes:      usize,
    /// Program that runs the simulator script.
    pub interpreter:        String,
    /// First element of the simulator argument vector.
    pub script:             PathBuf,
    /// Working directory for every simulator process.
    pub working_dir:        PathBuf,
    /// Per-trial deadline. Unset means a hung simulator blocks its batch.
    pub trial_timeout_secs: Option<u64>,
    /// Threads feeding one batch into the gate. Unset means `max_processes`.
    pub dispatch_workers:   Option<usize>,
    pub defaults:           RunDefaults,
    pub simulation:         SimulationInfo,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_processes:      DEFAULT_MAX_PROCESSES,
            interpreter:        "python".to_string(),
            script:             PathBuf::from("ofspy/bin/ofs.py"),
            working_dir:        PathBuf::from("ofspy/bin"),
            trial_timeout_secs: None,
            dispatch_workers:   None,
            defaults:           RunDefaults::default(),
            simulation:         SimulationInfo::default(),
        }
    }
}

impl Settings {
    /// Read settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            log::info!("settings: {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_processes == 0 {
            anyhow::bail!("max_processes must be at least 1");
        }
        if self.dispatch_workers == Some(0) {
            anyhow::bail!("dispatch_workers must be at least 1");
        }
        if self.defaults.turns == 0 {
            anyhow::bail!("defaults.turns must be at least 1");
        }
        Ok(())
    }

    pub fn trial_timeout(&self) -> Option<Duration> {
        self.trial_timeout_secs.map(Duration::from_secs)
    }

    pub fn dispatch_workers(&self) -> usize {
        self.dispatch_workers.unwrap_or(self.max_processes).max(1)
    }
}

/// Values filled into a run configuration when the caller leaves them unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunDefaults {
    pub turns: u32,
    pub o_alg: String,
    pub f_alg: String,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            turns: DEFAULT_TURNS,
            o_alg: DEFAULT_O_ALG.to_string(),
            f_alg: DEFAULT_F_ALG.to_string(),
        }
    }
}
