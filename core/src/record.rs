//! The persisted result of one trial.

use crate::{
    run_config::RunConfig,
    types::{Seed, SimulationInfo},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub simulation:    SimulationInfo,
    pub seed:          Seed,
    pub configuration: TrialConfig,
    pub results:       TrialResults,
}

/// Canonical run configuration augmented with the start cash the simulator
/// reported, one entry per output line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialConfig {
    #[serde(flatten)]
    pub run:        RunConfig,
    pub start_cash: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialResults {
    pub end_cash: Vec<f64>,
}

impl TrialRecord {
    /// Values of a named result column: `endCash` or `startCash`.
    pub fn column(&self, field: &str) -> Option<&[f64]> {
        match field {
            "endCash"   => Some(self.results.end_cash.as_slice()),
            "startCash" => Some(self.configuration.start_cash.as_slice()),
            _           => None,
        }
    }
}
