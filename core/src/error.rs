use crate::types::{DesignId, FederateId, Seed, Slot};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FedsimError {
    #[error("Missing required configuration field: {field}")]
    MissingField { field: &'static str },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Federate {id} not found")]
    UnknownFederate { id: FederateId },

    #[error("Design {id} not found")]
    UnknownDesign { id: DesignId },

    #[error("Placement failed: {0}")]
    Placement(#[from] PlacementError),

    #[error("Trial for seed {seed} failed: {source}")]
    Trial {
        seed:   Seed,
        #[source]
        source: TrialError,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FedsimError {
    /// True for errors raised while validating a request, before any job
    /// could have been dispatched.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::MissingField { .. }
                | Self::InvalidConfig { .. }
                | Self::UnknownFederate { .. }
                | Self::UnknownDesign { .. }
        )
    }
}

pub type FedsimResult<T> = Result<T, FedsimError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    #[error("design {design_id} has unknown object type '{object_type}'")]
    UnknownKind { design_id: DesignId, object_type: String },

    #[error("slot {slot} for federate {federate_index} design {design_index} is outside 1..=6")]
    SlotOutOfRange { federate_index: usize, design_index: usize, slot: Slot },

    #[error("federate {federate_index} has {designs} designs but {supplied} placements were supplied")]
    RowTooLong { federate_index: usize, designs: usize, supplied: usize },

    #[error("{supplied} placement rows supplied for {federates} federates")]
    TooManyRows { federates: usize, supplied: usize },
}

/// Failure of a single trial. Isolated to its job; the batch policy decides
/// what happens to the rest.
#[derive(Error, Debug)]
pub enum TrialError {
    #[error("could not start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source:  std::io::Error,
    },

    #[error("simulator exited with {}: {stderr}", exit_label(.code))]
    Exit { code: Option<i32>, stderr: String },

    #[error("could not read simulator output: {0}")]
    Output(#[source] std::io::Error),

    #[error("malformed output line {line} '{text}': {reason}")]
    Parse { line: usize, text: String, reason: String },

    #[error("simulator exceeded {secs}s deadline and was killed")]
    Timeout { secs: u64 },

    #[error("trial cancelled")]
    Cancelled,
}

impl TrialError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None    => "signal".to_string(),
    }
}
