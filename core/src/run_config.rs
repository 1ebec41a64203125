//! Run configuration: the loosely-shaped request and its canonical form.
//!
//! RULE: `canonicalize()` is the only place defaults are applied. Everything
//! downstream (cache filters, argument vectors, persisted records) reads the
//! canonical value, never the raw request.

use crate::{
    config::RunDefaults,
    error::{FedsimError, FedsimResult},
    types::{FederateId, PartialSlotMatrix, SlotMatrix},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BATCH_COUNT: u64 = 100;

/// One batch as requested by a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Number of seeds (0..count). Unset means `DEFAULT_BATCH_COUNT`.
    #[serde(default)]
    pub count:         Option<u64>,
    pub configuration: RawRunConfig,
    #[serde(default)]
    pub background:    bool,
}

impl BatchRequest {
    pub fn count(&self) -> u64 {
        self.count.unwrap_or(DEFAULT_BATCH_COUNT)
    }
}

/// Caller-supplied configuration. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRunConfig {
    #[serde(default)]
    pub federate_ids: Option<Vec<FederateId>>,
    #[serde(default)]
    pub turns:        Option<u32>,
    #[serde(default)]
    pub locations:    Option<Locations>,
    #[serde(default)]
    pub o_alg:        Option<String>,
    #[serde(default)]
    pub f_alg:        Option<String>,
}

/// `locations` is either an explicit (possibly partial) matrix or the name
/// of a placement mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Locations {
    Matrix(PartialSlotMatrix),
    Mode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementMode {
    /// Every player's slot cursor starts at the fixed base.
    #[default]
    Sequential,
    /// Players' cursors are spread evenly around the six slots.
    Symmetric,
}

impl PlacementMode {
    pub fn parse(name: &str) -> FedsimResult<Self> {
        match name {
            "" | "sequential" => Ok(Self::Sequential),
            "symmetric"       => Ok(Self::Symmetric),
            other => Err(FedsimError::InvalidConfig {
                reason: format!("unknown placement mode '{other}'"),
            }),
        }
    }
}

/// Canonical configuration with every default applied, still waiting for
/// placement resolution to complete its slot matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDraft {
    pub federate_ids:   Vec<FederateId>,
    pub turns:          u32,
    pub o_alg:          String,
    pub f_alg:          String,
    pub placement_mode: PlacementMode,
    pub explicit_slots: PartialSlotMatrix,
}

impl RunDraft {
    /// Attach the completed slot matrix, producing the canonical config.
    pub fn into_config(self, locations: SlotMatrix) -> RunConfig {
        RunConfig {
            federate_ids: self.federate_ids,
            locations,
            turns:        self.turns,
            o_alg:        self.o_alg,
            f_alg:        self.f_alg,
        }
    }
}

/// The canonical, immutable run configuration shared by every seed of a
/// batch. Serialized field names match the persisted record layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub federate_ids: Vec<FederateId>,
    pub locations:    SlotMatrix,
    pub turns:        u32,
    pub o_alg:        String,
    pub f_alg:        String,
}

/// Validate a raw configuration and fill every unset field from `defaults`.
pub fn canonicalize(raw: &RawRunConfig, defaults: &RunDefaults) -> FedsimResult<RunDraft> {
    let federate_ids = match &raw.federate_ids {
        None => return Err(FedsimError::MissingField { field: "federateIds" }),
        Some(ids) if ids.is_empty() => {
            return Err(FedsimError::InvalidConfig {
                reason: "federateIds must name at least one federate".to_string(),
            })
        }
        Some(ids) => ids.clone(),
    };

    let turns = raw.turns.unwrap_or(defaults.turns);
    if turns == 0 {
        return Err(FedsimError::InvalidConfig {
            reason: "turns must be at least 1".to_string(),
        });
    }

    let (placement_mode, explicit_slots) = match &raw.locations {
        None                        => (PlacementMode::Sequential, Vec::new()),
        Some(Locations::Mode(name)) => (PlacementMode::parse(name)?, Vec::new()),
        Some(Locations::Matrix(m))  => (PlacementMode::Sequential, m.clone()),
    };

    Ok(RunDraft {
        federate_ids,
        turns,
        o_alg: raw.o_alg.clone().unwrap_or_else(|| defaults.o_alg.clone()),
        f_alg: raw.f_alg.clone().unwrap_or_else(|| defaults.f_alg.clone()),
        placement_mode,
        explicit_slots,
    })
}
