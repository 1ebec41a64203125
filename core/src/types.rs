//! Shared primitive types used across the orchestration engine.

use serde::{Deserialize, Serialize};

/// Identifier of a federate (one player in a trial).
pub type FederateId = u64;

/// Identifier of a design (one ground station or satellite).
pub type DesignId = u64;

/// One independent stochastic trial is identified by its seed.
pub type Seed = u64;

/// An orbital slot, 1..=6.
pub type Slot = u8;

pub const MIN_SLOT: Slot = 1;
pub const MAX_SLOT: Slot = 6;

/// Placement matrix as completed by the resolver:
/// federate index → original design index → slot.
pub type SlotMatrix = Vec<Vec<Slot>>;

/// Placement matrix as supplied by a caller. Holes are `null` on the wire.
pub type PartialSlotMatrix = Vec<Vec<Option<Slot>>>;

/// Identity of the external simulator. Part of every cache filter so a new
/// simulator version never reuses results of an older one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationInfo {
    pub name:    String,
    pub version: String,
}

impl Default for SimulationInfo {
    fn default() -> Self {
        Self {
            name:    "ofspy".to_string(),
            version: "1.0".to_string(),
        }
    }
}

/// Admission class of a job at the concurrency gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Foreground,
    Background,
}

impl Priority {
    pub fn from_background_flag(background: bool) -> Self {
        if background { Self::Background } else { Self::Foreground }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Foreground => "foreground",
            Self::Background => "background",
        }
    }
}
