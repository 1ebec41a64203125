//! Placement resolution: turns a federate's designs into the positional
//! tokens the simulator reads, assigning orbital slots to every design the
//! caller did not place explicitly.
//!
//! Token grammar: `<player>.<Class>@<OrbitTag><slot>,<component>[,<component>...]`
//! with a 1-based player index.
//!
//! RULES:
//!   - Ground designs are always emitted before satellites; the sort is
//!     stable so relative order within a kind is the federate's order.
//!   - An explicitly supplied slot is used as-is and never overwritten.
//!     Resolving a completed matrix again yields byte-identical tokens.
//!   - Any unknown design kind fails the whole resolution.

use crate::{
    entity::{Design, EntityCache, EntitySource, ObjectKind},
    error::{FedsimResult, PlacementError},
    run_config::{PlacementMode, RunDraft},
    types::{Slot, SlotMatrix, MAX_SLOT, MIN_SLOT},
};
use std::sync::Arc;

/// Slot cursor start for every player in sequential mode.
const BASE_SLOT: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesignClass {
    GroundSta,
    SmallSat,
    MediumSat,
    LargeSat,
}

impl DesignClass {
    pub fn classify(kind: ObjectKind, component_count: usize) -> Self {
        match kind {
            ObjectKind::Ground               => Self::GroundSta,
            ObjectKind::Sat if component_count <= 2 => Self::SmallSat,
            ObjectKind::Sat if component_count <= 4 => Self::MediumSat,
            ObjectKind::Sat                  => Self::LargeSat,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GroundSta => "GroundSta",
            Self::SmallSat  => "SmallSat",
            Self::MediumSat => "MediumSat",
            Self::LargeSat  => "LargeSat",
        }
    }

    pub fn orbit_tag(&self) -> &'static str {
        match self {
            Self::GroundSta => "SUR",
            _               => "MEO",
        }
    }
}

/// Tokens for one federate plus its completed slot row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatePlacement {
    /// In emission order (ground first).
    pub tokens: Vec<String>,
    /// Indexed by the design's position in the federate's own list.
    pub slots:  Vec<Slot>,
}

/// Tokens for a whole run plus the completed matrix to persist with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlacement {
    pub tokens:    Vec<String>,
    pub locations: SlotMatrix,
}

pub fn initial_cursor(mode: PlacementMode, player_index: usize, federate_count: usize) -> i32 {
    match mode {
        // floor(player / count * 6) + 1, in exact integer arithmetic.
        PlacementMode::Symmetric => (player_index * MAX_SLOT as usize / federate_count.max(1)) as i32 + 1,
        PlacementMode::Sequential => BASE_SLOT,
    }
}

pub fn format_token(player_index: usize, class: DesignClass, slot: Slot, components: &[String]) -> String {
    format!(
        "{}.{}@{}{},{}",
        player_index + 1,
        class.name(),
        class.orbit_tag(),
        slot,
        components.join(",")
    )
}

/// Resolve one federate's designs.
///
/// `explicit` is the caller's row for this federate; it may be shorter than
/// `designs` and may contain holes.
pub fn resolve_federate(
    designs: &[Arc<Design>],
    explicit: &[Option<Slot>],
    player_index: usize,
    federate_count: usize,
    mode: PlacementMode,
) -> Result<FederatePlacement, PlacementError> {
    if explicit.len() > designs.len() {
        return Err(PlacementError::RowTooLong {
            federate_index: player_index,
            designs:        designs.len(),
            supplied:       explicit.len(),
        });
    }
    for (design_index, slot) in explicit.iter().enumerate() {
        if let Some(slot) = *slot {
            if !(MIN_SLOT..=MAX_SLOT).contains(&slot) {
                return Err(PlacementError::SlotOutOfRange {
                    federate_index: player_index,
                    design_index,
                    slot,
                });
            }
        }
    }

    let kinds = designs
        .iter()
        .map(|d| d.kind())
        .collect::<Result<Vec<_>, _>>()?;

    let mut order: Vec<usize> = (0..designs.len()).collect();
    order.sort_by_key(|&i| kinds[i] == ObjectKind::Sat);

    let mut cursor = initial_cursor(mode, player_index, federate_count);
    let mut slots = vec![0; designs.len()];
    let mut tokens = Vec::with_capacity(designs.len());

    for index in order {
        let design = &designs[index];
        let kind = kinds[index];
        let slot = match explicit.get(index).copied().flatten() {
            Some(slot) => slot,
            None => match kind {
                ObjectKind::Ground => cursor as Slot,
                ObjectKind::Sat => {
                    cursor -= 1;
                    if cursor <= 0 {
                        cursor = MAX_SLOT as i32;
                    }
                    cursor as Slot
                }
            },
        };
        slots[index] = slot;
        let class = DesignClass::classify(kind, design.components.len());
        tokens.push(format_token(player_index, class, slot, &design.components));
    }

    Ok(FederatePlacement { tokens, slots })
}

/// Resolve every federate of a run. Entities come through the cache so a
/// batch touches the source at most once per entity.
pub fn resolve_run(
    cache: &EntityCache,
    source: &dyn EntitySource,
    draft: &RunDraft,
) -> FedsimResult<RunPlacement> {
    let federate_count = draft.federate_ids.len();
    if draft.explicit_slots.len() > federate_count {
        return Err(PlacementError::TooManyRows {
            federates: federate_count,
            supplied:  draft.explicit_slots.len(),
        }
        .into());
    }

    let mut tokens = Vec::new();
    let mut locations = Vec::with_capacity(federate_count);
    for (player_index, federate_id) in draft.federate_ids.iter().enumerate() {
        let federate = cache.federate(source, *federate_id)?;
        let designs = cache.designs_of(source, &federate)?;
        let explicit = draft
            .explicit_slots
            .get(player_index)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let placed = resolve_federate(&designs, explicit, player_index, federate_count, draft.placement_mode)?;
        tokens.extend(placed.tokens);
        locations.push(placed.slots);
    }

    Ok(RunPlacement { tokens, locations })
}
