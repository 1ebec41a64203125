//! Federate and design definitions, and the read-through cache in front of
//! whatever source holds them.
//!
//! RULE: entities are immutable once fetched. Cache entries are created on
//! first fetch and live as long as the owning context; there is no
//! invalidation.

use crate::{
    error::{FedsimError, FedsimResult, PlacementError},
    types::{DesignId, FederateId},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Federate {
    pub federate_id: FederateId,
    pub design_ids:  Vec<DesignId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Design {
    pub design_id:   DesignId,
    /// Raw kind as stored. Interpreted by `kind()` at placement time.
    pub object_type: String,
    pub components:  Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Ground,
    Sat,
}

impl Design {
    pub fn kind(&self) -> Result<ObjectKind, PlacementError> {
        match self.object_type.as_str() {
            "GROUND" => Ok(ObjectKind::Ground),
            "SAT"    => Ok(ObjectKind::Sat),
            other => Err(PlacementError::UnknownKind {
                design_id:   self.design_id,
                object_type: other.to_string(),
            }),
        }
    }
}

/// Read-only lookup of entity definitions.
pub trait EntitySource {
    fn federate(&self, id: FederateId) -> FedsimResult<Option<Federate>>;
    fn design(&self, id: DesignId) -> FedsimResult<Option<Design>>;
}

/// Process-lifetime cache of fetched entities. Safe to share between batch
/// threads; a race on a missing key fetches twice and keeps the first insert.
#[derive(Debug, Default)]
pub struct EntityCache {
    federates: RwLock<HashMap<FederateId, Arc<Federate>>>,
    designs:   RwLock<HashMap<DesignId, Arc<Design>>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn federate(&self, source: &dyn EntitySource, id: FederateId) -> FedsimResult<Arc<Federate>> {
        if let Some(hit) = read_cached(&self.federates, &id) {
            return Ok(hit);
        }
        let fetched = source
            .federate(id)?
            .ok_or(FedsimError::UnknownFederate { id })?;
        log::debug!("entity cache: fetched federate {id}");
        Ok(insert_cached(&self.federates, id, fetched))
    }

    pub fn design(&self, source: &dyn EntitySource, id: DesignId) -> FedsimResult<Arc<Design>> {
        if let Some(hit) = read_cached(&self.designs, &id) {
            return Ok(hit);
        }
        let fetched = source
            .design(id)?
            .ok_or(FedsimError::UnknownDesign { id })?;
        log::debug!("entity cache: fetched design {id}");
        Ok(insert_cached(&self.designs, id, fetched))
    }

    /// A federate's designs in the federate's own order.
    pub fn designs_of(&self, source: &dyn EntitySource, federate: &Federate) -> FedsimResult<Vec<Arc<Design>>> {
        federate
            .design_ids
            .iter()
            .map(|id| self.design(source, *id))
            .collect()
    }

    pub fn cached_counts(&self) -> (usize, usize) {
        let federates = self.federates.read().map(|m| m.len()).unwrap_or(0);
        let designs = self.designs.read().map(|m| m.len()).unwrap_or(0);
        (federates, designs)
    }
}

// A poisoned lock only means another thread panicked mid-insert of an
// immutable value; the map itself is still consistent.
fn read_cached<K, V>(map: &RwLock<HashMap<K, Arc<V>>>, key: &K) -> Option<Arc<V>>
where
    K: std::hash::Hash + Eq,
{
    let guard = map.read().unwrap_or_else(|p| p.into_inner());
    guard.get(key).cloned()
}

fn insert_cached<K, V>(map: &RwLock<HashMap<K, Arc<V>>>, key: K, value: V) -> Arc<V>
where
    K: std::hash::Hash + Eq,
{
    let mut guard = map.write().unwrap_or_else(|p| p.into_inner());
    Arc::clone(guard.entry(key).or_insert_with(|| Arc::new(value)))
}
