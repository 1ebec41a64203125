use super::SimStore;
use crate::{
    entity::{Design, EntitySource, Federate},
    error::FedsimResult,
    types::{DesignId, FederateId},
};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Import file layout: `{ "federates": [...], "designs": [...] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityCatalog {
    #[serde(default)]
    pub federates: Vec<Federate>,
    #[serde(default)]
    pub designs:   Vec<Design>,
}

impl SimStore {
    pub fn upsert_federate(&self, federate: &Federate) -> FedsimResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO federate (federate_id, design_ids) VALUES (?1, ?2)",
            params![
                federate.federate_id as i64,
                serde_json::to_string(&federate.design_ids)?,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_design(&self, design: &Design) -> FedsimResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO design (design_id, object_type, components) VALUES (?1, ?2, ?3)",
            params![
                design.design_id as i64,
                design.object_type,
                serde_json::to_string(&design.components)?,
            ],
        )?;
        Ok(())
    }

    /// Load a whole catalog in one transaction. Existing ids are replaced.
    pub fn import_entities(&self, catalog: &EntityCatalog) -> FedsimResult<(usize, usize)> {
        let tx = self.conn.unchecked_transaction()?;
        for design in &catalog.designs {
            self.upsert_design(design)?;
        }
        for federate in &catalog.federates {
            self.upsert_federate(federate)?;
        }
        tx.commit()?;
        log::info!(
            "store: imported {} federates and {} designs",
            catalog.federates.len(),
            catalog.designs.len()
        );
        Ok((catalog.federates.len(), catalog.designs.len()))
    }
}

impl EntitySource for SimStore {
    fn federate(&self, id: FederateId) -> FedsimResult<Option<Federate>> {
        let design_ids: Option<String> = self
            .conn
            .query_row(
                "SELECT design_ids FROM federate WHERE federate_id = ?1",
                params![id as i64],
                |row| row.get(0),
            )
            .optional()?;
        match design_ids {
            Some(json) => Ok(Some(Federate {
                federate_id: id,
                design_ids:  serde_json::from_str(&json)?,
            })),
            None => Ok(None),
        }
    }

    fn design(&self, id: DesignId) -> FedsimResult<Option<Design>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT object_type, components FROM design WHERE design_id = ?1",
                params![id as i64],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((object_type, components)) => Ok(Some(Design {
                design_id: id,
                object_type,
                components: serde_json::from_str(&components)?,
            })),
            None => Ok(None),
        }
    }
}
