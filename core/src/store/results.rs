use super::{ResultStore, SimStore};
use crate::{
    error::FedsimResult,
    planner::TrialFilter,
    record::{TrialConfig, TrialRecord, TrialResults},
    run_config::RunConfig,
    types::{Seed, SimulationInfo},
};
use rusqlite::params;
use std::collections::BTreeSet;

/// Key columns of a filter, encoded the way rows are stored.
struct FilterKey {
    federate_ids: String,
    locations:    String,
    seed_from:    i64,
    /// `None` leaves the range open at the top.
    seed_to:      Option<i64>,
}

impl FilterKey {
    fn encode(filter: &TrialFilter) -> FedsimResult<Self> {
        Ok(Self {
            federate_ids: serde_json::to_string(&filter.config.federate_ids)?,
            locations:    serde_json::to_string(&filter.config.locations)?,
            seed_from:    filter.seeds.as_ref().map_or(0, |r| clamp_seed(r.start)),
            seed_to:      filter.seeds.as_ref().map(|r| clamp_seed(r.end)),
        })
    }
}

fn clamp_seed(seed: Seed) -> i64 {
    seed.min(i64::MAX as u64) as i64
}

const MATCH_CLAUSE: &str = "sim_name = ?1 AND sim_version = ?2
       AND federate_ids = ?3 AND locations = ?4
       AND turns = ?5 AND o_alg = ?6 AND f_alg = ?7
       AND seed >= ?8 AND (?9 IS NULL OR seed < ?9)";

impl SimStore {
    /// Drop every stored trial and rebuild the table and its indexes.
    pub fn wipe(&self) -> FedsimResult<()> {
        self.conn.execute_batch("DROP TABLE IF EXISTS trial_result;")?;
        self.conn
            .execute_batch(include_str!("../../../migrations/001_results.sql"))?;
        log::info!("store: trial results wiped and reindexed");
        Ok(())
    }

    pub fn trial_count(&self) -> FedsimResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM trial_result", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl ResultStore for SimStore {
    fn find_matching(&self, filter: &TrialFilter) -> FedsimResult<Vec<TrialRecord>> {
        let key = FilterKey::encode(filter)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT seed, federate_ids, locations, turns, o_alg, f_alg, start_cash, end_cash
             FROM trial_result
             WHERE {MATCH_CLAUSE}
             ORDER BY seed ASC"
        ))?;
        let rows = stmt
            .query_map(
                params![
                    filter.simulation.name,
                    filter.simulation.version,
                    key.federate_ids,
                    key.locations,
                    filter.config.turns as i64,
                    filter.config.o_alg,
                    filter.config.f_alg,
                    key.seed_from,
                    key.seed_to,
                ],
                |row| {
                    Ok(StoredTrial {
                        seed:         row.get::<_, i64>(0)? as u64,
                        federate_ids: row.get(1)?,
                        locations:    row.get(2)?,
                        turns:        row.get::<_, i64>(3)? as u32,
                        o_alg:        row.get(4)?,
                        f_alg:        row.get(5)?,
                        start_cash:   row.get(6)?,
                        end_cash:     row.get(7)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|row| row.into_record(&filter.simulation))
            .collect()
    }

    fn existing_seeds(&self, filter: &TrialFilter) -> FedsimResult<BTreeSet<Seed>> {
        let key = FilterKey::encode(filter)?;
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT seed FROM trial_result WHERE {MATCH_CLAUSE}"))?;
        let seeds = stmt
            .query_map(
                params![
                    filter.simulation.name,
                    filter.simulation.version,
                    key.federate_ids,
                    key.locations,
                    filter.config.turns as i64,
                    filter.config.o_alg,
                    filter.config.f_alg,
                    key.seed_from,
                    key.seed_to,
                ],
                |row| Ok(row.get::<_, i64>(0)? as u64),
            )?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(seeds)
    }

    fn insert_many(&self, records: &[TrialRecord]) -> FedsimResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let created_at = chrono::Utc::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO trial_result (
                    sim_name, sim_version, seed, federate_ids, locations, turns,
                    o_alg, f_alg, start_cash, end_cash, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for record in records {
                let run = &record.configuration.run;
                inserted += stmt.execute(params![
                    record.simulation.name,
                    record.simulation.version,
                    clamp_seed(record.seed),
                    serde_json::to_string(&run.federate_ids)?,
                    serde_json::to_string(&run.locations)?,
                    run.turns as i64,
                    run.o_alg,
                    run.f_alg,
                    serde_json::to_string(&record.configuration.start_cash)?,
                    serde_json::to_string(&record.results.end_cash)?,
                    created_at,
                ])?;
            }
        }
        tx.commit()?;

        if inserted < records.len() {
            log::warn!(
                "store: {} of {} trials were already stored and were skipped",
                records.len() - inserted,
                records.len()
            );
        }
        Ok(inserted)
    }
}

struct StoredTrial {
    seed:         u64,
    federate_ids: String,
    locations:    String,
    turns:        u32,
    o_alg:        String,
    f_alg:        String,
    start_cash:   String,
    end_cash:     String,
}

impl StoredTrial {
    fn into_record(self, simulation: &SimulationInfo) -> FedsimResult<TrialRecord> {
        Ok(TrialRecord {
            simulation:    simulation.clone(),
            seed:          self.seed,
            configuration: TrialConfig {
                run: RunConfig {
                    federate_ids: serde_json::from_str(&self.federate_ids)?,
                    locations:    serde_json::from_str(&self.locations)?,
                    turns:        self.turns,
                    o_alg:        self.o_alg,
                    f_alg:        self.f_alg,
                },
                start_cash: serde_json::from_str(&self.start_cash)?,
            },
            results: TrialResults {
                end_cash: serde_json::from_str(&self.end_cash)?,
            },
        })
    }
}
