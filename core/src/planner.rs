//! Dedup planning: which seeds of a batch still need a simulator run.
//!
//! RULE: filters are built only from the canonical config, so any two
//! requests that canonicalize to the same config share cached results.

use crate::{
    error::FedsimResult,
    record::TrialRecord,
    run_config::RunConfig,
    store::ResultStore,
    types::{Seed, SimulationInfo},
};
use std::collections::BTreeSet;
use std::ops::Range;

/// Match criteria for cached trials: simulator identity, every canonical
/// config field, and an optional seed range.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialFilter {
    pub simulation: SimulationInfo,
    pub config:     RunConfig,
    /// `None` matches every stored seed.
    pub seeds:      Option<Range<Seed>>,
}

impl TrialFilter {
    /// Seeds `0..count` of `config`.
    pub fn new(simulation: &SimulationInfo, config: &RunConfig, count: u64) -> Self {
        Self::with_seeds(simulation, config, Some(0..count))
    }

    /// Every stored seed of `config`.
    pub fn all_seeds(simulation: &SimulationInfo, config: &RunConfig) -> Self {
        Self::with_seeds(simulation, config, None)
    }

    fn with_seeds(simulation: &SimulationInfo, config: &RunConfig, seeds: Option<Range<Seed>>) -> Self {
        Self {
            simulation: simulation.clone(),
            config:     config.clone(),
            seeds,
        }
    }

    pub fn matches(&self, record: &TrialRecord) -> bool {
        record.simulation == self.simulation
            && record.configuration.run == self.config
            && self.seeds.as_ref().map_or(true, |r| r.contains(&record.seed))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DedupPlan {
    pub filter:   TrialFilter,
    pub existing: BTreeSet<Seed>,
    /// Ascending.
    pub missing:  Vec<Seed>,
}

pub struct DedupPlanner<'s, S: ResultStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: ResultStore + ?Sized> DedupPlanner<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    pub fn plan(&self, simulation: &SimulationInfo, config: &RunConfig, count: u64) -> FedsimResult<DedupPlan> {
        let filter = TrialFilter::new(simulation, config, count);
        let existing = self.store.existing_seeds(&filter)?;
        let missing = (0..count)
            .filter(|seed| !existing.contains(seed))
            .collect();
        Ok(DedupPlan { filter, existing, missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{TrialConfig, TrialResults};
    use crate::store::SimStore;

    fn config(turns: u32) -> RunConfig {
        RunConfig {
            federate_ids: vec![1, 2],
            locations:    vec![vec![1, 6], vec![1, 6]],
            turns,
            o_alg:        "d6,a,1".into(),
            f_alg:        "n".into(),
        }
    }

    fn record(config: &RunConfig, seed: Seed) -> TrialRecord {
        TrialRecord {
            simulation:    SimulationInfo::default(),
            seed,
            configuration: TrialConfig { run: config.clone(), start_cash: vec![1.0, 1.0] },
            results:       TrialResults { end_cash: vec![2.0, 2.0] },
        }
    }

    #[test]
    fn missing_is_the_complement_of_stored_seeds() {
        let store = SimStore::in_memory().unwrap();
        store.migrate().unwrap();
        let cfg = config(24);
        store
            .insert_many(&[record(&cfg, 0), record(&cfg, 2), record(&cfg, 9), record(&config(12), 1)])
            .unwrap();

        let plan = DedupPlanner::new(&store).plan(&SimulationInfo::default(), &cfg, 5).unwrap();
        assert_eq!(plan.existing, BTreeSet::from([0, 2]));
        assert_eq!(plan.missing, vec![1, 3, 4]);
    }

    #[test]
    fn identical_configs_build_identical_filters() {
        let sim = SimulationInfo::default();
        assert_eq!(TrialFilter::new(&sim, &config(24), 3), TrialFilter::new(&sim, &config(24), 3));
        assert_ne!(TrialFilter::new(&sim, &config(24), 3), TrialFilter::new(&sim, &config(12), 3));
    }

    #[test]
    fn other_simulator_versions_do_not_match() {
        let cfg = config(24);
        let newer = SimulationInfo { name: "ofspy".into(), version: "2.0".into() };
        let filter = TrialFilter::new(&newer, &cfg, 10);
        assert!(!filter.matches(&record(&cfg, 1)));
        assert!(TrialFilter::new(&SimulationInfo::default(), &cfg, 10).matches(&record(&cfg, 1)));
    }

    #[test]
    fn open_filter_returns_every_stored_seed() {
        let store = SimStore::in_memory().unwrap();
        store.migrate().unwrap();
        let cfg = config(24);
        let records: Vec<_> = (0..150).map(|seed| record(&cfg, seed)).collect();
        store.insert_many(&records).unwrap();

        let sim = SimulationInfo::default();
        assert_eq!(store.find_matching(&TrialFilter::new(&sim, &cfg, 100)).unwrap().len(), 100);
        let all = store.find_matching(&TrialFilter::all_seeds(&sim, &cfg)).unwrap();
        assert_eq!(all.len(), 150);
        assert!(TrialFilter::all_seeds(&sim, &cfg).matches(&record(&cfg, 1_000_000)));
    }
}
