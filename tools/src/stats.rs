//! Per-federate statistics over stored trial results.
//!
//! Records matching a request are unrolled into one sample per
//! (federate id, federate index) pair, zipping `federateIds` with the chosen
//! result column, then grouped.

use fedsim_core::{record::TrialRecord, RawRunConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRequest {
    #[serde(default)]
    pub count:         Option<u64>,
    #[serde(default)]
    pub configuration: RawRunConfig,
    #[serde(default = "default_field")]
    pub field:         String,
    #[serde(default)]
    pub statistics:    StatSelection,
}

fn default_field() -> String {
    "endCash".to_string()
}

/// Which aggregates to report. Each flag is tri-state on the wire.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatSelection {
    pub min:     Option<bool>,
    pub max:     Option<bool>,
    pub avg:     Option<bool>,
    pub std_dev: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selected {
    pub min:     bool,
    pub max:     bool,
    pub avg:     bool,
    pub std_dev: bool,
}

impl StatSelection {
    /// Nothing specified selects everything. Any explicit `false` turns every
    /// unspecified flag on. Otherwise only the flags set to `true` are kept.
    pub fn resolve(&self) -> Selected {
        let flags = [self.min, self.max, self.avg, self.std_dev];
        let fallback = if flags.iter().all(Option::is_none) {
            true
        } else {
            flags.contains(&Some(false))
        };
        let pick = |flag: Option<bool>| flag.unwrap_or(fallback);
        Selected {
            min:     pick(self.min),
            max:     pick(self.max),
            avg:     pick(self.avg),
            std_dev: pick(self.std_dev),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupKey {
    pub federate_id:    u64,
    pub federate_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FederateStats {
    #[serde(rename = "_id")]
    pub key:     GroupKey,
    pub count:   usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min:     Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max:     Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg:     Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
}

/// Group `records` by federate and compute the selected aggregates of
/// `field`. Groups come back ordered by federate id, then index.
pub fn aggregate(records: &[TrialRecord], field: &str, selected: Selected) -> anyhow::Result<Vec<FederateStats>> {
    let mut groups: std::collections::BTreeMap<GroupKey, Vec<f64>> = Default::default();
    for record in records {
        let values = record
            .column(field)
            .ok_or_else(|| anyhow::anyhow!("unknown statistics field '{field}'"))?;
        let ids = &record.configuration.run.federate_ids;
        for (federate_index, (&federate_id, &value)) in ids.iter().zip(values).enumerate() {
            groups
                .entry(GroupKey { federate_id, federate_index })
                .or_default()
                .push(value);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, samples)| summarize(key, &samples, selected))
        .collect())
}

fn summarize(key: GroupKey, samples: &[f64], selected: Selected) -> FederateStats {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    FederateStats {
        key,
        count:   samples.len(),
        min:     selected.min.then(|| samples.iter().copied().fold(f64::INFINITY, f64::min)),
        max:     selected.max.then(|| samples.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        avg:     selected.avg.then_some(mean),
        std_dev: selected.std_dev.then(|| variance.sqrt()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedsim_core::{
        record::{TrialConfig, TrialResults},
        types::SimulationInfo,
        RunConfig,
    };

    fn record(seed: u64, ids: Vec<u64>, end_cash: Vec<f64>) -> TrialRecord {
        TrialRecord {
            simulation: SimulationInfo::default(),
            seed,
            configuration: TrialConfig {
                run: RunConfig {
                    locations:    ids.iter().map(|_| vec![1]).collect(),
                    federate_ids: ids,
                    turns:        24,
                    o_alg:        "d6,a,1".into(),
                    f_alg:        "n".into(),
                },
                start_cash: vec![1000.0; end_cash.len()],
            },
            results: TrialResults { end_cash },
        }
    }

    fn sel(min: Option<bool>, max: Option<bool>, avg: Option<bool>, std_dev: Option<bool>) -> Selected {
        StatSelection { min, max, avg, std_dev }.resolve()
    }

    #[test]
    fn nothing_specified_selects_everything() {
        assert_eq!(
            sel(None, None, None, None),
            Selected { min: true, max: true, avg: true, std_dev: true }
        );
    }

    #[test]
    fn an_explicit_false_enables_the_unspecified() {
        assert_eq!(
            sel(Some(false), None, Some(true), None),
            Selected { min: false, max: true, avg: true, std_dev: true }
        );
    }

    #[test]
    fn only_true_flags_keep_just_those() {
        assert_eq!(
            sel(None, Some(true), None, None),
            Selected { min: false, max: true, avg: false, std_dev: false }
        );
    }

    #[test]
    fn groups_by_federate_id_and_position() {
        let records = vec![
            record(0, vec![2, 1], vec![10.0, 100.0]),
            record(1, vec![2, 1], vec![20.0, 300.0]),
            record(2, vec![2, 1], vec![30.0, 200.0]),
        ];
        let all = sel(None, None, None, None);
        let stats = aggregate(&records, "endCash", all).unwrap();

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].key, GroupKey { federate_id: 1, federate_index: 1 });
        assert_eq!(stats[0].count, 3);
        assert_eq!(stats[0].min, Some(100.0));
        assert_eq!(stats[0].max, Some(300.0));
        assert_eq!(stats[0].avg, Some(200.0));

        assert_eq!(stats[1].key, GroupKey { federate_id: 2, federate_index: 0 });
        let sd = stats[1].std_dev.unwrap();
        assert!((sd - (200.0f64 / 3.0).sqrt()).abs() < 1e-9, "population std-dev, got {sd}");
    }

    #[test]
    fn unselected_aggregates_are_omitted_from_json() {
        let records = vec![record(0, vec![1], vec![5.0])];
        let stats = aggregate(&records, "startCash", sel(None, None, Some(true), None)).unwrap();
        let json = serde_json::to_value(&stats[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "_id": { "federateId": 1, "federateIndex": 0 }, "count": 1, "avg": 1000.0 })
        );
    }

    #[test]
    fn unknown_field_is_rejected() {
        let records = vec![record(0, vec![1], vec![5.0])];
        assert!(aggregate(&records, "profit", sel(None, None, None, None)).is_err());
    }
}
