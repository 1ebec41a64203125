//! Shared fixtures: an in-memory store seeded with two federates, and
//! throwaway `/bin/sh` scripts standing in for the simulator.

#![allow(dead_code)]

use fedsim_core::{
    config::Settings,
    entity::{Design, Federate},
    store::EntityCatalog,
    FedsimContext, SimStore,
};
use std::path::PathBuf;

pub fn catalog() -> EntityCatalog {
    let design = |id: u64, kind: &str, components: &[&str]| Design {
        design_id:   id,
        object_type: kind.to_string(),
        components:  components.iter().map(|c| c.to_string()).collect(),
    };
    EntityCatalog {
        federates: vec![
            Federate { federate_id: 1, design_ids: vec![11, 10, 12] },
            Federate { federate_id: 2, design_ids: vec![20, 21] },
            Federate { federate_id: 3, design_ids: vec![30] },
        ],
        designs: vec![
            design(10, "GROUND", &["pSGL"]),
            design(11, "SAT", &["VIS"]),
            design(12, "SAT", &["VIS", "SAR", "pSGL"]),
            design(20, "GROUND", &["pSGL", "oSGL"]),
            design(21, "SAT", &["VIS", "SAR", "DAT", "pISL", "oISL"]),
            design(30, "SUBMARINE", &["VIS"]),
        ],
    }
}

pub fn seeded_store() -> SimStore {
    let store = SimStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store.import_entities(&catalog()).expect("import entities");
    store
}

/// A fresh scratch directory under the system temp dir.
pub fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fedsim-test-{}", uuid::Uuid::new_v4().simple()));
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

/// Write `body` as a shell script in `dir` and return its path.
pub fn write_script(dir: &PathBuf, body: &str) -> PathBuf {
    let path = dir.join("sim.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    path
}

/// Script prelude that extracts the `-s` value into `$seed` and the highest
/// token player index into `$players`, and records the seed, one line per
/// invocation, in `invocations.log`.
pub const PARSE_SEED: &str = r#"
seed=""
prev=""
players=0
for arg in "$@"; do
  if [ "$prev" = "-s" ]; then seed="$arg"; fi
  case "$arg" in
    *@*) p="${arg%%.*}"; if [ "$p" -gt "$players" ]; then players="$p"; fi ;;
  esac
  prev="$arg"
done
echo "$seed" >> invocations.log
"#;

/// A simulator that reports one line per player: player 1 ends with
/// `1500 + seed`, each later player 600 less.
pub fn cash_script() -> String {
    format!(
        r#"{PARSE_SEED}
p=1
while [ "$p" -le "$players" ]; do
  echo "1000:$((1500 + seed - 600 * (p - 1)))"
  p=$((p + 1))
done"#
    )
}

pub fn settings_for(dir: &PathBuf, script: PathBuf) -> Settings {
    let _ = env_logger::builder().is_test(true).try_init();
    Settings {
        max_processes: 4,
        interpreter:   "sh".to_string(),
        script,
        working_dir:   dir.clone(),
        ..Settings::default()
    }
}

pub fn context_with_script(body: &str) -> (FedsimContext, PathBuf) {
    let dir = scratch_dir();
    let script = write_script(&dir, body);
    (FedsimContext::new(settings_for(&dir, script)), dir)
}

/// Seeds the fake simulator was started with, in invocation order.
pub fn invocations(dir: &PathBuf) -> Vec<u64> {
    match std::fs::read_to_string(dir.join("invocations.log")) {
        Ok(text) => text.lines().filter_map(|l| l.trim().parse().ok()).collect(),
        Err(_) => Vec::new(),
    }
}
