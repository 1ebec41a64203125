//! fedsim-runner: command-line front end for batch trial orchestration.
//!
//! Usage:
//!   fedsim-runner simulate --request batch.json [--db fedsim.db] [--settings fedsim.json]
//!   fedsim-runner import   --entities catalog.json [--db fedsim.db]
//!   fedsim-runner stats    --request stats.json [--db fedsim.db] [--settings fedsim.json]
//!   fedsim-runner wipe     [--db fedsim.db]
//!
//! Results are printed to stdout as JSON; progress goes to the log
//! (`RUST_LOG=info`).

mod stats;

use anyhow::{bail, Context, Result};
use fedsim_core::{
    config::Settings,
    store::EntityCatalog,
    BatchOrchestrator, BatchRequest, FedsimContext, ResultStore, SimStore,
};
use serde::de::DeserializeOwned;
use std::env;
use std::path::Path;

const DEFAULT_DB: &str = "fedsim.db";
const DEFAULT_SETTINGS: &str = "fedsim.json";

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");
    let db = flag_value(&args, "--db").unwrap_or(DEFAULT_DB);
    let settings_path = flag_value(&args, "--settings").unwrap_or(DEFAULT_SETTINGS);

    match command {
        "simulate" => {
            let request: BatchRequest = read_json(required(&args, "--request")?)?;
            simulate(db, settings_path, &request)
        }
        "import" => {
            let catalog: EntityCatalog = read_json(required(&args, "--entities")?)?;
            let store = open_store(db)?;
            let (federates, designs) = store.import_entities(&catalog)?;
            println!("{}", serde_json::json!({ "federates": federates, "designs": designs }));
            Ok(())
        }
        "stats" => {
            let request: stats::StatsRequest = read_json(required(&args, "--request")?)?;
            print_stats(db, settings_path, &request)
        }
        "wipe" => {
            let store = open_store(db)?;
            let before = store.trial_count()?;
            store.wipe()?;
            log::info!("wiped {before} stored trials from {db}");
            println!("{}", serde_json::json!({ "wiped": before }));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            print_usage();
            bail!("unknown command '{other}'")
        }
    }
}

fn simulate(db: &str, settings_path: &str, request: &BatchRequest) -> Result<()> {
    let ctx = FedsimContext::new(Settings::load(Path::new(settings_path))?);
    let store = open_store(db)?;
    let orchestrator = BatchOrchestrator::new(&ctx, &store, &store);

    let outcome = orchestrator.run_batch(request)?;
    log::info!(
        "batch {}: {} records, {} simulated, {} inserted",
        outcome.batch_id,
        outcome.records.len(),
        outcome.dispatched.len(),
        outcome.inserted
    );
    println!("{}", serde_json::to_string_pretty(&outcome.records)?);
    Ok(())
}

fn print_stats(db: &str, settings_path: &str, request: &stats::StatsRequest) -> Result<()> {
    let ctx = FedsimContext::new(Settings::load(Path::new(settings_path))?);
    let store = open_store(db)?;
    let orchestrator = BatchOrchestrator::new(&ctx, &store, &store);

    let filter = orchestrator.filter_for(&request.configuration, request.count)?;
    let records = store.find_matching(&filter)?;
    log::info!("stats: {} matching records, field {}", records.len(), request.field);

    let grouped = stats::aggregate(&records, &request.field, request.statistics.resolve())?;
    println!("{}", serde_json::to_string_pretty(&grouped)?);
    Ok(())
}

fn open_store(db: &str) -> Result<SimStore> {
    let store = SimStore::open(db).with_context(|| format!("opening database {db}"))?;
    store.migrate()?;
    Ok(store)
}

fn read_json<T: DeserializeOwned>(path: &str) -> Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {path}"))
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn required<'a>(args: &'a [String], flag: &str) -> Result<&'a str> {
    flag_value(args, flag).with_context(|| format!("missing required flag {flag} <path>"))
}

fn print_usage() {
    println!("fedsim-runner <command> [flags]");
    println!("  simulate --request <batch.json>   run or reuse a batch of seeds");
    println!("  import   --entities <catalog.json> load federates and designs");
    println!("  stats    --request <stats.json>   per-federate result statistics");
    println!("  wipe                               drop all stored trial results");
    println!("flags: --db <path> (default {DEFAULT_DB}), --settings <path> (default {DEFAULT_SETTINGS})");
}
