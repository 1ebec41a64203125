//! Batch orchestration: one client request spanning many seeds.
//!
//! LIFECYCLE (per batch, never reordered):
//!   1. Planning    canonicalize, resolve placement once, find missing seeds
//!   2. Dispatched  one job per missing seed, fed to worker threads
//!   3. Settling    every job reaches success or failure
//!   4. Persisting  one bulk insert of the new records
//!   5. Complete    re-query with the batch filter, return old + new
//!   Any step may end in Failed instead.
//!
//! FAILURE POLICY: abort on first failure. The first failing job cancels the
//! batch: queued jobs leave the gate, running simulators are killed, and
//! nothing from the batch is persisted.

use crate::{
    context::FedsimContext,
    entity::EntitySource,
    error::{FedsimError, FedsimResult, TrialError},
    gate::CancelToken,
    invoker::{TrialInvoker, TrialJob},
    placement::resolve_run,
    planner::{DedupPlanner, TrialFilter},
    record::TrialRecord,
    run_config::{canonicalize, BatchRequest, RawRunConfig, RunConfig},
    store::ResultStore,
    types::{Priority, Seed},
};
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Planning,
    Dispatched,
    Settling,
    Persisting,
    Complete,
    Failed,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch_id:   String,
    pub state:      BatchState,
    /// Seeds that needed a simulator run, ascending.
    pub dispatched: Vec<Seed>,
    /// New rows written by this batch.
    pub inserted:   usize,
    /// Every stored record matching the batch, ascending by seed.
    pub records:    Vec<TrialRecord>,
}

struct BatchProgress {
    id:    String,
    state: BatchState,
}

impl BatchProgress {
    fn start() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        log::info!("batch {id}: {:?}", BatchState::Planning);
        Self { id, state: BatchState::Planning }
    }

    fn advance(&mut self, next: BatchState) {
        log::info!("batch {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }

    /// Mark the batch failed and hand the error back for propagation.
    fn fail(&mut self, err: FedsimError) -> FedsimError {
        log::warn!("batch {}: {:?} -> Failed: {err}", self.id, self.state);
        self.state = BatchState::Failed;
        err
    }
}

pub struct BatchOrchestrator<'a> {
    ctx:      &'a FedsimContext,
    results:  &'a dyn ResultStore,
    entities: &'a dyn EntitySource,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(ctx: &'a FedsimContext, results: &'a dyn ResultStore, entities: &'a dyn EntitySource) -> Self {
        Self { ctx, results, entities }
    }

    pub fn run_batch(&self, request: &BatchRequest) -> FedsimResult<BatchOutcome> {
        let mut progress = BatchProgress::start();
        self.run_stages(request, &mut progress)
            .map_err(|err| progress.fail(err))
    }

    /// The store filter a request resolves to, without running anything.
    /// Shares canonicalization and placement with `run_batch`, so both agree
    /// on which stored trials belong to a request. Without a `count` every
    /// stored seed matches.
    pub fn filter_for(&self, configuration: &RawRunConfig, count: Option<u64>) -> FedsimResult<TrialFilter> {
        let (config, _) = self.resolve(configuration)?;
        let simulation = &self.ctx.settings().simulation;
        Ok(match count {
            Some(count) => TrialFilter::new(simulation, &config, count),
            None => TrialFilter::all_seeds(simulation, &config),
        })
    }

    fn resolve(&self, configuration: &RawRunConfig) -> FedsimResult<(RunConfig, Vec<String>)> {
        let draft = canonicalize(configuration, &self.ctx.settings().defaults)?;
        let placement = resolve_run(self.ctx.entities(), self.entities, &draft)?;
        Ok((draft.into_config(placement.locations), placement.tokens))
    }

    fn run_stages(&self, request: &BatchRequest, progress: &mut BatchProgress) -> FedsimResult<BatchOutcome> {
        let settings = self.ctx.settings();
        let count = request.count();
        let priority = Priority::from_background_flag(request.background);

        let (config, tokens) = self.resolve(&request.configuration)?;
        let plan = DedupPlanner::new(self.results).plan(&settings.simulation, &config, count)?;
        log::info!(
            "batch {}: count={count} cached={} missing={} priority={}",
            progress.id,
            plan.existing.len(),
            plan.missing.len(),
            priority.name()
        );

        let mut inserted = 0;
        if !plan.missing.is_empty() {
            progress.advance(BatchState::Dispatched);
            let outcomes = self.dispatch(&config, &tokens, &plan.missing, priority)?;

            progress.advance(BatchState::Settling);
            let records = settle(outcomes)?;

            progress.advance(BatchState::Persisting);
            inserted = self.results.insert_many(&records)?;
        }

        let records = self.results.find_matching(&plan.filter)?;
        progress.advance(BatchState::Complete);
        Ok(BatchOutcome {
            batch_id: progress.id.clone(),
            state: progress.state,
            dispatched: plan.missing,
            inserted,
            records,
        })
    }

    /// Run every seed and wait for all of them. Parallelism is bounded by
    /// the gate; the worker count only bounds idle threads.
    fn dispatch(
        &self,
        config: &RunConfig,
        tokens: &[String],
        seeds: &[Seed],
        priority: Priority,
    ) -> FedsimResult<Vec<(Seed, Result<TrialRecord, TrialError>)>> {
        let invoker = self.ctx.invoker();
        let cancel = CancelToken::new();
        let (tx, rx) = crossbeam_channel::unbounded::<Seed>();
        for seed in seeds {
            let _ = tx.send(*seed);
        }
        drop(tx);

        let workers = seeds.len().min(self.ctx.settings().dispatch_workers()).max(1);
        thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let rx = rx.clone();
                    let (invoker, cancel) = (&invoker, &cancel);
                    s.spawn(move || run_worker(invoker, &rx, config, tokens, priority, cancel))
                })
                .collect();

            let mut outcomes = Vec::with_capacity(seeds.len());
            for handle in handles {
                let done = handle
                    .join()
                    .map_err(|_| anyhow::anyhow!("batch worker thread panicked"))?;
                outcomes.extend(done);
            }
            Ok(outcomes)
        })
    }
}

fn run_worker(
    invoker: &TrialInvoker<'_>,
    seeds: &crossbeam_channel::Receiver<Seed>,
    config: &RunConfig,
    tokens: &[String],
    priority: Priority,
    cancel: &CancelToken,
) -> Vec<(Seed, Result<TrialRecord, TrialError>)> {
    let mut done = Vec::new();
    for seed in seeds.iter() {
        let job = TrialJob { seed, config, tokens, priority };
        let outcome = invoker.run(&job, cancel);
        if let Err(err) = &outcome {
            if !err.is_cancelled() {
                log::warn!("seed={seed} failed, cancelling batch: {err}");
                cancel.cancel();
            }
        }
        done.push((seed, outcome));
    }
    done
}

/// All records in seed order, or the lowest-seed real failure.
fn settle(mut outcomes: Vec<(Seed, Result<TrialRecord, TrialError>)>) -> FedsimResult<Vec<TrialRecord>> {
    outcomes.sort_by_key(|(seed, _)| *seed);

    let first_failure = outcomes
        .iter()
        .position(|(_, o)| matches!(o, Err(e) if !e.is_cancelled()))
        .or_else(|| outcomes.iter().position(|(_, o)| o.is_err()));
    if let Some(index) = first_failure {
        let (seed, outcome) = outcomes.swap_remove(index);
        if let Err(source) = outcome {
            return Err(FedsimError::Trial { seed, source });
        }
    }

    Ok(outcomes
        .into_iter()
        .filter_map(|(_, outcome)| outcome.ok())
        .collect())
}
