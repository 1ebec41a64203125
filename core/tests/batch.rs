//! End-to-end batch behaviour against a fake simulator.

#![cfg(unix)]

mod common;

use common::*;
use fedsim_core::{
    BatchOrchestrator, BatchRequest, BatchState, FedsimError, PlacementError, ResultStore, TrialError,
};

fn request(json: &str) -> BatchRequest {
    serde_json::from_str(json).expect("request json")
}

#[test]
fn second_identical_batch_dispatches_nothing() {
    let (ctx, dir) = context_with_script(&cash_script());
    let store = seeded_store();
    let orchestrator = BatchOrchestrator::new(&ctx, &store, &store);
    let req = request(r#"{ "count": 3, "configuration": { "federateIds": [1, 2] } }"#);

    let first = orchestrator.run_batch(&req).unwrap();
    assert_eq!(first.state, BatchState::Complete);
    assert_eq!(first.dispatched, vec![0, 1, 2]);
    assert_eq!(first.inserted, 3);
    assert_eq!(first.records.len(), 3);
    assert_eq!(store.trial_count().unwrap(), 3);

    let mut seen = invocations(&dir);
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2]);

    let second = orchestrator.run_batch(&req).unwrap();
    assert!(second.dispatched.is_empty());
    assert_eq!(second.inserted, 0);
    assert_eq!(second.records, first.records);
    assert_eq!(invocations(&dir).len(), 3, "no simulator may run for cached seeds");
}

#[test]
fn records_carry_canonical_config_and_parsed_cash() {
    let (ctx, _dir) = context_with_script(&cash_script());
    let store = seeded_store();
    let orchestrator = BatchOrchestrator::new(&ctx, &store, &store);

    let outcome = orchestrator
        .run_batch(&request(r#"{ "count": 2, "configuration": { "federateIds": [1, 2] } }"#))
        .unwrap();

    let record = &outcome.records[1];
    assert_eq!(record.seed, 1);
    assert_eq!(record.simulation.name, "ofspy");
    let run = &record.configuration.run;
    assert_eq!(run.federate_ids, vec![1, 2]);
    assert_eq!(run.turns, 24);
    assert_eq!(run.o_alg, "d6,a,1");
    assert_eq!(run.f_alg, "n");
    assert_eq!(run.locations, vec![vec![6, 1, 5], vec![1, 6]]);
    assert_eq!(record.configuration.start_cash, vec![1000.0, 1000.0]);
    assert_eq!(record.results.end_cash, vec![1501.0, 901.0]);
}

#[test]
fn explicit_defaults_reuse_cached_results() {
    let (ctx, dir) = context_with_script(&cash_script());
    let store = seeded_store();
    let orchestrator = BatchOrchestrator::new(&ctx, &store, &store);

    orchestrator
        .run_batch(&request(r#"{ "count": 2, "configuration": { "federateIds": [1, 2] } }"#))
        .unwrap();

    let spelled_out = request(
        r#"{ "count": 2, "configuration": {
            "federateIds": [1, 2], "turns": 24, "oAlg": "d6,a,1", "fAlg": "n",
            "locations": [[6, 1, 5], [1, null]]
        } }"#,
    );
    let outcome = orchestrator.run_batch(&spelled_out).unwrap();
    assert!(outcome.dispatched.is_empty());
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(invocations(&dir).len(), 2);
}

#[test]
fn growing_the_count_only_runs_new_seeds() {
    let (ctx, dir) = context_with_script(&cash_script());
    let store = seeded_store();
    let orchestrator = BatchOrchestrator::new(&ctx, &store, &store);

    orchestrator
        .run_batch(&request(r#"{ "count": 3, "configuration": { "federateIds": [2] } }"#))
        .unwrap();
    let outcome = orchestrator
        .run_batch(&request(r#"{ "count": 5, "configuration": { "federateIds": [2] }, "background": true }"#))
        .unwrap();

    assert_eq!(outcome.dispatched, vec![3, 4]);
    let seeds: Vec<_> = outcome.records.iter().map(|r| r.seed).collect();
    assert_eq!(seeds, vec![0, 1, 2, 3, 4]);
    assert_eq!(invocations(&dir).len(), 5);
}

#[test]
fn different_turns_are_a_different_cache_entry() {
    let (ctx, _dir) = context_with_script(&cash_script());
    let store = seeded_store();
    let orchestrator = BatchOrchestrator::new(&ctx, &store, &store);

    orchestrator
        .run_batch(&request(r#"{ "count": 2, "configuration": { "federateIds": [2] } }"#))
        .unwrap();
    let outcome = orchestrator
        .run_batch(&request(r#"{ "count": 2, "configuration": { "federateIds": [2], "turns": 12 } }"#))
        .unwrap();

    assert_eq!(outcome.dispatched, vec![0, 1]);
    assert_eq!(store.trial_count().unwrap(), 4);
}

#[test]
fn malformed_output_fails_batch_and_persists_nothing() {
    let script = format!("{PARSE_SEED}\nif [ \"$seed\" = \"1\" ]; then echo abc; exit 0; fi\necho \"1:2\"");
    let (ctx, _dir) = context_with_script(&script);
    let store = seeded_store();
    let orchestrator = BatchOrchestrator::new(&ctx, &store, &store);

    let err = orchestrator
        .run_batch(&request(r#"{ "count": 4, "configuration": { "federateIds": [1] } }"#))
        .unwrap_err();

    match err {
        FedsimError::Trial { seed: 1, source: TrialError::Parse { text, .. } } => assert_eq!(text, "abc"),
        other => panic!("expected parse failure for seed 1, got {other:?}"),
    }
    assert_eq!(store.trial_count().unwrap(), 0);
    assert_eq!(ctx.gate().active(), 0);
}

#[test]
fn truncated_output_is_never_cached() {
    let script = format!("{PARSE_SEED}\necho '1000:1500'");
    let (ctx, dir) = context_with_script(&script);
    let store = seeded_store();
    let orchestrator = BatchOrchestrator::new(&ctx, &store, &store);
    let req = request(r#"{ "count": 1, "configuration": { "federateIds": [1, 2] } }"#);

    for _ in 0..2 {
        let err = orchestrator.run_batch(&req).unwrap_err();
        assert!(matches!(err, FedsimError::Trial { seed: 0, source: TrialError::Parse { .. } }), "{err:?}");
        assert_eq!(store.trial_count().unwrap(), 0);
    }
    assert_eq!(invocations(&dir), vec![0, 0], "a failed seed must be simulated again");
}

#[test]
fn nonzero_exit_is_a_process_error() {
    let script = format!("{PARSE_SEED}\necho 'out of fuel' >&2\nexit 3");
    let (ctx, _dir) = context_with_script(&script);
    let store = seeded_store();
    let orchestrator = BatchOrchestrator::new(&ctx, &store, &store);

    let err = orchestrator
        .run_batch(&request(r#"{ "count": 1, "configuration": { "federateIds": [1] } }"#))
        .unwrap_err();

    match err {
        FedsimError::Trial { seed: 0, source: TrialError::Exit { code, stderr } } => {
            assert_eq!(code, Some(3));
            assert!(stderr.contains("out of fuel"));
        }
        other => panic!("expected exit failure, got {other:?}"),
    }
}

#[test]
fn invalid_requests_fail_before_dispatch() {
    let (ctx, dir) = context_with_script(&cash_script());
    let store = seeded_store();
    let orchestrator = BatchOrchestrator::new(&ctx, &store, &store);

    let missing = orchestrator
        .run_batch(&request(r#"{ "count": 2, "configuration": { "turns": 3 } }"#))
        .unwrap_err();
    assert!(missing.is_config_error());

    let unknown = orchestrator
        .run_batch(&request(r#"{ "count": 2, "configuration": { "federateIds": [99] } }"#))
        .unwrap_err();
    assert!(matches!(unknown, FedsimError::UnknownFederate { id: 99 }));

    let bad_kind = orchestrator
        .run_batch(&request(r#"{ "count": 2, "configuration": { "federateIds": [1, 3] } }"#))
        .unwrap_err();
    assert!(matches!(
        bad_kind,
        FedsimError::Placement(PlacementError::UnknownKind { design_id: 30, .. })
    ));

    let bad_slot = orchestrator
        .run_batch(&request(r#"{ "count": 2, "configuration": { "federateIds": [2], "locations": [[9]] } }"#))
        .unwrap_err();
    assert!(matches!(bad_slot, FedsimError::Placement(PlacementError::SlotOutOfRange { slot: 9, .. })));

    assert!(invocations(&dir).is_empty());
    assert_eq!(store.trial_count().unwrap(), 0);
}

#[test]
fn zero_count_returns_empty_without_dispatch() {
    let (ctx, dir) = context_with_script(&cash_script());
    let store = seeded_store();
    let orchestrator = BatchOrchestrator::new(&ctx, &store, &store);

    let outcome = orchestrator
        .run_batch(&request(r#"{ "count": 0, "configuration": { "federateIds": [1] } }"#))
        .unwrap();
    assert!(outcome.dispatched.is_empty());
    assert!(outcome.records.is_empty());
    assert!(invocations(&dir).is_empty());
}

#[test]
fn symmetric_placement_changes_the_cache_key() {
    let (ctx, _dir) = context_with_script(&cash_script());
    let store = seeded_store();
    let orchestrator = BatchOrchestrator::new(&ctx, &store, &store);

    let outcome = orchestrator
        .run_batch(&request(
            r#"{ "count": 1, "configuration": { "federateIds": [1, 2], "locations": "symmetric" } }"#,
        ))
        .unwrap();
    assert_eq!(outcome.records[0].configuration.run.locations, vec![vec![6, 1, 5], vec![4, 3]]);

    let filter_hits = store
        .find_matching(&fedsim_core::planner::TrialFilter::new(
            &ctx.settings().simulation,
            &outcome.records[0].configuration.run,
            1,
        ))
        .unwrap();
    assert_eq!(filter_hits.len(), 1);
}
