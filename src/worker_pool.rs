//! Worker Pool (C8): a fixed-size parallel executor over a batch of
//! `MatchSpec`s, preserving submission-order in its result vector (§4.8,
//! §5 "results must preserve submission-order mapping by explicit index").
//!
//! Realized with `rayon`: `par_iter().map(run_match)` schedules work across
//! a thread pool while `rayon`'s `collect` keeps results indexed to their
//! originating position, regardless of completion order. `run_batch` uses
//! rayon's ambient global pool (sized by `RAYON_NUM_THREADS`/available
//! parallelism); `run_batch_with_workers` builds and installs a scoped pool
//! of exactly `workers` threads for callers that were "constructed with N
//! workers" (§4.8) rather than happy to take the process default.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use rayon::prelude::*;
use tracing::info;

use crate::error::HarnessError;
use crate::match_runner::{run_match, MatchResult, MatchSpec};

/// Run every spec in `specs`, one result per spec in the same order, on
/// rayon's ambient global pool. A worker panic (e.g. an unreachable
/// arithmetic edge case) is caught at this boundary and reported as
/// `HarnessError::Worker` rather than unwinding the pool — one bad match
/// never takes down the batch (§4.8).
pub fn run_batch(specs: Vec<MatchSpec>) -> Vec<Result<MatchResult, HarnessError>> {
    run_on_pool(specs)
}

/// Same as [`run_batch`], but dispatches on a scoped pool of exactly
/// `workers` threads instead of the ambient global one (§4.8 "Construct
/// with N workers").
pub fn run_batch_with_workers(specs: Vec<MatchSpec>, workers: usize) -> Result<Vec<Result<MatchResult, HarnessError>>, HarnessError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| HarnessError::Worker(format!("failed to build a {workers}-thread pool: {e}")))?;
    Ok(pool.install(|| run_on_pool(specs)))
}

fn run_on_pool(specs: Vec<MatchSpec>) -> Vec<Result<MatchResult, HarnessError>> {
    let started = Instant::now();
    let count = specs.len();

    let results: Vec<Result<MatchResult, HarnessError>> = specs
        .into_par_iter()
        .map(|spec| match catch_unwind(AssertUnwindSafe(|| run_match(spec))) {
            Ok(result) => result,
            Err(payload) => Err(HarnessError::Worker(panic_message(payload))),
        })
        .collect();

    let elapsed = started.elapsed();
    let failures = results.iter().filter(|r| r.is_err()).count();
    info!(batch_size = count, failures, elapsed_ms = elapsed.as_millis() as u64, "batch complete");

    results
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::CompositeSpec;
    use crate::match_runner::{ScenarioSpec, SpawnMode};

    fn spec(seed: u32) -> MatchSpec {
        MatchSpec {
            seed,
            max_sim_seconds: 2.0,
            node_defense: 1.0,
            base_hp: Some(200.0),
            player_gas: 300.0,
            enemy_gas: 300.0,
            spawn_burst: 1,
            spawn_max_active: 4,
            ai_player: CompositeSpec::baseline(),
            ai_enemy: CompositeSpec::baseline(),
            scenario: Some(ScenarioSpec { with_base: true, initial_units_per_side: 1 }),
            template_names: None,
            battlefield: None,
            spawn_mode: SpawnMode::MirroredRandom,
            spawn_player: None,
            spawn_enemy: None,
        }
    }

    #[test]
    fn batch_preserves_submission_order() {
        let specs = vec![spec(1), spec(2), spec(3)];
        let results = run_batch(specs);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().spec.seed, 1);
        assert_eq!(results[1].as_ref().unwrap().spec.seed, 2);
        assert_eq!(results[2].as_ref().unwrap().spec.seed, 3);
    }

    #[test]
    fn a_config_error_surfaces_without_aborting_the_batch() {
        let mut bad = spec(4);
        bad.ai_player.target.family_id = "nope-target".to_string();
        let specs = vec![spec(5), bad, spec(6)];
        let results = run_batch(specs);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[test]
    fn run_batch_with_workers_preserves_order_on_a_scoped_pool() {
        let specs = vec![spec(1), spec(2), spec(3)];
        let results = run_batch_with_workers(specs, 2).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().spec.seed, 1);
        assert_eq!(results[1].as_ref().unwrap().spec.seed, 2);
        assert_eq!(results[2].as_ref().unwrap().spec.seed, 3);
    }
}
