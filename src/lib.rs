//! `arena_core`: a headless training and evaluation harness for a
//! deterministic 2D combat simulator.
//!
//! The crate is organized as one module per harness component (C1-C13):
//! a seeded PRNG threaded explicitly through every random choice, a unit
//! and template model, physics/damage and projectile systems, a composite
//! target/movement/shoot AI, a fixed-timestep battle session, a match
//! runner that turns a `MatchSpec` into a `MatchResult`, a rayon-backed
//! worker pool, a fitness aggregator (including the Wilson score lower
//! bound used for conservative ranking), schema-typed parameter genetics,
//! a phased training orchestrator, and a JSON leaderboard store shared
//! between runs. The `arena` binary (`src/bin/arena.rs`) is the only
//! consumer that touches wall-clock time or the filesystem's CLI surface;
//! everything in this library is deterministic given its inputs.

pub mod ai;
pub mod battle;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod fitness;
pub mod genetics;
pub mod leaderboard;
pub mod match_runner;
pub mod physics;
pub mod projectile;
pub mod rng;
pub mod templates;
pub mod training;
pub mod unit;
pub mod worker_pool;

pub use error::{HarnessError, HarnessResult};

#[cfg(test)]
mod integration_tests {
    //! Fixed-seed, whole-harness smoke tests: one batch of matches end to
    //! end through the worker pool, then an aggregate over the results.
    //! Unit-level behavior belongs in each module's own `#[cfg(test)]`
    //! block; this module only exercises the seams between components.

    use crate::ai::CompositeSpec;
    use crate::domain::Side;
    use crate::fitness::aggregate;
    use crate::match_runner::{MatchSpec, ScenarioSpec, SpawnMode};
    use crate::worker_pool::run_batch;

    fn baseline_spec(seed: u32) -> MatchSpec {
        MatchSpec {
            seed,
            max_sim_seconds: 20.0,
            node_defense: 1.0,
            base_hp: Some(200.0),
            player_gas: 400.0,
            enemy_gas: 400.0,
            spawn_burst: 2,
            spawn_max_active: 6,
            ai_player: CompositeSpec::baseline(),
            ai_enemy: CompositeSpec::baseline(),
            scenario: Some(ScenarioSpec { with_base: true, initial_units_per_side: 2 }),
            template_names: None,
            battlefield: None,
            spawn_mode: SpawnMode::MirroredRandom,
            spawn_player: None,
            spawn_enemy: None,
        }
    }

    #[test]
    fn a_batch_of_mirrored_matches_runs_to_completion_and_aggregates() {
        let specs = vec![baseline_spec(1), baseline_spec(2), baseline_spec(3)];
        let results = run_batch(specs);
        assert!(results.iter().all(|r| r.is_ok()));
        let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        let agg = aggregate(&results, |_, _| Side::Player);
        assert_eq!(agg.games, 3);
        assert_eq!(agg.wins + agg.ties + agg.losses, 3);
    }
}
