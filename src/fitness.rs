//! Fitness Aggregator (C9): per-side scoring, cross-match aggregation, and
//! the Wilson score lower bound used to rank candidates conservatively
//! (§4.9).

use crate::domain::Side;
use crate::match_runner::MatchResult;

/// `scoreForSide(outcome, gasWorthDelta) = O × 1_000_000 + gasWorthDelta`,
/// `O ∈ {2, 1, 0}` for win/tie/loss.
pub fn score_for_side(win: bool, tie: bool, gas_worth_delta: f32) -> f64 {
    let o = if win {
        2.0
    } else if tie {
        1.0
    } else {
        0.0
    };
    o * 1_000_000.0 + gas_worth_delta as f64
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Aggregate {
    pub games: u32,
    pub wins: u32,
    pub ties: u32,
    pub losses: u32,
    pub avg_gas_worth_delta: f64,
    pub score: f64,
}

/// Fold a set of `MatchResult`s into an `Aggregate`, labeling each result's
/// "candidate side" with `candidate_side(result, index)`.
pub fn aggregate(results: &[MatchResult], candidate_side: impl Fn(&MatchResult, usize) -> Side) -> Aggregate {
    let mut agg = Aggregate::default();
    if results.is_empty() {
        return agg;
    }
    let mut gas_sum = 0.0f64;
    let mut score_sum = 0.0f64;
    for (i, result) in results.iter().enumerate() {
        let side = match candidate_side(result, i) {
            Side::Player => &result.sides.player,
            Side::Enemy => &result.sides.enemy,
        };
        agg.games += 1;
        if side.win {
            agg.wins += 1;
        } else if side.tie {
            agg.ties += 1;
        } else {
            agg.losses += 1;
        }
        gas_sum += side.gas_worth_delta as f64;
        score_sum += side.score;
    }
    agg.avg_gas_worth_delta = gas_sum / agg.games as f64;
    agg.score = score_sum / agg.games as f64;
    agg
}

/// Wilson score lower bound (§4.9): `(p̂ + z²/(2n) − z·√((p̂(1−p̂)+z²/(4n))/n)) / (1+z²/n)`.
/// Returns 0 for `games ≤ 0`, matching the degenerate no-data case used
/// across the training orchestrator's ranking (§4.11).
pub fn wilson_lower_bound(wins: u32, games: u32) -> f64 {
    wilson_lower_bound_z(wins, games, 1.96)
}

pub fn wilson_lower_bound_z(wins: u32, games: u32, z: f64) -> f64 {
    if games == 0 {
        return 0.0;
    }
    let n = games as f64;
    let p_hat = wins as f64 / n;
    let z2 = z * z;
    let numerator = p_hat + z2 / (2.0 * n) - z * ((p_hat * (1.0 - p_hat) + z2 / (4.0 * n)) / n).sqrt();
    let denominator = 1.0 + z2 / n;
    numerator / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::CompositeSpec;
    use crate::match_runner::{MatchOutcome, MatchSpec, ScenarioSpec, SideResult, Sides, SpawnMode};

    fn dummy_spec() -> MatchSpec {
        MatchSpec {
            seed: 1,
            max_sim_seconds: 1.0,
            node_defense: 1.0,
            base_hp: None,
            player_gas: 0.0,
            enemy_gas: 0.0,
            spawn_burst: 1,
            spawn_max_active: 1,
            ai_player: CompositeSpec::baseline(),
            ai_enemy: CompositeSpec::baseline(),
            scenario: Some(ScenarioSpec { with_base: false, initial_units_per_side: 0 }),
            template_names: None,
            battlefield: None,
            spawn_mode: SpawnMode::MirroredRandom,
            spawn_player: None,
            spawn_enemy: None,
        }
    }

    fn side(win: bool, tie: bool, gas_worth_delta: f32) -> SideResult {
        SideResult {
            win,
            tie,
            gas_start: 0.0,
            gas_end: 0.0,
            on_field_gas_value_start: 0.0,
            on_field_gas_value_end: 0.0,
            gas_worth_delta,
            score: score_for_side(win, tie, gas_worth_delta),
        }
    }

    fn result(player: SideResult, enemy: SideResult) -> MatchResult {
        MatchResult {
            spec: dummy_spec(),
            sim_seconds_elapsed: 1.0,
            outcome: MatchOutcome { player_victory: player.win, reason: "test".to_string() },
            sides: Sides { player, enemy },
        }
    }

    #[test]
    fn wilson_lower_bound_matches_known_values() {
        // Computed directly from the formula above; 10/10 and 0/0 are the
        // exact boundary cases, 18/20 is the textbook Wilson-interval
        // example (Wikipedia's binomial proportion confidence interval
        // worked example for n=20, x=18, z=1.96).
        assert!((wilson_lower_bound(18, 20) - 0.6990).abs() < 1e-3);
        assert_eq!(wilson_lower_bound(0, 0), 0.0);
        assert!((wilson_lower_bound(10, 10) - 0.7225).abs() < 1e-3);
    }

    #[test]
    fn aggregate_averages_score_and_gas_delta() {
        let results = vec![
            result(side(true, false, 50.0), side(false, false, -50.0)),
            result(side(false, false, -30.0), side(true, false, 30.0)),
        ];
        let agg = aggregate(&results, |_, _| Side::Player);
        assert_eq!(agg.games, 2);
        assert_eq!(agg.wins, 1);
        assert_eq!(agg.losses, 1);
        assert_eq!(agg.ties, 0);
        assert!((agg.avg_gas_worth_delta - 10.0).abs() < 1e-6);
    }

    #[test]
    fn aggregate_counts_ties_for_both_sides() {
        let results = vec![result(side(false, true, 0.0), side(false, true, 0.0))];
        let agg_player = aggregate(&results, |_, _| Side::Player);
        let agg_enemy = aggregate(&results, |_, _| Side::Enemy);
        assert_eq!(agg_player.ties, 1);
        assert_eq!(agg_enemy.ties, 1);
    }
}

#[cfg(test)]
mod proptests {
    //! Bounds/monotonicity as "for all win/game counts" properties (§8.1),
    //! rather than a handful of fixed examples.

    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn lower_bound_never_exceeds_the_raw_win_rate(games in 1u32..500) {
            for wins in 0..=games {
                let lb = wilson_lower_bound(wins, games);
                let p_hat = wins as f64 / games as f64;
                prop_assert!(lb <= p_hat + 1e-9);
                prop_assert!(lb >= 0.0);
            }
        }

        #[test]
        fn lower_bound_is_non_decreasing_in_wins_for_fixed_games(games in 1u32..500) {
            let mut prev = wilson_lower_bound(0, games);
            for wins in 1..=games {
                let cur = wilson_lower_bound(wins, games);
                prop_assert!(cur >= prev - 1e-9);
                prev = cur;
            }
        }

        #[test]
        fn all_wins_bound_is_below_one(games in 1u32..2000) {
            let lb = wilson_lower_bound(games, games);
            prop_assert!(lb > 0.0 && lb < 1.0);
        }
    }
}
