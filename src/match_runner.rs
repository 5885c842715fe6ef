//! Match Runner (C7): seeds one `BattleState` from a `MatchSpec`, deploys
//! symmetric free starters, drives a separate spawn loop (mirrored-random
//! or AI-driven), advances the tick loop to an outcome or deadline, and
//! folds the result into a per-side `MatchResult` (§4.7).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ai::CompositeSpec;
use crate::battle::{BattleState, Outcome};
use crate::config::SimConfig;
use crate::constants::{AI_SPAWN_INTERVAL_MAX, AI_SPAWN_INTERVAL_MIN, BATTLE_SALVAGE_REFUND_FACTOR, TICK_DT};
use crate::domain::{Side, Vec2};
use crate::error::HarnessError;
use crate::rng::Rng;
use crate::templates::TemplateCatalog;

#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScenarioSpec {
    pub with_base: bool,
    pub initial_units_per_side: u32,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattlefieldSpec {
    pub w: f32,
    pub h: f32,
    #[serde(default)]
    pub ground_height: Option<f32>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpawnMode {
    MirroredRandom,
    Ai,
}

impl Default for SpawnMode {
    fn default() -> Self {
        SpawnMode::MirroredRandom
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSpec {
    pub seed: u32,
    pub max_sim_seconds: f32,
    pub node_defense: f32,
    #[serde(default)]
    pub base_hp: Option<f32>,
    pub player_gas: f32,
    pub enemy_gas: f32,
    pub spawn_burst: u32,
    pub spawn_max_active: usize,
    pub ai_player: CompositeSpec,
    pub ai_enemy: CompositeSpec,
    #[serde(default)]
    pub scenario: Option<ScenarioSpec>,
    #[serde(default)]
    pub template_names: Option<Vec<String>>,
    #[serde(default)]
    pub battlefield: Option<BattlefieldSpec>,
    #[serde(default)]
    pub spawn_mode: SpawnMode,
    /// `familyId` of a spawn-decision module for the player side, used only
    /// when `spawnMode = "ai"`. Resolved via a tiny fixed dispatch table
    /// rather than the composite AI registry — spawn families are not
    /// schema-typed for genetics.
    #[serde(default)]
    pub spawn_player: Option<String>,
    #[serde(default)]
    pub spawn_enemy: Option<String>,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideResult {
    pub win: bool,
    pub tie: bool,
    pub gas_start: f32,
    pub gas_end: f32,
    pub on_field_gas_value_start: f32,
    pub on_field_gas_value_end: f32,
    pub gas_worth_delta: f32,
    pub score: f64,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct Sides {
    pub player: SideResult,
    pub enemy: SideResult,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub player_victory: bool,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub spec: MatchSpec,
    pub sim_seconds_elapsed: f32,
    pub outcome: MatchOutcome,
    pub sides: Sides,
}

/// `O` in `score = O × 1_000_000 + gasWorthDelta` (§4.9).
fn outcome_multiplier(win: bool, tie: bool) -> f64 {
    if win {
        2_000_000.0
    } else if tie {
        1_000_000.0
    } else {
        0.0
    }
}

fn on_field_gas_value(battle: &BattleState, side: Side) -> f32 {
    battle
        .units
        .iter()
        .filter(|u| u.side == side && u.is_alive())
        .map(|u| (u.deployment_gas_cost as f32 * BATTLE_SALVAGE_REFUND_FACTOR).floor())
        .sum()
}

/// Fixed symmetric starter preference: rifleman, then tank, deployed at a
/// lane-margin offset from each side's edge, mirrored across the field
/// (§4.7 step 4). Drawn from the catalog roster so a `templateNames`-
/// restricted match still gets starters when those ids are present.
const STARTER_PREFERENCE: [&str; 2] = ["rifleman", "tank"];

fn deploy_starters(battle: &mut BattleState, catalog: &TemplateCatalog, config: &SimConfig, count: u32) {
    let ground_y = config.ground_y();
    let mut picked: Vec<&str> = Vec::new();
    for id in STARTER_PREFERENCE {
        if catalog.get(id).is_some() {
            picked.push(id);
        }
        if picked.len() as u32 >= count {
            break;
        }
    }
    for (i, template_id) in picked.into_iter().enumerate() {
        let offset = config.lane_margin + i as f32 * 60.0;
        let player_pos = Vec2::new(offset, ground_y - 20.0);
        let enemy_pos = Vec2::new(config.battlefield_w - offset, ground_y - 20.0);
        battle.spawn(catalog, template_id, Side::Player, player_pos, true, true, None);
        battle.spawn(catalog, template_id, Side::Enemy, enemy_pos, true, true, None);
    }
}

/// Placeholder spawn-family dispatch for `spawnMode = "ai"` (§4.7 step 5):
/// always proposes the first roster entry at the shortest allowed interval.
/// A richer spawn-family registry is out of scope for this harness; the
/// hook exists so `MatchSpec::spawn_player`/`spawn_enemy` round-trip without
/// affecting mirrored-random matches, which are the only mode the training
/// orchestrator drives.
fn ai_spawn_decision(catalog: &TemplateCatalog, _family_id: &str) -> Option<(String, f32)> {
    catalog.roster().first().map(|id| (id.clone(), AI_SPAWN_INTERVAL_MIN))
}

fn mirrored_spawn_tick(battle: &mut BattleState, catalog: &TemplateCatalog, config: &SimConfig, rng: &mut Rng) {
    let roster = catalog.roster();
    if roster.is_empty() {
        return;
    }
    let pick = &roster[rng.index(roster.len())];
    let template = match catalog.get(pick) {
        Some(t) => t,
        None => return,
    };
    let cost = template.gas_cost;
    if battle.player_gas < cost as f32 || (!battle.enemy_infinite_gas && battle.enemy_gas < cost as f32) {
        return;
    }
    let y = rng.range_f32(config.spawn_y_min, config.spawn_y_max);
    let player_pos = Vec2::new(config.lane_margin, y);
    let enemy_pos = Vec2::new(config.battlefield_w - config.lane_margin, y);
    battle.spawn(catalog, pick, Side::Player, player_pos, false, true, None);
    battle.spawn(catalog, pick, Side::Enemy, enemy_pos, false, true, None);
}

/// Run one match end to end (§4.7). Deterministic: identical `MatchSpec`
/// values always produce byte-identical `MatchResult`s, regardless of
/// worker count or submission order (§4.1 contract).
pub fn run_match(spec: MatchSpec) -> Result<MatchResult, HarnessError> {
    spec.ai_player.validate()?;
    spec.ai_enemy.validate()?;

    let mut rng = Rng::new(spec.seed);
    let mut spawn_rng = Rng::spawn_stream(spec.seed);

    let mut catalog = TemplateCatalog::defaults();
    if let Some(names) = &spec.template_names {
        catalog.restrict_to(names);
    }

    let mut config = SimConfig::default();
    if let Some(bf) = spec.battlefield {
        config.battlefield_w = bf.w;
        config.battlefield_h = bf.h;
        if let Some(gh) = bf.ground_height {
            config.ground_height_ratio = gh / bf.h;
        }
    }

    let base_hp = spec.base_hp.unwrap_or(1000.0);
    let mut battle = BattleState::new(
        config,
        spec.max_sim_seconds,
        spec.node_defense,
        spec.player_gas,
        spec.enemy_gas,
        spec.ai_player.clone(),
        spec.ai_enemy.clone(),
        base_hp,
    );
    battle.auto_enemy_spawns = false;
    battle.enemy_min_active = 0;

    let initial_units = spec.scenario.map(|s| s.initial_units_per_side).unwrap_or(0);
    if initial_units > 0 {
        deploy_starters(&mut battle, &catalog, &config, initial_units);
    }

    let gas_start_player = battle.player_gas;
    let gas_start_enemy = battle.enemy_gas;
    let on_field_start_player = on_field_gas_value(&battle, Side::Player);
    let on_field_start_enemy = on_field_gas_value(&battle, Side::Enemy);

    let mut spawn_interval = 1.0f32;
    let mut spawn_timer = 0.0f32;

    while battle.outcome.is_none() && battle.elapsed < spec.max_sim_seconds {
        spawn_timer -= TICK_DT;
        if spawn_timer <= 0.0 {
            match spec.spawn_mode {
                SpawnMode::MirroredRandom => {
                    mirrored_spawn_tick(&mut battle, &catalog, &config, &mut spawn_rng);
                    spawn_timer = spawn_interval;
                }
                SpawnMode::Ai => {
                    let player_choice =
                        spec.spawn_player.as_deref().and_then(|fam| ai_spawn_decision(&catalog, fam));
                    let enemy_choice =
                        spec.spawn_enemy.as_deref().and_then(|fam| ai_spawn_decision(&catalog, fam));
                    let y = spawn_rng.range_f32(config.spawn_y_min, config.spawn_y_max);
                    let mut min_interval = spawn_interval;
                    if let Some((template_id, interval)) = &player_choice {
                        let pos = Vec2::new(config.lane_margin, y);
                        battle.spawn(&catalog, template_id, Side::Player, pos, false, true, Some(spec.spawn_max_active));
                        min_interval = min_interval.min(*interval);
                    }
                    if let Some((template_id, interval)) = &enemy_choice {
                        let pos = Vec2::new(config.battlefield_w - config.lane_margin, y);
                        battle.spawn(&catalog, template_id, Side::Enemy, pos, false, true, Some(spec.spawn_max_active));
                        min_interval = min_interval.min(*interval);
                    }
                    spawn_interval = min_interval.clamp(AI_SPAWN_INTERVAL_MIN, AI_SPAWN_INTERVAL_MAX);
                    spawn_timer = spawn_interval;
                }
            }
        }
        battle.step(&catalog, &mut rng);
    }

    let outcome = battle.outcome.clone().unwrap_or(Outcome {
        player_victory: battle.enemy_base.hp <= battle.player_base.hp,
        reason: "Arena deadline reached".to_string(),
    });

    let is_tie = outcome.reason.to_lowercase().contains("deadline");

    let on_field_end_player = on_field_gas_value(&battle, Side::Player);
    let on_field_end_enemy = on_field_gas_value(&battle, Side::Enemy);

    let player_win = !is_tie && outcome.player_victory;
    let enemy_win = !is_tie && !outcome.player_victory;

    let player_gas_delta = (battle.player_gas + on_field_end_player) - (gas_start_player + on_field_start_player);
    let enemy_gas_delta = (battle.enemy_gas + on_field_end_enemy) - (gas_start_enemy + on_field_start_enemy);

    let player_side = SideResult {
        win: player_win,
        tie: is_tie,
        gas_start: gas_start_player,
        gas_end: battle.player_gas,
        on_field_gas_value_start: on_field_start_player,
        on_field_gas_value_end: on_field_end_player,
        gas_worth_delta: player_gas_delta,
        score: outcome_multiplier(player_win, is_tie) + player_gas_delta as f64,
    };
    let enemy_side = SideResult {
        win: enemy_win,
        tie: is_tie,
        gas_start: gas_start_enemy,
        gas_end: battle.enemy_gas,
        on_field_gas_value_start: on_field_start_enemy,
        on_field_gas_value_end: on_field_end_enemy,
        gas_worth_delta: enemy_gas_delta,
        score: outcome_multiplier(enemy_win, is_tie) + enemy_gas_delta as f64,
    };

    debug!(seed = spec.seed, elapsed = %battle.elapsed, reason = %outcome.reason, "match finished");

    let result = MatchResult {
        spec,
        sim_seconds_elapsed: battle.elapsed,
        outcome: MatchOutcome { player_victory: outcome.player_victory, reason: outcome.reason },
        sides: Sides { player: player_side, enemy: enemy_side },
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline_spec(seed: u32) -> MatchSpec {
        MatchSpec {
            seed,
            max_sim_seconds: 6.0,
            node_defense: 1.0,
            base_hp: Some(300.0),
            player_gas: 500.0,
            enemy_gas: 500.0,
            spawn_burst: 1,
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
    fn same_seed_produces_identical_results() {
        let a = run_match(baseline_spec(42)).unwrap();
        let b = run_match(baseline_spec(42)).unwrap();
        assert_eq!(a.sim_seconds_elapsed, b.sim_seconds_elapsed);
        assert_eq!(a.outcome.reason, b.outcome.reason);
        assert_eq!(a.sides.player.score, b.sides.player.score);
        assert_eq!(a.sides.enemy.score, b.sides.enemy.score);
    }

    #[test]
    fn deadline_outcome_always_ties_both_sides() {
        let mut spec = baseline_spec(7);
        spec.max_sim_seconds = 0.5;
        let result = run_match(spec).unwrap();
        if result.outcome.reason.to_lowercase().contains("deadline") {
            assert!(result.sides.player.tie);
            assert!(result.sides.enemy.tie);
            assert!(!result.sides.player.win);
            assert!(!result.sides.enemy.win);
        }
    }

    #[test]
    fn win_and_tie_are_never_both_set_on_one_side() {
        let result = run_match(baseline_spec(99)).unwrap();
        assert!(!(result.sides.player.win && result.sides.player.tie));
        assert!(!(result.sides.enemy.win && result.sides.enemy.tie));
        if result.sides.player.tie || result.sides.enemy.tie {
            assert!(result.sides.player.tie && result.sides.enemy.tie);
        } else {
            assert_ne!(result.sides.player.win, result.sides.enemy.win);
        }
    }

    #[test]
    fn unknown_family_id_is_rejected_before_simulating() {
        let mut spec = baseline_spec(1);
        spec.ai_player.target.family_id = "nope-target".to_string();
        assert!(run_match(spec).is_err());
    }
}
