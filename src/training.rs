//! Training Orchestrator (C11): phased coordinate descent over the three
//! composite modules, each phase evaluating a population of candidates
//! through the worker pool and advancing by elitism + mutate/crossover
//! (§4.11). Single-threaded/cooperative: it submits batches and awaits
//! them before touching population state (§5) — no module is updated
//! concurrently with another's evaluation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ai::{schema_for_family, CompositeSpec, ModuleSpec};
use crate::constants::TRAINING_SEED_STRIDE;
use crate::domain::Side;
use crate::error::HarnessError;
use crate::fitness::{aggregate, wilson_lower_bound, Aggregate};
use crate::genetics::{clamp_to_schema, crossover, mutate, random_params, Params};
use crate::leaderboard::{self, LeaderboardEntry, RunPaths};
use crate::match_runner::{MatchResult, MatchSpec, ScenarioSpec, SpawnMode};
use crate::rng::Rng;
use crate::worker_pool::run_batch_with_workers;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Target,
    Movement,
    Shoot,
    All,
}

impl Scope {
    fn order(self) -> Vec<ModuleKind> {
        match self {
            Scope::All => vec![ModuleKind::Shoot, ModuleKind::Movement, ModuleKind::Target],
            Scope::Target => vec![ModuleKind::Target],
            Scope::Movement => vec![ModuleKind::Movement],
            Scope::Shoot => vec![ModuleKind::Shoot],
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ModuleKind {
    Target,
    Movement,
    Shoot,
}

impl ModuleKind {
    fn key(self) -> &'static str {
        match self {
            ModuleKind::Target => "target",
            ModuleKind::Movement => "movement",
            ModuleKind::Shoot => "shoot",
        }
    }

    fn baseline_family(self) -> &'static str {
        match self {
            ModuleKind::Target => "baseline-target",
            ModuleKind::Movement => "baseline-movement",
            ModuleKind::Shoot => "baseline-shoot",
        }
    }

    fn dt_family(self) -> &'static str {
        match self {
            ModuleKind::Target => "dt-target",
            ModuleKind::Movement => "dt-movement",
            ModuleKind::Shoot => "dt-shoot",
        }
    }

    fn get(self, composite: &CompositeSpec) -> &ModuleSpec {
        match self {
            ModuleKind::Target => &composite.target,
            ModuleKind::Movement => &composite.movement,
            ModuleKind::Shoot => &composite.shoot,
        }
    }

    fn set(self, composite: &mut CompositeSpec, module: ModuleSpec) {
        match self {
            ModuleKind::Target => composite.target = module,
            ModuleKind::Movement => composite.movement = module,
            ModuleKind::Shoot => composite.shoot = module,
        }
    }
}

/// Where a module's starting population seeds from (§4.11 initialization).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModuleSource {
    Baseline,
    RandomDt,
    Artifact { path: PathBuf },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingOptions {
    pub scope: Scope,
    pub generations: u32,
    pub population: usize,
    pub phase_seeds: u32,
    pub target_source: ModuleSource,
    pub movement_source: ModuleSource,
    pub shoot_source: ModuleSource,
    pub seed0: u32,
    pub data_root: PathBuf,
    pub elo: bool,
    pub elo_opponents: usize,
    pub workers: usize,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        TrainingOptions {
            scope: Scope::All,
            generations: 20,
            population: 12,
            phase_seeds: 4,
            target_source: ModuleSource::Baseline,
            movement_source: ModuleSource::Baseline,
            shoot_source: ModuleSource::Baseline,
            seed0: 1,
            data_root: PathBuf::from("./data"),
            elo: false,
            elo_opponents: 4,
            workers: num_cpus::get(),
        }
    }
}

struct PhaseSpec {
    id: &'static str,
    scenario: ScenarioSpec,
    elo: bool,
}

fn phases_for(kind: ModuleKind, elo_enabled: bool) -> Vec<PhaseSpec> {
    let mut phases = Vec::new();
    if kind != ModuleKind::Target {
        phases.push(PhaseSpec {
            id: "p1-no-base-1v1",
            scenario: ScenarioSpec { with_base: false, initial_units_per_side: 1 },
            elo: false,
        });
    }
    phases.push(PhaseSpec {
        id: "p2-no-base-nvn",
        scenario: ScenarioSpec { with_base: false, initial_units_per_side: 3 },
        elo: false,
    });
    phases.push(PhaseSpec {
        id: "p3-battlefield-base",
        scenario: ScenarioSpec { with_base: true, initial_units_per_side: 2 },
        elo: false,
    });
    if elo_enabled {
        phases.push(PhaseSpec {
            id: "p4-leaderboard",
            scenario: ScenarioSpec { with_base: true, initial_units_per_side: 2 },
            elo: true,
        });
    }
    phases
}

fn build_initial_module(source: &ModuleSource, kind: ModuleKind, rng: &mut Rng) -> Result<ModuleSpec, HarnessError> {
    match source {
        ModuleSource::Baseline => Ok(ModuleSpec { family_id: kind.baseline_family().to_string(), params: Params::new() }),
        ModuleSource::RandomDt => {
            let schema = schema_for_family(kind.dt_family())?;
            let params = clamp_to_schema(&schema, &random_params(&schema, rng));
            Ok(ModuleSpec { family_id: kind.dt_family().to_string(), params })
        }
        ModuleSource::Artifact { path } => {
            let text = std::fs::read_to_string(path)?;
            let value: serde_json::Value = serde_json::from_str(&text)?;
            let composite = crate::ai::parse_composite_spec(value)?;
            Ok(kind.get(&composite).clone())
        }
    }
}

fn build_match_spec(seed: u32, scenario: &ScenarioSpec, player: CompositeSpec, enemy: CompositeSpec) -> MatchSpec {
    MatchSpec {
        seed,
        max_sim_seconds: 20.0,
        node_defense: 1.0,
        base_hp: scenario.with_base.then_some(500.0),
        player_gas: 400.0,
        enemy_gas: 400.0,
        spawn_burst: 1,
        spawn_max_active: 6,
        ai_player: player,
        ai_enemy: enemy,
        scenario: Some(*scenario),
        template_names: None,
        battlefield: None,
        spawn_mode: SpawnMode::MirroredRandom,
        spawn_player: None,
        spawn_enemy: None,
    }
}

fn collect_or_first_error(results: Vec<Result<MatchResult, HarnessError>>) -> Result<Vec<MatchResult>, HarnessError> {
    results.into_iter().collect()
}

/// `k = 14 + min(48, |ra − rb| × 0.2)` (§4.11 Elo update).
fn elo_k(ra: f64, rb: f64) -> f64 {
    14.0 + ((ra - rb).abs() * 0.2).min(48.0)
}

/// `ea = 1 / (1 + 10^((rb − ra)/80))`.
fn elo_expected(ra: f64, rb: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rb - ra) / 80.0))
}

fn apply_elo_step(ra: f64, rb: f64, outcome: f64) -> f64 {
    ra + elo_k(ra, rb) * (outcome - elo_expected(ra, rb))
}

fn normalize_family(id: &str) -> String {
    id.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '-' }).collect()
}

fn build_run_id(composite: &CompositeSpec, timestamp: &str) -> String {
    format!(
        "{}-{}-{}-{}",
        normalize_family(&composite.target.family_id),
        normalize_family(&composite.movement.family_id),
        normalize_family(&composite.shoot.family_id),
        timestamp
    )
}

#[derive(Serialize)]
struct GenerationArtifact<'a> {
    module: &'a str,
    phase: &'a str,
    generation: u32,
    best: &'a ModuleSpec,
}

fn persist_generation(
    paths: &RunPaths,
    run_id: &str,
    module: &str,
    phase: &str,
    generation: u32,
    best: &ModuleSpec,
) -> Result<(), HarnessError> {
    let path = paths.gen_file(run_id, module, phase, generation);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let artifact = GenerationArtifact { module, phase, generation, best };
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, &artifact)?;
    Ok(())
}

fn persist_best_module(paths: &RunPaths, run_id: &str, module: &str, phase: &str, best: &ModuleSpec) -> Result<(), HarnessError> {
    let path = paths.best_module_file(run_id, module, phase);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, best)?;
    Ok(())
}

fn persist_best_composite(paths: &RunPaths, run_id: &str, best: &CompositeSpec) -> Result<(), HarnessError> {
    let path = paths.best_composite_file(run_id);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, &serde_json::json!({"familyId": "composite", "composite": best}))?;
    Ok(())
}

struct Evaluated {
    params: Params,
    aggregate: Aggregate,
    wilson_lb: f64,
    elo_score: Option<f64>,
}

/// Run the full phased coordinate descent and return the frozen
/// `CompositeSpec` (§4.11). `timestamp` feeds the `runId` (§6); callers
/// pass a caller-chosen ISO-8601 string so the orchestrator itself never
/// reaches for a wall clock.
pub fn run(options: TrainingOptions, timestamp: &str) -> Result<CompositeSpec, HarnessError> {
    let mut rng = Rng::from_seed64((options.seed0 as u64) ^ 0x5EED_u64);
    let mut best = CompositeSpec::baseline();
    best.target = build_initial_module(&options.target_source, ModuleKind::Target, &mut rng)?;
    best.movement = build_initial_module(&options.movement_source, ModuleKind::Movement, &mut rng)?;
    best.shoot = build_initial_module(&options.shoot_source, ModuleKind::Shoot, &mut rng)?;
    best.validate()?;

    let paths = RunPaths::new(options.data_root.clone());
    let run_id = build_run_id(&best, timestamp);
    let mut final_elo_score: Option<f64> = None;

    for kind in options.scope.order() {
        let schema = schema_for_family(&kind.get(&best).family_id)?;

        for phase in phases_for(kind, options.elo) {
            let seeds: Vec<u32> =
                (0..options.phase_seeds).map(|i| options.seed0.wrapping_add(i.wrapping_mul(TRAINING_SEED_STRIDE))).collect();

            let mut population: Vec<Params> = Vec::with_capacity(options.population);
            population.push(kind.get(&best).params.clone());
            for _ in 1..options.population {
                population.push(clamp_to_schema(&schema, &random_params(&schema, &mut rng)));
            }

            let opponents: Vec<LeaderboardEntry> = if phase.elo { leaderboard::load(&options.data_root) } else { Vec::new() };

            let mut phase_best_params = kind.get(&best).params.clone();
            let mut phase_best_wl = -1.0f64;
            let mut phase_best_score = f64::NEG_INFINITY;
            let mut phase_best_elo = if phase.elo { Some(100.0f64) } else { None };

            for generation in 0..options.generations {
                let mut evaluated: Vec<Evaluated> = Vec::with_capacity(population.len());

                for params in &population {
                    let candidate_module = ModuleSpec { family_id: kind.get(&best).family_id.clone(), params: params.clone() };
                    let mut candidate_composite = best.clone();
                    kind.set(&mut candidate_composite, candidate_module);

                    if !phase.elo {
                        let mut specs = Vec::with_capacity(seeds.len() * 2);
                        let mut candidate_sides = Vec::with_capacity(seeds.len() * 2);
                        for &seed in &seeds {
                            specs.push(build_match_spec(seed, &phase.scenario, candidate_composite.clone(), best.clone()));
                            candidate_sides.push(Side::Player);
                            specs.push(build_match_spec(seed, &phase.scenario, best.clone(), candidate_composite.clone()));
                            candidate_sides.push(Side::Enemy);
                        }
                        let results = collect_or_first_error(run_batch_with_workers(specs, options.workers)?)?;
                        let agg = aggregate(&results, |_, i| candidate_sides[i]);
                        let wl = wilson_lower_bound(agg.wins, agg.games);
                        evaluated.push(Evaluated { params: params.clone(), aggregate: agg, wilson_lb: wl, elo_score: None });
                    } else {
                        let reference = phase_best_elo.unwrap_or(100.0);
                        let mut by_distance = opponents.clone();
                        by_distance.sort_by(|a, b| (a.score - reference).abs().partial_cmp(&(b.score - reference).abs()).unwrap());
                        let chosen: Vec<LeaderboardEntry> = by_distance.into_iter().take(options.elo_opponents).collect();

                        let mut specs = Vec::new();
                        let mut candidate_sides = Vec::new();
                        let mut opponent_scores = Vec::new();
                        for opponent in &chosen {
                            for &seed in &seeds {
                                specs.push(build_match_spec(seed, &phase.scenario, candidate_composite.clone(), opponent.composite.clone()));
                                candidate_sides.push(Side::Player);
                                opponent_scores.push(opponent.score);
                                specs.push(build_match_spec(seed, &phase.scenario, opponent.composite.clone(), candidate_composite.clone()));
                                candidate_sides.push(Side::Enemy);
                                opponent_scores.push(opponent.score);
                            }
                        }
                        let results = collect_or_first_error(run_batch_with_workers(specs, options.workers)?)?;
                        let agg = aggregate(&results, |_, i| candidate_sides[i]);
                        let wl = wilson_lower_bound(agg.wins, agg.games);

                        let mut elo_score = reference;
                        for (i, result) in results.iter().enumerate() {
                            let side = match candidate_sides[i] {
                                Side::Player => &result.sides.player,
                                Side::Enemy => &result.sides.enemy,
                            };
                            let outcome = if side.win {
                                1.0
                            } else if side.tie {
                                0.5
                            } else {
                                0.0
                            };
                            elo_score = apply_elo_step(elo_score, opponent_scores[i], outcome);
                        }
                        evaluated.push(Evaluated { params: params.clone(), aggregate: agg, wilson_lb: wl, elo_score: Some(elo_score) });
                    }
                }

                if phase.elo {
                    evaluated.sort_by(|a, b| {
                        b.elo_score
                            .unwrap_or(0.0)
                            .partial_cmp(&a.elo_score.unwrap_or(0.0))
                            .unwrap()
                            .then(b.wilson_lb.partial_cmp(&a.wilson_lb).unwrap())
                            .then(b.aggregate.score.partial_cmp(&a.aggregate.score).unwrap())
                    });
                } else {
                    evaluated.sort_by(|a, b| {
                        b.wilson_lb.partial_cmp(&a.wilson_lb).unwrap().then(b.aggregate.score.partial_cmp(&a.aggregate.score).unwrap())
                    });
                }

                let top = &evaluated[0];
                let improved = if phase.elo {
                    top.elo_score.unwrap_or(f64::MIN) > phase_best_elo.unwrap_or(f64::MIN)
                } else {
                    (top.wilson_lb, top.aggregate.score) > (phase_best_wl, phase_best_score)
                };
                if improved {
                    phase_best_params = top.params.clone();
                    phase_best_wl = top.wilson_lb;
                    phase_best_score = top.aggregate.score;
                    if phase.elo {
                        phase_best_elo = top.elo_score;
                    }
                }

                info!(
                    module = kind.key(),
                    phase = phase.id,
                    gen = generation,
                    best_lb = phase_best_wl,
                    best_score = phase_best_score,
                    best_elo = ?phase_best_elo,
                    "generation complete"
                );

                let frozen_best = ModuleSpec { family_id: kind.get(&best).family_id.clone(), params: phase_best_params.clone() };
                persist_generation(&paths, &run_id, kind.key(), phase.id, generation, &frozen_best)?;

                let elite_count = ((options.population as f64 * 0.2).floor() as usize).max(2).min(options.population.max(1));
                let mut next_population = Vec::with_capacity(options.population);
                next_population.push(phase_best_params.clone());
                while next_population.len() < options.population {
                    let a = &evaluated[rng.index(elite_count)].params;
                    let b = &evaluated[rng.index(elite_count)].params;
                    let child = clamp_to_schema(&schema, &crossover(a, b, &mut rng));
                    let mutated = clamp_to_schema(&schema, &mutate(&schema, &child, &mut rng));
                    next_population.push(mutated);
                }
                population = next_population;
            }

            kind.set(&mut best, ModuleSpec { family_id: kind.get(&best).family_id.clone(), params: phase_best_params });
            persist_best_module(&paths, &run_id, kind.key(), phase.id, kind.get(&best))?;

            if phase.elo {
                final_elo_score = phase_best_elo;
            }
        }
    }

    persist_best_composite(&paths, &run_id, &best)?;
    if let Some(score) = final_elo_score {
        leaderboard::save_rating(&options.data_root, &run_id, score)?;
    }
    Ok(best)
}
