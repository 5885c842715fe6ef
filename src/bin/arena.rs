//! `arena`: the CLI front-end over `arena_core` (§4.13).
//!
//! Two subcommands: `match` runs a single `MatchSpec` (inline flags or a
//! JSON file) through the worker pool and prints the resulting
//! `MatchResult`; `train` builds a `TrainingOptions` from flags and runs
//! the phased orchestrator. This binary is the only place in the crate
//! that reads the wall clock (`chrono::Utc::now()`, for the training
//! run's timestamp) or installs a `tracing-subscriber` layer.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use arena_core::ai::CompositeSpec;
use arena_core::match_runner::{MatchSpec, ScenarioSpec, SpawnMode};
use arena_core::training::{ModuleSource, Scope, TrainingOptions};
use arena_core::worker_pool::run_batch;

#[derive(Parser)]
#[command(name = "arena", about = "Deterministic 2D combat simulator training/evaluation harness")]
struct Cli {
    /// Increase log verbosity; repeat for more (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one match and print its `MatchResult` as JSON.
    Match {
        /// Read the full `MatchSpec` from this JSON file instead of flags.
        #[arg(long)]
        spec: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        seed: u32,
        #[arg(long, default_value_t = 60.0)]
        max_sim_seconds: f32,
        #[arg(long, default_value_t = 400.0)]
        player_gas: f32,
        #[arg(long, default_value_t = 400.0)]
        enemy_gas: f32,
        /// Write the result JSON here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run the phased training orchestrator and print the winning composite.
    Train {
        #[arg(long, value_enum, default_value = "all")]
        scope: ScopeArg,
        #[arg(long, default_value_t = 20)]
        generations: u32,
        #[arg(long, default_value_t = 12)]
        population: usize,
        #[arg(long, default_value_t = 4)]
        phase_seeds: u32,
        #[arg(long, default_value_t = 1)]
        seed0: u32,
        #[arg(long, default_value = "./data")]
        data_root: PathBuf,
        /// Enable the leaderboard-vs-Elo-opponents final phase.
        #[arg(long, default_value_t = false)]
        elo: bool,
        #[arg(long, default_value_t = 4)]
        elo_opponents: usize,
        #[arg(long)]
        workers: Option<usize>,
    },
}

#[derive(Copy, Clone, clap::ValueEnum)]
enum ScopeArg {
    Target,
    Movement,
    Shoot,
    All,
}

impl From<ScopeArg> for Scope {
    fn from(s: ScopeArg) -> Scope {
        match s {
            ScopeArg::Target => Scope::Target,
            ScopeArg::Movement => Scope::Movement,
            ScopeArg::Shoot => Scope::Shoot,
            ScopeArg::All => Scope::All,
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "arena_core=info,arena=info",
        1 => "arena_core=debug,arena=debug",
        _ => "arena_core=trace,arena=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn default_match_spec(seed: u32, max_sim_seconds: f32, player_gas: f32, enemy_gas: f32) -> MatchSpec {
    MatchSpec {
        seed,
        max_sim_seconds,
        node_defense: 1.0,
        base_hp: Some(500.0),
        player_gas,
        enemy_gas,
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

fn run() -> Result<(), arena_core::HarnessError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Match { spec, seed, max_sim_seconds, player_gas, enemy_gas, out } => {
            let match_spec = match spec {
                Some(path) => {
                    let text = std::fs::read_to_string(path)?;
                    serde_json::from_str(&text)?
                }
                None => default_match_spec(seed, max_sim_seconds, player_gas, enemy_gas),
            };
            let mut results = run_batch(vec![match_spec]);
            let result = results.remove(0)?;
            match out {
                Some(path) => {
                    let file = std::fs::File::create(path)?;
                    serde_json::to_writer_pretty(file, &result)?;
                }
                None => {
                    let text = serde_json::to_string_pretty(&result)?;
                    println!("{text}");
                }
            }
            Ok(())
        }
        Command::Train { scope, generations, population, phase_seeds, seed0, data_root, elo, elo_opponents, workers } => {
            let options = TrainingOptions {
                scope: scope.into(),
                generations,
                population,
                phase_seeds,
                target_source: ModuleSource::Baseline,
                movement_source: ModuleSource::Baseline,
                shoot_source: ModuleSource::Baseline,
                seed0,
                data_root,
                elo,
                elo_opponents,
                workers: workers.unwrap_or_else(num_cpus::get),
            };
            let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
            let best = arena_core::training::run(options, &timestamp)?;
            println!("{}", serde_json::to_string_pretty(&best)?);
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("arena: {e}");
            ExitCode::FAILURE
        }
    }
}
