//! Leaderboard Store (C12): a single JSON ratings snapshot plus the
//! per-run `best-composite.json` artifacts it indexes (§4.12), and the
//! shared on-disk path layout (`RunPaths`, §3.1) the training orchestrator
//! also builds its artifact paths from.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ai::{parse_composite_spec, CompositeSpec};
use crate::error::HarnessError;

/// Resolves every on-disk path under `<dataRoot>` so the training run
/// layout (§6) is defined in exactly one place.
#[derive(Clone, Debug)]
pub struct RunPaths {
    data_root: PathBuf,
}

impl RunPaths {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        RunPaths { data_root: data_root.into() }
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.data_root.join("runs").join(run_id)
    }

    pub fn phase_dir(&self, run_id: &str, module: &str, phase: &str) -> PathBuf {
        self.run_dir(run_id).join(module).join(phase)
    }

    pub fn gen_file(&self, run_id: &str, module: &str, phase: &str, generation: u32) -> PathBuf {
        self.phase_dir(run_id, module, phase).join(format!("gen-{generation}.json"))
    }

    pub fn best_module_file(&self, run_id: &str, module: &str, phase: &str) -> PathBuf {
        self.phase_dir(run_id, module, phase).join("best-module.json")
    }

    pub fn best_composite_file(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("best-composite.json")
    }

    pub fn leaderboard_file(&self) -> PathBuf {
        self.data_root.join("leaderboard").join("composite-elo.json")
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct RatingsSnapshot {
    ratings: BTreeMap<String, RatingEntry>,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
struct RatingEntry {
    score: f64,
}

#[derive(Clone, Debug)]
pub struct LeaderboardEntry {
    pub run_id: String,
    pub score: f64,
    pub composite: CompositeSpec,
}

const BASELINE_ANCHOR_RUN_ID: &str = "baseline-composite";
const BASELINE_ANCHOR_SCORE: f64 = 100.0;

/// Load every rated run whose `best-composite.json` parses cleanly,
/// always appending the synthetic baseline anchor (§4.12). Malformed or
/// missing entries are dropped silently — they only shrink the opponent
/// pool, never fail the caller.
pub fn load(data_root: impl AsRef<Path>) -> Vec<LeaderboardEntry> {
    let paths = RunPaths::new(data_root.as_ref().to_path_buf());
    let mut entries = Vec::new();

    for (run_id, rating) in read_ratings(&paths.leaderboard_file()) {
        let composite_path = paths.best_composite_file(&run_id);
        match read_composite(&composite_path) {
            Ok(composite) => entries.push(LeaderboardEntry { run_id, score: rating.score, composite }),
            Err(e) => warn!(path = %composite_path.display(), error = %e, "ignoring malformed leaderboard composite artifact"),
        }
    }

    entries.push(LeaderboardEntry {
        run_id: BASELINE_ANCHOR_RUN_ID.to_string(),
        score: BASELINE_ANCHOR_SCORE,
        composite: CompositeSpec::baseline(),
    });
    entries
}

fn read_ratings(path: &Path) -> BTreeMap<String, RatingEntry> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => return BTreeMap::new(),
    };
    match serde_json::from_str::<RatingsSnapshot>(&text) {
        Ok(snapshot) => snapshot.ratings,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring malformed leaderboard snapshot");
            BTreeMap::new()
        }
    }
}

fn read_composite(path: &Path) -> Result<CompositeSpec, HarnessError> {
    let text = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    parse_composite_spec(value)
}

/// Record or update `runId`'s score in the ratings snapshot (§5 "writes are
/// serialized by the orchestrator at phase end").
pub fn save_rating(data_root: impl AsRef<Path>, run_id: &str, score: f64) -> Result<(), HarnessError> {
    let paths = RunPaths::new(data_root.as_ref().to_path_buf());
    let path = paths.leaderboard_file();
    let mut ratings = read_ratings(&path);
    ratings.insert(run_id.to_string(), RatingEntry { score });
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(&path)?;
    serde_json::to_writer_pretty(file, &RatingsSnapshot { ratings })?;
    Ok(())
}
