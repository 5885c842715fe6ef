//! Composite AI (C5): target / movement / shoot modules dispatched in
//! sequence by a composite controller.
//!
//! A module is identified by a `familyId` string. Two families exist per
//! module kind: `baseline-<kind>` (no params, a fixed heuristic) and
//! `dt-<kind>` (a decision-tree family whose schema carries an integer
//! `strategy` plus weighted factors, §GLOSSARY). Unsupported family ids are
//! a fatal config error at job construction (§4.5 failure semantics) — never
//! a panic inside the hot loop.

pub mod movement;
pub mod shoot;
pub mod target;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Vec2;
use crate::error::HarnessError;
use crate::genetics::{ParamSchema, Params};
use crate::projectile::Projectile;
use crate::rng::Rng;
use crate::unit::{AiState, UnitInstance};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleSpec {
    #[serde(rename = "familyId")]
    pub family_id: String,
    pub params: Params,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompositeSpec {
    pub target: ModuleSpec,
    pub movement: ModuleSpec,
    pub shoot: ModuleSpec,
}

impl CompositeSpec {
    pub fn baseline() -> CompositeSpec {
        CompositeSpec {
            target: ModuleSpec { family_id: "baseline-target".to_string(), params: Params::new() },
            movement: ModuleSpec { family_id: "baseline-movement".to_string(), params: Params::new() },
            shoot: ModuleSpec { family_id: "baseline-shoot".to_string(), params: Params::new() },
        }
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        target::schema_for(&self.target.family_id)?;
        movement::schema_for(&self.movement.family_id)?;
        shoot::schema_for(&self.shoot.family_id)?;
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct FirePlan {
    pub slot_index: usize,
    pub aim: Vec2,
    pub intended_target_id: u64,
    pub intended_target_y: f32,
    pub angle_rad: f32,
    pub lead_time_s: f32,
    pub effective_range: f32,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct MovementIntent {
    pub ax: f32,
    pub ay: f32,
    pub should_evade: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CombatDecision {
    pub facing: i8,
    pub state: AiState,
    pub movement: MovementIntent,
    pub fire_plan: Option<FirePlan>,
    pub fire_blocked_reason: Option<String>,
    pub debug: String,
}

pub struct DecisionInput<'a> {
    pub unit: &'a UnitInstance,
    pub enemies: &'a [UnitInstance],
    pub incoming_projectiles: &'a [Projectile],
    pub dt: f32,
    pub desired_range: f32,
    pub base_target: Vec2,
}

/// Look up the declared schema for any registered family id; the single
/// source of truth both `CompositeSpec::validate` and the genetics layer
/// (random/mutate/default params for training) consult.
pub fn schema_for_family(family_id: &str) -> Result<ParamSchema, HarnessError> {
    if let Ok(s) = target::schema_for(family_id) {
        return Ok(s);
    }
    if let Ok(s) = movement::schema_for(family_id) {
        return Ok(s);
    }
    if let Ok(s) = shoot::schema_for(family_id) {
        return Ok(s);
    }
    Err(HarnessError::Config(format!("unknown familyId '{family_id}'")))
}

/// Normalize either accepted composite artifact shape (§6) into a
/// `CompositeSpec`: `{familyId:"composite", composite:{...}}` or the legacy
/// bare `{target,movement,shoot}` object. The single place both the
/// training orchestrator and the leaderboard store parse artifacts from
/// disk (§9 "polymorphic JSON shapes → single parseCompositeSpec normalizer").
pub fn parse_composite_spec(value: Value) -> Result<CompositeSpec, HarnessError> {
    let inner = match value.as_object() {
        Some(obj) if obj.contains_key("familyId") && obj.contains_key("composite") => {
            obj.get("composite").cloned().unwrap_or(Value::Null)
        }
        _ => value,
    };
    serde_json::from_value(inner).map_err(|e| HarnessError::Config(format!("malformed composite artifact: {e}")))
}

/// Dispatch target → movement → shoot in order, concatenating their debug
/// tags into `decisionPath` (§8 property 7: exactly three ` > `-joined
/// tokens).
pub fn decide_composite(composite: &CompositeSpec, input: &DecisionInput, rng: &mut Rng) -> Result<CombatDecision, HarnessError> {
    let target_decision = target::decide(&composite.target, input, rng)?;
    let movement_decision = movement::decide(&composite.movement, input, &target_decision, rng)?;
    let shoot_decision = shoot::decide(&composite.shoot, input, &target_decision, rng)?;

    let state = if movement_decision.should_evade { AiState::Evade } else { AiState::Engage };

    Ok(CombatDecision {
        facing: target_decision.facing,
        state,
        movement: MovementIntent {
            ax: movement_decision.ax,
            ay: movement_decision.ay,
            should_evade: movement_decision.should_evade,
        },
        fire_plan: shoot_decision.plan,
        fire_blocked_reason: shoot_decision.blocked_reason,
        debug: format!("{} > {} > {}", target_decision.debug_tag, movement_decision.debug_tag, shoot_decision.debug_tag),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use crate::templates::TemplateCatalog;
    use crate::unit::instantiate;

    #[test]
    fn decision_path_has_three_tokens() {
        let cat = TemplateCatalog::defaults();
        let t = cat.get("rifleman").unwrap();
        let unit = instantiate(t, Side::Player, Vec2::new(0.0, 0.0), 1, false).unwrap();
        let enemy = instantiate(t, Side::Enemy, Vec2::new(200.0, 0.0), 2, false).unwrap();
        let enemies = vec![enemy];
        let input = DecisionInput {
            unit: &unit,
            enemies: &enemies,
            incoming_projectiles: &[],
            dt: 1.0 / 60.0,
            desired_range: 150.0,
            base_target: Vec2::new(1900.0, 500.0),
        };
        let composite = CompositeSpec::baseline();
        let mut rng = Rng::new(1);
        let decision = decide_composite(&composite, &input, &mut rng).unwrap();
        let tokens: Vec<&str> = decision.debug.split(" > ").collect();
        assert_eq!(tokens.len(), 3);
        assert!(decision.facing == 1 || decision.facing == -1);
    }

    #[test]
    fn unknown_family_is_config_error() {
        let mut composite = CompositeSpec::baseline();
        composite.target.family_id = "nope-target".to_string();
        assert!(composite.validate().is_err());
    }

    #[test]
    fn parse_composite_spec_accepts_both_artifact_shapes() {
        let wrapped = serde_json::json!({
            "familyId": "composite",
            "composite": {
                "target": {"familyId": "baseline-target", "params": {}},
                "movement": {"familyId": "baseline-movement", "params": {}},
                "shoot": {"familyId": "baseline-shoot", "params": {}},
            }
        });
        let bare = serde_json::json!({
            "target": {"familyId": "baseline-target", "params": {}},
            "movement": {"familyId": "baseline-movement", "params": {}},
            "shoot": {"familyId": "baseline-shoot", "params": {}},
        });
        assert!(parse_composite_spec(wrapped).is_ok());
        assert!(parse_composite_spec(bare).is_ok());
    }
}
