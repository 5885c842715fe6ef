//! Target module (C5): ranks enemy units, picks an `attackPoint`, derives
//! facing.

use crate::ai::DecisionInput;
use crate::domain::Vec2;
use crate::error::HarnessError;
use crate::genetics::{ParamKind, ParamSchema, Params};
use crate::unit::UnitInstance;

pub struct TargetDecision {
    pub facing: i8,
    pub attack_point: Vec2,
    pub target_id: Option<u64>,
    pub debug_tag: String,
}

pub fn schema_for(family_id: &str) -> Result<ParamSchema, HarnessError> {
    match family_id {
        "baseline-target" => Ok(ParamSchema::new()),
        "dt-target" => Ok(dt_schema()),
        _ => Err(HarnessError::Config(format!("unknown target familyId '{family_id}'"))),
    }
}

fn dt_schema() -> ParamSchema {
    let mut s = ParamSchema::new();
    s.insert("strategy".to_string(), ParamKind::Int { min: 0, max: 2, default: 0, step: 1, mutate_rate: 0.25 });
    s.insert("wHp".to_string(), ParamKind::Number { min: 0.0, max: 2.0, default: 0.5, sigma: 0.2 });
    s.insert("wWeaponCount".to_string(), ParamKind::Number { min: 0.0, max: 2.0, default: 0.4, sigma: 0.2 });
    s.insert("wPressure".to_string(), ParamKind::Number { min: 0.0, max: 200.0, default: 40.0, sigma: 10.0 });
    s
}

pub fn decide(
    spec: &crate::ai::ModuleSpec,
    input: &DecisionInput,
    _rng: &mut crate::rng::Rng,
) -> Result<TargetDecision, HarnessError> {
    let best = match spec.family_id.as_str() {
        "baseline-target" => best_by_baseline_score(input),
        "dt-target" => best_by_dt_score(input, &spec.params),
        other => return Err(HarnessError::Config(format!("unknown target familyId '{other}'"))),
    };

    let (attack_point, target_id) = match best {
        Some(u) => (u.pos, Some(u.id)),
        None => (input.base_target, None),
    };
    let facing = if attack_point.x >= input.unit.pos.x { 1 } else { -1 };

    Ok(TargetDecision {
        facing,
        attack_point,
        target_id,
        debug_tag: spec.family_id.clone(),
    })
}

fn baseline_score(unit: &UnitInstance, candidate: &UnitInstance) -> f32 {
    let d = candidate.pos.sub(unit.pos);
    let distance = d.length();
    let speed = candidate.vel.length();
    distance + d.y.abs() * 0.7 + (40.0 - speed).max(0.0) * 0.2
}

fn best_by_baseline_score<'a>(input: &'a DecisionInput) -> Option<&'a UnitInstance> {
    input
        .enemies
        .iter()
        .filter(|e| e.is_alive())
        .min_by(|a, b| baseline_score(input.unit, a).partial_cmp(&baseline_score(input.unit, b)).unwrap())
}

fn best_by_dt_score<'a>(input: &'a DecisionInput, params: &Params) -> Option<&'a UnitInstance> {
    let strategy = params.get("strategy").map(|v| v.as_i64()).unwrap_or(0);
    let w_hp = params.get("wHp").map(|v| v.as_f64() as f32).unwrap_or(0.5);
    let w_weapon = params.get("wWeaponCount").map(|v| v.as_f64() as f32).unwrap_or(0.4);
    let w_pressure = params.get("wPressure").map(|v| v.as_f64() as f32).unwrap_or(40.0);

    input
        .enemies
        .iter()
        .filter(|e| e.is_alive())
        .min_by(|a, b| dt_score(input, a, strategy, w_hp, w_weapon, w_pressure)
            .partial_cmp(&dt_score(input, b, strategy, w_hp, w_weapon, w_pressure))
            .unwrap())
}

fn dt_score(input: &DecisionInput, candidate: &UnitInstance, strategy: i64, w_hp: f32, w_weapon: f32, w_pressure: f32) -> f32 {
    let base = baseline_score(input.unit, candidate);
    let hp_ratio = structural_integrity(candidate);
    let weapon_count = candidate.weapon_slots.iter().filter(|s| candidate.attachments[s.attachment_id].alive).count() as f32;
    let dist_to_own_base = candidate.pos.sub(input.base_target).length();
    match strategy {
        // hunt-weak: emphasize low structural integrity only.
        1 => base + hp_ratio * w_hp * 4.0,
        // avoid-threats: heavily penalize well-armed targets.
        2 => base + weapon_count * w_weapon * 6.0,
        // balanced: blend all three weighted terms, including base pressure.
        _ => base + hp_ratio * w_hp + weapon_count * w_weapon - (w_pressure / (dist_to_own_base + 1.0)) * 10.0,
    }
}

fn structural_integrity(unit: &UnitInstance) -> f32 {
    let total: f32 = unit.cells.iter().map(|c| c.break_threshold).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let remaining: f32 = unit.cells.iter().filter(|c| !c.destroyed).map(|c| c.break_threshold - c.strain).sum();
    (remaining / total).max(0.0)
}

pub fn integrity(unit: &UnitInstance) -> f32 {
    structural_integrity(unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ModuleSpec;
    use crate::domain::Side;
    use crate::rng::Rng;
    use crate::templates::TemplateCatalog;
    use crate::unit::instantiate;

    #[test]
    fn facing_points_at_attack_point() {
        let cat = TemplateCatalog::defaults();
        let t = cat.get("rifleman").unwrap();
        let unit = instantiate(t, Side::Player, Vec2::new(100.0, 0.0), 1, false).unwrap();
        let enemy = instantiate(t, Side::Enemy, Vec2::new(0.0, 0.0), 2, false).unwrap();
        let enemies = vec![enemy];
        let input = DecisionInput {
            unit: &unit,
            enemies: &enemies,
            incoming_projectiles: &[],
            dt: 1.0 / 60.0,
            desired_range: 150.0,
            base_target: Vec2::new(1900.0, 500.0),
        };
        let spec = ModuleSpec { family_id: "baseline-target".to_string(), params: Params::new() };
        let mut rng = Rng::new(1);
        let decision = decide(&spec, &input, &mut rng).unwrap();
        assert_eq!(decision.facing, -1);
        assert_eq!(decision.target_id, Some(2));
    }

    #[test]
    fn falls_back_to_base_center_with_no_targets() {
        let cat = TemplateCatalog::defaults();
        let t = cat.get("rifleman").unwrap();
        let unit = instantiate(t, Side::Player, Vec2::new(100.0, 0.0), 1, false).unwrap();
        let enemies: Vec<UnitInstance> = Vec::new();
        let input = DecisionInput {
            unit: &unit,
            enemies: &enemies,
            incoming_projectiles: &[],
            dt: 1.0 / 60.0,
            desired_range: 150.0,
            base_target: Vec2::new(1900.0, 500.0),
        };
        let spec = ModuleSpec { family_id: "baseline-target".to_string(), params: Params::new() };
        let mut rng = Rng::new(1);
        let decision = decide(&spec, &input, &mut rng).unwrap();
        assert_eq!(decision.target_id, None);
        assert_eq!(decision.attack_point, Vec2::new(1900.0, 500.0));
    }
}
