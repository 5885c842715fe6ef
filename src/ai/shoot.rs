//! Shoot module (C5): per-slot ballistic-lead solve, weapon scoring, and the
//! priority-ordered block reasons (`axis-mismatch` > `out-of-range` >
//! `angle-locked`) surfaced as `CombatDecision::fire_blocked_reason`.

use crate::ai::target::TargetDecision;
use crate::ai::{DecisionInput, FirePlan};
use crate::constants::GROUND_FIRE_Y_TOLERANCE;
use crate::domain::Vec2;
use crate::error::HarnessError;
use crate::genetics::{ParamKind, ParamSchema, Params};
use crate::rng::Rng;
use crate::templates::UnitKind;
use crate::unit::UnitInstance;

pub struct ShootDecision {
    pub plan: Option<FirePlan>,
    pub blocked_reason: Option<String>,
    pub debug_tag: String,
}

const LEAD_MIN_T: f32 = 0.08;
const LEAD_MAX_T: f32 = 2.0;
const LEAD_RANGE_FACTOR: f32 = 1.12;
const LEAD_ITERATIONS: u32 = 26;

pub fn schema_for(family_id: &str) -> Result<ParamSchema, HarnessError> {
    match family_id {
        "baseline-shoot" => Ok(ParamSchema::new()),
        "dt-shoot" => Ok(dt_schema()),
        _ => Err(HarnessError::Config(format!("unknown shoot familyId '{family_id}'"))),
    }
}

fn dt_schema() -> ParamSchema {
    let mut s = ParamSchema::new();
    s.insert("leadBias".to_string(), ParamKind::Number { min: 0.0, max: 2.0, default: 1.0, sigma: 0.2 });
    s.insert("rangeBias".to_string(), ParamKind::Number { min: 0.0, max: 2.0, default: 1.0, sigma: 0.2 });
    s.insert("angleToleranceDeg".to_string(), ParamKind::Number { min: 0.0, max: 45.0, default: 0.0, sigma: 5.0 });
    s
}

pub fn decide(
    spec: &crate::ai::ModuleSpec,
    input: &DecisionInput,
    target: &TargetDecision,
    _rng: &mut Rng,
) -> Result<ShootDecision, HarnessError> {
    let (lead_bias, range_bias, angle_tolerance_deg) = match spec.family_id.as_str() {
        "baseline-shoot" => (1.0, 1.0, 0.0),
        "dt-shoot" => dt_biases(&spec.params),
        other => return Err(HarnessError::Config(format!("unknown shoot familyId '{other}'"))),
    };

    let Some(target_unit) = find_target(input, target) else {
        return Ok(ShootDecision { plan: None, blocked_reason: Some("no-target".to_string()), debug_tag: spec.family_id.clone() });
    };

    let unit = input.unit;
    let mut best: Option<(f32, FirePlan)> = None;
    let mut first_block: Option<(u8, String)> = None;

    for (slot_index, slot) in unit.weapon_slots.iter().enumerate() {
        let attachment = &unit.attachments[slot.attachment_id];
        if !attachment.alive || slot.charges == 0 || slot.cooldown > 0.0 {
            continue;
        }
        let stats = attachment.stats;
        let eff_range = unit.effective_weapon_range(slot.attachment_id) * range_bias;
        let dist = target_unit.pos.sub(unit.pos).length();

        let is_homing = stats.homing_turn_rate_deg_per_sec > 0.0;
        let is_air_target = matches!(target_unit.unit_type, UnitKind::Air);
        let axis_mismatch = unit.unit_type == UnitKind::Ground
            && !is_homing
            && is_air_target
            && (target_unit.pos.y - unit.pos.y).abs() > GROUND_FIRE_Y_TOLERANCE;
        if axis_mismatch {
            record_block(&mut first_block, 0, "axis-mismatch");
            continue;
        }

        if dist > eff_range * 1.05 {
            record_block(&mut first_block, 1, "out-of-range");
            continue;
        }

        let (lead_time_raw, solved) =
            solve_lead_time(unit.pos, target_unit.pos, target_unit.vel, stats.muzzle_speed.max(1.0), stats.gravity, eff_range);
        let lead_time = lead_time_raw * lead_bias.max(0.1);
        let predicted = target_unit.pos.add(target_unit.vel.scale(lead_time));
        let drop = Vec2::new(0.0, 0.5 * stats.gravity * lead_time * lead_time);
        let aim = predicted.sub(drop);
        let disp = aim.sub(unit.pos);

        let facing_dir = Vec2::new(unit.facing as f32, 0.0);
        let aim_dir = disp.normalize();
        let angle_between = facing_dir.dot(aim_dir).clamp(-1.0, 1.0).acos();
        let tolerance = (stats.shoot_angle_deg * 0.5 + angle_tolerance_deg).to_radians();
        if angle_between > tolerance {
            record_block(&mut first_block, 2, "angle-locked");
            continue;
        }

        let lead_bonus = if solved { 1.15 } else { 0.62 };
        let range_fit = 1.0 - (dist - eff_range * 0.72).abs() / eff_range.max(1.0);
        let score = stats.damage * 1.2 + range_fit * 25.0 + lead_bonus * 18.0;

        let plan = FirePlan {
            slot_index,
            aim,
            intended_target_id: target_unit.id,
            intended_target_y: target_unit.pos.y,
            angle_rad: disp.y.atan2(disp.x),
            lead_time_s: lead_time,
            effective_range: eff_range,
        };
        if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
            best = Some((score, plan));
        }
    }

    match best {
        Some((_, plan)) => Ok(ShootDecision { plan: Some(plan), blocked_reason: None, debug_tag: spec.family_id.clone() }),
        None => Ok(ShootDecision {
            plan: None,
            blocked_reason: Some(first_block.map(|(_, reason)| reason).unwrap_or_else(|| "no-weapon".to_string())),
            debug_tag: spec.family_id.clone(),
        }),
    }
}

fn record_block(slot: &mut Option<(u8, String)>, priority: u8, reason: &str) {
    if slot.as_ref().map_or(true, |(p, _)| priority < *p) {
        *slot = Some((priority, reason.to_string()));
    }
}

fn dt_biases(params: &Params) -> (f32, f32, f32) {
    let lead_bias = params.get("leadBias").map(|v| v.as_f64() as f32).unwrap_or(1.0);
    let range_bias = params.get("rangeBias").map(|v| v.as_f64() as f32).unwrap_or(1.0);
    let angle_tolerance_deg = params.get("angleToleranceDeg").map(|v| v.as_f64() as f32).unwrap_or(0.0);
    (lead_bias, range_bias, angle_tolerance_deg)
}

fn find_target<'a>(input: &'a DecisionInput, target: &TargetDecision) -> Option<&'a UnitInstance> {
    target.target_id.and_then(|id| input.enemies.iter().find(|e| e.id == id && e.is_alive()))
}

/// Bisect `f(t) = |predicted(t) − shooter − drop(t)|² / t² − muzzleSpeed²`
/// over `t ∈ [0.08, min(2.0, 1.12·range/muzzleSpeed)]` for up to 26
/// iterations (§4.5). Falls back to the endpoint closest to a root when no
/// sign change is found in the bracket (e.g. the target is unreachable at
/// any lead time within the bracket).
fn solve_lead_time(shooter: Vec2, target_pos: Vec2, target_vel: Vec2, muzzle_speed: f32, gravity: f32, range: f32) -> (f32, bool) {
    let lo = LEAD_MIN_T;
    let hi = LEAD_MAX_T.min(LEAD_RANGE_FACTOR * range / muzzle_speed).max(lo + 0.01);

    let f = |t: f32| -> f32 {
        let predicted = target_pos.add(target_vel.scale(t));
        let drop = Vec2::new(0.0, 0.5 * gravity * t * t);
        let disp = predicted.sub(shooter).sub(drop);
        disp.length_sq() / (t * t) - muzzle_speed * muzzle_speed
    };

    let mut a = lo;
    let mut b = hi;
    let mut fa = f(a);
    let fb = f(b);
    if fa.signum() == fb.signum() {
        let fallback = if fa.abs() < fb.abs() { a } else { b };
        return (fallback, false);
    }
    for _ in 0..LEAD_ITERATIONS {
        let mid = 0.5 * (a + b);
        let fm = f(mid);
        if fm.signum() == fa.signum() {
            a = mid;
            fa = fm;
        } else {
            b = mid;
        }
    }
    (0.5 * (a + b), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ModuleSpec;
    use crate::domain::Side;
    use crate::templates::TemplateCatalog;
    use crate::unit::instantiate;

    #[test]
    fn in_range_target_produces_a_fire_plan() {
        let cat = TemplateCatalog::defaults();
        let t = cat.get("rifleman").unwrap();
        let unit = instantiate(t, Side::Player, Vec2::new(0.0, 0.0), 1, false).unwrap();
        let enemy = instantiate(t, Side::Enemy, Vec2::new(150.0, 0.0), 2, false).unwrap();
        let enemies = vec![enemy];
        let input = DecisionInput {
            unit: &unit,
            enemies: &enemies,
            incoming_projectiles: &[],
            dt: 1.0 / 60.0,
            desired_range: 150.0,
            base_target: Vec2::new(1900.0, 500.0),
        };
        let target = TargetDecision { facing: 1, attack_point: Vec2::new(150.0, 0.0), target_id: Some(2), debug_tag: "x".into() };
        let spec = ModuleSpec { family_id: "baseline-shoot".to_string(), params: Params::new() };
        let mut rng = Rng::new(1);
        let d = decide(&spec, &input, &target, &mut rng).unwrap();
        assert!(d.plan.is_some());
        assert_eq!(d.plan.unwrap().intended_target_id, 2);
    }

    #[test]
    fn out_of_range_target_is_blocked() {
        let cat = TemplateCatalog::defaults();
        let t = cat.get("rifleman").unwrap();
        let unit = instantiate(t, Side::Player, Vec2::new(0.0, 0.0), 1, false).unwrap();
        let enemy = instantiate(t, Side::Enemy, Vec2::new(5000.0, 0.0), 2, false).unwrap();
        let enemies = vec![enemy];
        let input = DecisionInput {
            unit: &unit,
            enemies: &enemies,
            incoming_projectiles: &[],
            dt: 1.0 / 60.0,
            desired_range: 150.0,
            base_target: Vec2::new(1900.0, 500.0),
        };
        let target = TargetDecision { facing: 1, attack_point: Vec2::new(5000.0, 0.0), target_id: Some(2), debug_tag: "x".into() };
        let spec = ModuleSpec { family_id: "baseline-shoot".to_string(), params: Params::new() };
        let mut rng = Rng::new(1);
        let d = decide(&spec, &input, &target, &mut rng).unwrap();
        assert!(d.plan.is_none());
        assert_eq!(d.blocked_reason.as_deref(), Some("out-of-range"));
    }

    #[test]
    fn no_target_is_blocked_with_no_target_reason() {
        let cat = TemplateCatalog::defaults();
        let t = cat.get("rifleman").unwrap();
        let unit = instantiate(t, Side::Player, Vec2::new(0.0, 0.0), 1, false).unwrap();
        let enemies: Vec<UnitInstance> = Vec::new();
        let input = DecisionInput {
            unit: &unit,
            enemies: &enemies,
            incoming_projectiles: &[],
            dt: 1.0 / 60.0,
            desired_range: 150.0,
            base_target: Vec2::new(1900.0, 500.0),
        };
        let target = TargetDecision { facing: 1, attack_point: Vec2::new(1900.0, 500.0), target_id: None, debug_tag: "x".into() };
        let spec = ModuleSpec { family_id: "baseline-shoot".to_string(), params: Params::new() };
        let mut rng = Rng::new(1);
        let d = decide(&spec, &input, &target, &mut rng).unwrap();
        assert_eq!(d.blocked_reason.as_deref(), Some("no-target"));
    }
}
