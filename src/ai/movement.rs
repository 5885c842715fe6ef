//! Movement module (C5): threat-response steering plus an advance /
//! brake / strafe base intent toward the current `attackPoint`.

use crate::ai::target::integrity;
use crate::ai::{target::TargetDecision, DecisionInput};
use crate::domain::{clamp, Vec2};
use crate::error::HarnessError;
use crate::genetics::{ParamKind, ParamSchema, Params};
use crate::rng::Rng;
use crate::unit::UnitInstance;

pub struct MovementDecision {
    pub ax: f32,
    pub ay: f32,
    pub should_evade: bool,
    pub debug_tag: String,
}

const EVADE_THREAT_THRESHOLD: f32 = 1.0 / 60.0;
const JINK_SCALE: f32 = 0.08;

pub fn schema_for(family_id: &str) -> Result<ParamSchema, HarnessError> {
    match family_id {
        "baseline-movement" => Ok(ParamSchema::new()),
        "dt-movement" => Ok(dt_schema()),
        _ => Err(HarnessError::Config(format!("unknown movement familyId '{family_id}'"))),
    }
}

fn dt_schema() -> ParamSchema {
    let mut s = ParamSchema::new();
    s.insert("strategy".to_string(), ParamKind::Int { min: 0, max: 2, default: 0, step: 1, mutate_rate: 0.25 });
    s.insert("desiredRangeFactor".to_string(), ParamKind::Number { min: 0.3, max: 1.5, default: 0.6, sigma: 0.15 });
    s.insert("retreatBoost".to_string(), ParamKind::Number { min: 0.0, max: 2.0, default: 0.6, sigma: 0.2 });
    s.insert("evadeThreshold".to_string(), ParamKind::Number { min: 0.0, max: 1.0, default: 0.4, sigma: 0.1 });
    s.insert("pushBoost".to_string(), ParamKind::Number { min: 0.0, max: 2.0, default: 0.3, sigma: 0.15 });
    s
}

pub fn decide(
    spec: &crate::ai::ModuleSpec,
    input: &DecisionInput,
    target: &TargetDecision,
    rng: &mut Rng,
) -> Result<MovementDecision, HarnessError> {
    match spec.family_id.as_str() {
        "baseline-movement" => Ok(baseline(input, target, rng)),
        "dt-movement" => Ok(decision_tree(input, target, &spec.params, rng)),
        other => Err(HarnessError::Config(format!("unknown movement familyId '{other}'"))),
    }
}

struct ThreatResponse {
    threat: f32,
    evade_dir: Vec2,
}

fn scan_threats(input: &DecisionInput) -> ThreatResponse {
    let unit = input.unit;
    let mut best_threat = 0.0f32;
    let mut evade_dir = Vec2::ZERO;
    for p in input.incoming_projectiles.iter().filter(|p| p.side != unit.side) {
        let pv = Vec2::new(p.vx, p.vy);
        let pv2 = pv.length_sq();
        if pv2 <= f32::EPSILON {
            continue;
        }
        let r = unit.pos.sub(Vec2::new(p.x, p.y));
        let t = clamp(r.dot(pv) / pv2, 0.0, 0.75);
        let closest = Vec2::new(p.x, p.y).add(pv.scale(t));
        let miss = unit.pos.sub(closest).length();
        let threat = 1.0 / miss.max(22.0);
        if threat > best_threat {
            best_threat = threat;
            let perp = pv.normalize().perp();
            let side_sign = if r.dot(perp) >= 0.0 { 1.0 } else { -1.0 };
            evade_dir = perp.scale(side_sign);
        }
    }
    ThreatResponse { threat: best_threat, evade_dir }
}

fn base_intent(unit: &UnitInstance, dir: Vec2, distance: f32, desired_range: f32, rng: &mut Rng) -> Vec2 {
    if distance > desired_range * 1.1 {
        dir
    } else if distance < desired_range * 0.74 {
        dir.scale(-0.6)
    } else {
        let sign = if (unit.ai_state_timer * 0.5).sin() >= 0.0 { 1.0 } else { -1.0 };
        dir.perp().scale(sign)
    }
    .add(Vec2::new(rng.range_f32(-1.0, 1.0), rng.range_f32(-1.0, 1.0)).scale(JINK_SCALE))
}

fn baseline(input: &DecisionInput, target: &TargetDecision, rng: &mut Rng) -> MovementDecision {
    let unit = input.unit;
    let dir = target.attack_point.sub(unit.pos).normalize();
    let distance = target.attack_point.sub(unit.pos).length();
    let threats = scan_threats(input);
    let should_evade = threats.threat > EVADE_THREAT_THRESHOLD;

    let intent = if should_evade {
        threats.evade_dir
    } else {
        base_intent(unit, dir, distance, input.desired_range, rng)
    };
    let accel = unit.accel.max(1.0);
    MovementDecision { ax: intent.x * accel, ay: intent.y * accel, should_evade, debug_tag: "baseline-movement".to_string() }
}

fn decision_tree(input: &DecisionInput, target: &TargetDecision, params: &Params, rng: &mut Rng) -> MovementDecision {
    let unit = input.unit;
    let strategy = params.get("strategy").map(|v| v.as_i64()).unwrap_or(0);
    let range_factor = params.get("desiredRangeFactor").map(|v| v.as_f64() as f32).unwrap_or(0.6);
    let retreat_boost = params.get("retreatBoost").map(|v| v.as_f64() as f32).unwrap_or(0.6);
    let evade_threshold = params.get("evadeThreshold").map(|v| v.as_f64() as f32).unwrap_or(0.4);
    let push_boost = params.get("pushBoost").map(|v| v.as_f64() as f32).unwrap_or(0.3);

    let dir = target.attack_point.sub(unit.pos).normalize();
    let distance = target.attack_point.sub(unit.pos).length();
    let desired_range = input.desired_range * range_factor;
    let threats = scan_threats(input);
    let self_integrity = integrity(unit);

    let forced_retreat = strategy == 2 && self_integrity <= 0.7;
    let should_evade = threats.threat > EVADE_THREAT_THRESHOLD || self_integrity <= evade_threshold || forced_retreat;

    let intent = if should_evade {
        let boost = if self_integrity <= evade_threshold || forced_retreat { 1.0 + retreat_boost } else { 1.0 };
        if threats.threat > EVADE_THREAT_THRESHOLD {
            threats.evade_dir.scale(boost)
        } else {
            dir.scale(-boost)
        }
    } else {
        base_intent(unit, dir, distance, desired_range, rng).add(dir.scale(push_boost))
    };
    let accel = unit.accel.max(1.0);
    MovementDecision { ax: intent.x * accel, ay: intent.y * accel, should_evade, debug_tag: "dt-movement".to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ModuleSpec;
    use crate::domain::Side;
    use crate::templates::TemplateCatalog;
    use crate::unit::instantiate;

    fn sample_input<'a>(unit: &'a UnitInstance, enemies: &'a [UnitInstance]) -> DecisionInput<'a> {
        DecisionInput {
            unit,
            enemies,
            incoming_projectiles: &[],
            dt: 1.0 / 60.0,
            desired_range: 150.0,
            base_target: Vec2::new(1900.0, 500.0),
        }
    }

    #[test]
    fn advances_when_far_from_desired_range() {
        let cat = TemplateCatalog::defaults();
        let t = cat.get("rifleman").unwrap();
        let unit = instantiate(t, Side::Player, Vec2::new(0.0, 0.0), 1, false).unwrap();
        let enemies: Vec<UnitInstance> = Vec::new();
        let input = sample_input(&unit, &enemies);
        let target = TargetDecision { facing: 1, attack_point: Vec2::new(1000.0, 0.0), target_id: None, debug_tag: "x".into() };
        let spec = ModuleSpec { family_id: "baseline-movement".to_string(), params: Params::new() };
        let mut rng = Rng::new(2);
        let d = decide(&spec, &input, &target, &mut rng).unwrap();
        assert!(d.ax > 0.0);
    }

    #[test]
    fn evades_when_projectile_threat_is_close() {
        use crate::projectile::Projectile;
        use crate::templates::WeaponClass;
        let cat = TemplateCatalog::defaults();
        let t = cat.get("rifleman").unwrap();
        let unit = instantiate(t, Side::Enemy, Vec2::new(100.0, 0.0), 1, false).unwrap();
        let enemies: Vec<UnitInstance> = Vec::new();
        let proj = Projectile {
            x: 0.0,
            y: 0.0,
            prev_x: 0.0,
            prev_y: 0.0,
            vx: 260.0,
            vy: 0.0,
            gravity: 0.0,
            ttl: 3.0,
            side: Side::Player,
            source_id: 9,
            source_is_ground: true,
            fire_origin_y: 0.0,
            initial_vy: 0.0,
            traveled_distance: 0.0,
            max_distance: 1000.0,
            weapon_class: WeaponClass::Rapid,
            damage: 5.0,
            hit_impulse: 1.0,
            radius: 2.0,
            explosive: None,
            homing: None,
            control_impair: None,
            hit_unit_ids: Vec::new(),
            intended_target: None,
            hit_intended_target: false,
            dead: false,
        };
        let projectiles = vec![proj];
        let input = DecisionInput {
            unit: &unit,
            enemies: &enemies,
            incoming_projectiles: &projectiles,
            dt: 1.0 / 60.0,
            desired_range: 150.0,
            base_target: Vec2::new(100.0, 500.0),
        };
        let target = TargetDecision { facing: -1, attack_point: Vec2::new(100.0, 500.0), target_id: None, debug_tag: "x".into() };
        let spec = ModuleSpec { family_id: "baseline-movement".to_string(), params: Params::new() };
        let mut rng = Rng::new(3);
        let d = decide(&spec, &input, &target, &mut rng).unwrap();
        assert!(d.should_evade);
    }
}
