//! Projectile system (C4): ballistic integration, homing, swept-AABB hit
//! detection, explosive detonation, and base damage.

use serde::{Deserialize, Serialize};

use crate::constants::{
    BASE_DAMAGE_FACTOR, EXPLOSIVE_CONTROL_IMPAIR_SCALE, EXPLOSIVE_IMPULSE_SCALE, EXPLOSIVE_SPLASH_MIN,
    GROUND_PROJECTILE_MAX_DROP_BELOW_FIRE_Y,
};
use crate::domain::{Rect, Side, Vec2};
use crate::physics::{apply_hit, pick_impacted_cell};
use crate::rng::Rng;
use crate::templates::WeaponClass;
use crate::unit::UnitInstance;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExplosiveSpec {
    pub radius: f32,
    pub damage: f32,
    pub falloff_power: f32,
    pub fuse_timed: bool,
    pub fuse_time: Option<f32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HomingSpec {
    pub target_id: Option<u64>,
    pub aim_x: f32,
    pub aim_y: f32,
    pub turn_rate_deg_per_sec: f32,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct ControlImpairSpec {
    pub factor: f32,
    pub duration: f32,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct IntendedTarget {
    pub id: u64,
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Projectile {
    pub x: f32,
    pub y: f32,
    pub prev_x: f32,
    pub prev_y: f32,
    pub vx: f32,
    pub vy: f32,
    pub gravity: f32,
    pub ttl: f32,
    pub side: Side,
    pub source_id: u64,
    pub source_is_ground: bool,
    pub fire_origin_y: f32,
    pub initial_vy: f32,
    pub traveled_distance: f32,
    pub max_distance: f32,
    pub weapon_class: WeaponClass,
    pub damage: f32,
    pub hit_impulse: f32,
    pub radius: f32,
    pub explosive: Option<ExplosiveSpec>,
    pub homing: Option<HomingSpec>,
    pub control_impair: Option<ControlImpairSpec>,
    pub hit_unit_ids: Vec<u64>,
    pub intended_target: Option<IntendedTarget>,
    pub hit_intended_target: bool,
    pub dead: bool,
}

impl Projectile {
    fn explode_on_impact(&self) -> bool {
        matches!(&self.explosive, Some(e) if !e.fuse_timed)
    }
}

pub struct BaseState {
    pub hp: f32,
    pub max_hp: f32,
    pub rect: Rect,
}

const AIR_TARGET_TOLERANCE: f32 = 26.0;

/// Advance every projectile one tick, resolving hits and base damage.
/// `units` is the full arena for both sides; `player_base`/`enemy_base` are
/// the two base rectangles (§4.4, §4.6 step 5).
pub fn advance_all(
    projectiles: &mut Vec<Projectile>,
    units: &mut [UnitInstance],
    player_base: &mut BaseState,
    enemy_base: &mut BaseState,
    dt: f32,
    rng: &mut Rng,
) {
    for p in projectiles.iter_mut() {
        advance_one(p, units, player_base, enemy_base, dt, rng);
    }
    projectiles.retain(|p| !p.dead && p.ttl > -0.5);
}

fn advance_one(
    p: &mut Projectile,
    units: &mut [UnitInstance],
    player_base: &mut BaseState,
    enemy_base: &mut BaseState,
    dt: f32,
    rng: &mut Rng,
) {
    if p.dead {
        return;
    }
    p.ttl -= dt;
    p.prev_x = p.x;
    p.prev_y = p.y;

    if let Some(homing) = p.homing.clone() {
        let target_alive = homing
            .target_id
            .and_then(|id| units.iter().find(|u| u.id == id && u.is_alive()));
        let (aim_x, aim_y) = if let Some(t) = target_alive {
            (t.pos.x, t.pos.y)
        } else {
            // Reacquire nearest enemy to the last known aim point.
            let best = units
                .iter()
                .filter(|u| u.side != p.side && u.is_alive())
                .min_by(|a, b| {
                    let da = (a.pos.x - homing.aim_x).powi(2) + (a.pos.y - homing.aim_y).powi(2);
                    let db = (b.pos.x - homing.aim_x).powi(2) + (b.pos.y - homing.aim_y).powi(2);
                    da.partial_cmp(&db).unwrap()
                });
            match best {
                Some(u) => {
                    if let Some(h) = p.homing.as_mut() {
                        h.target_id = Some(u.id);
                    }
                    (u.pos.x, u.pos.y)
                }
                None => (homing.aim_x, homing.aim_y),
            }
        };
        let speed = (p.vx * p.vx + p.vy * p.vy).sqrt();
        let desired = (aim_y - p.y).atan2(aim_x - p.x);
        let current = p.vy.atan2(p.vx);
        let max_turn = homing.turn_rate_deg_per_sec.to_radians() * dt;
        let mut diff = desired - current;
        while diff > std::f32::consts::PI {
            diff -= std::f32::consts::TAU;
        }
        while diff < -std::f32::consts::PI {
            diff += std::f32::consts::TAU;
        }
        let turned = current + diff.max(-max_turn).min(max_turn);
        p.vx = turned.cos() * speed;
        p.vy = turned.sin() * speed;
    }

    p.vy += p.gravity * dt;
    let step_x = p.vx * dt;
    let step_y = p.vy * dt;
    p.x += step_x;
    p.y += step_y;
    p.traveled_distance += (step_x * step_x + step_y * step_y).sqrt();

    if p.traveled_distance >= p.max_distance {
        p.dead = true;
        return;
    }

    if p.source_is_ground
        && p.homing.is_none()
        && p.initial_vy > 0.0
        && p.y - p.fire_origin_y > GROUND_PROJECTILE_MAX_DROP_BELOW_FIRE_Y
    {
        detonate_or_kill(p, units, rng);
        if p.dead {
            return;
        }
    }

    if p.ttl <= 0.0 {
        if matches!(&p.explosive, Some(e) if e.fuse_timed) {
            detonate(p, units, rng);
        }
        p.dead = true;
        return;
    }

    resolve_target_hits(p, units, rng);
    if p.dead {
        return;
    }

    resolve_base_damage(p, units, player_base, enemy_base);
}

fn detonate_or_kill(p: &mut Projectile, units: &mut [UnitInstance], rng: &mut Rng) {
    if p.explosive.is_some() {
        detonate(p, units, rng);
    }
    p.dead = true;
}

fn resolve_target_hits(p: &mut Projectile, units: &mut [UnitInstance], rng: &mut Rng) {
    let seg_a = Vec2::new(p.prev_x, p.prev_y);
    let seg_b = Vec2::new(p.x, p.y);

    let mut best: Option<(usize, f32)> = None;
    for (idx, u) in units.iter().enumerate() {
        if u.side == p.side || !u.is_alive() || p.hit_unit_ids.contains(&u.id) {
            continue;
        }
        if matches!(u.unit_type, crate::templates::UnitKind::Air) {
            if (u.pos.y - p.y).abs() > AIR_TARGET_TOLERANCE + p.radius {
                continue;
            }
        }
        if let Some(t) = swept_entry_time(seg_a, seg_b, u.pos, u.radius + p.radius) {
            if best.map_or(true, |(_, bt)| t < bt) {
                best = Some((idx, t));
            }
        }
    }

    let Some((idx, _)) = best else { return };
    let impact_side = p.vx;
    let unit = &mut units[idx];
    let preferred = pick_impacted_cell(unit, None, impact_side).map(Some).unwrap_or(None);
    let Some(cell_id) = preferred else { return };

    p.hit_unit_ids.push(unit.id);
    apply_hit(unit, cell_id, p.damage, p.hit_impulse, impact_side, rng);
    if let Some(ci) = p.control_impair {
        unit.control_impair_factor = ci.factor;
        unit.control_impair_timer = unit.control_impair_timer.max(ci.duration);
    }
    if let Some(intended) = p.intended_target {
        if intended.id == unit.id {
            p.hit_intended_target = true;
        }
    }

    let is_air_target = matches!(unit.unit_type, crate::templates::UnitKind::Air);
    let pierces = p.source_is_ground && is_air_target;
    if !pierces {
        p.ttl = -1.0;
    }

    if p.explode_on_impact() {
        detonate(p, units, rng);
        p.dead = true;
    } else if !unit.is_alive() {
        // A kill on a non-explosive, non-piercing shot still consumes it.
        if !pierces {
            p.dead = true;
        }
    }
}

/// Swept-segment-vs-circle entry time in `[0,1]`, or `None` if the segment
/// never enters the inflated radius.
fn swept_entry_time(a: Vec2, b: Vec2, center: Vec2, radius: f32) -> Option<f32> {
    let d = b.sub(a);
    let f = a.sub(center);
    let a_coef = d.dot(d);
    if a_coef <= f32::EPSILON {
        return if f.length() <= radius { Some(0.0) } else { None };
    }
    let b_coef = 2.0 * f.dot(d);
    let c_coef = f.dot(f) - radius * radius;
    let disc = b_coef * b_coef - 4.0 * a_coef * c_coef;
    if disc < 0.0 {
        return None;
    }
    let disc_sqrt = disc.sqrt();
    let t1 = (-b_coef - disc_sqrt) / (2.0 * a_coef);
    let t2 = (-b_coef + disc_sqrt) / (2.0 * a_coef);
    if t1 >= 0.0 && t1 <= 1.0 {
        Some(t1)
    } else if t2 >= 0.0 && t2 <= 1.0 {
        Some(0.0f32.max(t2.min(1.0)))
    } else if t1 < 0.0 && t2 > 1.0 {
        Some(0.0)
    } else {
        None
    }
}

fn detonate(p: &mut Projectile, units: &mut [UnitInstance], rng: &mut Rng) {
    let Some(spec) = p.explosive.clone() else { return };
    let origin = Vec2::new(p.x, p.y);
    for unit in units.iter_mut() {
        if unit.side == p.side || !unit.is_alive() {
            continue;
        }
        if p.hit_unit_ids.contains(&unit.id) {
            continue;
        }
        let d = origin.sub(unit.pos).length();
        if d > spec.radius {
            continue;
        }
        let falloff = (1.0 - d / spec.radius).max(0.0).powf(spec.falloff_power);
        let splash = spec.damage * falloff;
        if splash <= EXPLOSIVE_SPLASH_MIN {
            continue;
        }
        let impact_side = unit.pos.x - origin.x;
        let preferred = pick_impacted_cell(unit, None, impact_side);
        if let Some(cell_id) = preferred {
            apply_hit(unit, cell_id, splash, p.hit_impulse * EXPLOSIVE_IMPULSE_SCALE, impact_side, rng);
            if let Some(ci) = p.control_impair {
                unit.control_impair_factor = ci.factor;
                unit.control_impair_timer =
                    unit.control_impair_timer.max(ci.duration * EXPLOSIVE_CONTROL_IMPAIR_SCALE);
            }
        }
    }
}

fn resolve_base_damage(p: &mut Projectile, units: &[UnitInstance], player_base: &mut BaseState, enemy_base: &mut BaseState) {
    let target_side = p.side.opponent();
    let target_side_defended =
        units.iter().any(|u| u.side == target_side && u.is_operable() && u.has_alive_weapon());
    if target_side_defended {
        return;
    }
    let base = match target_side {
        Side::Player => &mut *player_base,
        Side::Enemy => &mut *enemy_base,
    };
    if base.rect.contains(Vec2::new(p.x, p.y)) {
        base.hp = (base.hp - p.damage * BASE_DAMAGE_FACTOR).max(0.0);
        p.dead = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Side, Vec2};
    use crate::templates::TemplateCatalog;
    use crate::unit::instantiate;

    fn base(rect: Rect) -> BaseState {
        BaseState { hp: 1000.0, max_hp: 1000.0, rect }
    }

    fn sample_projectile(side: Side) -> Projectile {
        Projectile {
            x: 0.0,
            y: 0.0,
            prev_x: 0.0,
            prev_y: 0.0,
            vx: 100.0,
            vy: 0.0,
            gravity: 0.0,
            ttl: 5.0,
            side,
            source_id: 1,
            source_is_ground: true,
            fire_origin_y: 0.0,
            initial_vy: 0.0,
            traveled_distance: 0.0,
            max_distance: 1000.0,
            weapon_class: WeaponClass::Rapid,
            damage: 20.0,
            hit_impulse: 5.0,
            radius: 2.0,
            explosive: None,
            homing: None,
            control_impair: None,
            hit_unit_ids: Vec::new(),
            intended_target: None,
            hit_intended_target: false,
            dead: false,
        }
    }

    #[test]
    fn never_damages_own_side() {
        let cat = TemplateCatalog::defaults();
        let t = cat.get("rifleman").unwrap();
        let mut units = vec![instantiate(t, Side::Player, Vec2::new(5.0, 0.0), 2, false).unwrap()];
        let mut projectiles = vec![sample_projectile(Side::Player)];
        let mut pb = base(Rect { x: -50.0, y: -50.0, w: 10.0, h: 10.0 });
        let mut eb = base(Rect { x: 2000.0, y: -50.0, w: 10.0, h: 10.0 });
        let mut rng = Rng::new(1);
        for _ in 0..10 {
            advance_all(&mut projectiles, &mut units, &mut pb, &mut eb, 1.0 / 60.0, &mut rng);
        }
        assert!(units[0].is_alive());
    }

    #[test]
    fn ttl_monotonically_decreases() {
        let mut p = sample_projectile(Side::Player);
        let mut units: Vec<UnitInstance> = Vec::new();
        let mut pb = base(Rect { x: -50.0, y: -50.0, w: 10.0, h: 10.0 });
        let mut eb = base(Rect { x: 2000.0, y: -50.0, w: 10.0, h: 10.0 });
        let mut rng = Rng::new(1);
        let mut last = p.ttl;
        for _ in 0..5 {
            advance_one(&mut p, &mut units, &mut pb, &mut eb, 1.0 / 60.0, &mut rng);
            assert!(p.ttl < last);
            last = p.ttl;
        }
    }
}
