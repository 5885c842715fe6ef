//! Battle Session (C6): the fixed-timestep tick loop, command executor,
//! spawn/cap policy, and outcome detection.
//!
//! Phase order is fixed and never reordered: spawn → AI decide → command
//! execute → integrate → projectile advance → outcome check (§4.6, §9
//! "implicit time-loop ordering"). Controllers only ever see a read-only
//! snapshot of the arena; every mutation happens in the execute/integrate
//! phases, never inside `decide`.

use crate::ai::{decide_composite, CombatDecision, CompositeSpec, DecisionInput, FirePlan};
use crate::config::SimConfig;
use crate::constants::{
    AI_GRAVITY_CORRECTION_CLAMP, AI_GRAVITY_CORRECTION_STEP, AI_MISS_VERTICAL_TOLERANCE, AIR_DROP_GRAVITY,
    AIR_DROP_SPEED_CAP, TICK_DT,
};
use crate::domain::{clamp, Rect, Side, Vec2};
use crate::physics::clamp_speed;
use crate::projectile::{self, BaseState, ControlImpairSpec, ExplosiveSpec, HomingSpec, IntendedTarget, Projectile};
use crate::rng::Rng;
use crate::templates::{TemplateCatalog, UnitKind, WeaponClass};
use crate::unit::{self as unit_model, recalc_mass, refresh_mobility, UnitInstance};

#[derive(Clone, Debug)]
pub struct Outcome {
    pub player_victory: bool,
    pub reason: String,
}

pub struct BattleState {
    pub units: Vec<UnitInstance>,
    pub projectiles: Vec<Projectile>,
    pub player_base: BaseState,
    pub enemy_base: BaseState,
    pub player_gas: f32,
    pub enemy_gas: f32,
    pub enemy_infinite_gas: bool,
    pub enemy_min_active: usize,
    pub enemy_spawn_timer: f32,
    pub elapsed: f32,
    pub max_sim_seconds: f32,
    pub outcome: Option<Outcome>,
    pub next_unit_id: u64,
    pub config: SimConfig,
    pub node_defense: f32,
    pub player_composite: CompositeSpec,
    pub enemy_composite: CompositeSpec,
    /// When `false` (the Match Runner's default, §4.7 step 3) the battle
    /// never spawns enemies on its own timer; the caller drives all spawns.
    pub auto_enemy_spawns: bool,
}

impl BattleState {
    pub fn new(
        config: SimConfig,
        max_sim_seconds: f32,
        node_defense: f32,
        player_gas: f32,
        enemy_gas: f32,
        player_composite: CompositeSpec,
        enemy_composite: CompositeSpec,
        base_hp: f32,
    ) -> Self {
        let ground_y = config.ground_y();
        let player_base = BaseState {
            hp: base_hp,
            max_hp: base_hp,
            rect: Rect { x: -40.0, y: ground_y - 60.0, w: 40.0, h: 120.0 },
        };
        let enemy_base = BaseState {
            hp: base_hp,
            max_hp: base_hp,
            rect: Rect { x: config.battlefield_w, y: ground_y - 60.0, w: 40.0, h: 120.0 },
        };
        BattleState {
            units: Vec::new(),
            projectiles: Vec::new(),
            player_base,
            enemy_base,
            player_gas,
            enemy_gas,
            enemy_infinite_gas: false,
            enemy_min_active: 0,
            enemy_spawn_timer: 0.0,
            elapsed: 0.0,
            max_sim_seconds,
            outcome: None,
            next_unit_id: 1,
            config,
            node_defense,
            player_composite,
            enemy_composite,
            auto_enemy_spawns: false,
        }
    }

    pub fn enemy_cap(&self) -> usize {
        (3.0f32).max((self.node_defense * 3.2 + 1.0).ceil()).max(self.enemy_min_active as f32) as usize
    }

    fn spend_gas(&mut self, side: Side, cost: u32) {
        match side {
            Side::Player => self.player_gas -= cost as f32,
            Side::Enemy => {
                if !self.enemy_infinite_gas {
                    self.enemy_gas -= cost as f32;
                }
            }
        }
    }

    fn alive_count(&self, side: Side) -> usize {
        self.units.iter().filter(|u| u.side == side && u.is_alive()).count()
    }

    fn can_afford(&self, side: Side, cost: u32) -> bool {
        match side {
            Side::Player => self.player_gas >= cost as f32,
            Side::Enemy => self.enemy_infinite_gas || self.enemy_gas >= cost as f32,
        }
    }

    /// Spawn a unit from `catalog`, honoring cap and gas unless
    /// `ignore_cap`/`free` bypass them (§4.6 spawn/cap policy, §4.7 step 4
    /// free starters). Returns the new unit's id.
    pub fn spawn(
        &mut self,
        catalog: &TemplateCatalog,
        template_id: &str,
        side: Side,
        pos: Vec2,
        free: bool,
        ignore_cap: bool,
        side_cap: Option<usize>,
    ) -> Option<u64> {
        let template = catalog.get(template_id)?;
        if !ignore_cap {
            let cap = match side {
                Side::Enemy => self.enemy_cap(),
                Side::Player => side_cap.unwrap_or(usize::MAX),
            };
            if self.alive_count(side) >= cap {
                return None;
            }
        }
        if !free && !self.can_afford(side, template.gas_cost) {
            return None;
        }
        let id = self.next_unit_id;
        let unit = unit_model::instantiate(template, side, pos, id, free)?;
        if !free {
            self.spend_gas(side, template.gas_cost);
        }
        self.next_unit_id += 1;
        self.units.push(unit);
        Some(id)
    }

    /// Advance the battle by one fixed tick (§4.6). No-op once an outcome
    /// has been recorded (§3 invariant: outcome set exactly once).
    pub fn step(&mut self, catalog: &TemplateCatalog, rng: &mut Rng) {
        if self.outcome.is_some() {
            return;
        }

        if self.auto_enemy_spawns {
            self.auto_spawn_step(catalog, rng);
        }

        let decisions = self.decide_phase(rng);
        self.execute_phase(&decisions);
        self.integrate_phase();
        let dt = TICK_DT;
        {
            let BattleState { projectiles, units, player_base, enemy_base, .. } = self;
            projectile::advance_all(projectiles, units, player_base, enemy_base, dt, rng);
        }
        self.apply_ai_shot_feedback();

        self.units.retain(|u| u.is_alive());
        self.elapsed += dt;
        self.detect_outcome();
    }

    fn auto_spawn_step(&mut self, catalog: &TemplateCatalog, rng: &mut Rng) {
        self.enemy_spawn_timer -= TICK_DT;
        if self.enemy_spawn_timer > 0.0 {
            return;
        }
        self.enemy_spawn_timer = rng.range_f32(self.config.ai_spawn_interval_min, self.config.ai_spawn_interval_max);
        if self.alive_count(Side::Enemy) >= self.enemy_cap() {
            return;
        }
        let roster = catalog.roster();
        if roster.is_empty() {
            return;
        }
        let pick = &roster[rng.index(roster.len())];
        let y = rng.range_f32(self.config.spawn_y_min, self.config.spawn_y_max);
        let pos = Vec2::new(self.config.battlefield_w - self.config.lane_margin, y);
        self.spawn(catalog, pick, Side::Enemy, pos, false, false, None);
    }

    fn decide_phase(&self, rng: &mut Rng) -> Vec<Option<CombatDecision>> {
        let player_base_center = self.player_base.rect.center();
        let enemy_base_center = self.enemy_base.rect.center();
        let mut decisions = Vec::with_capacity(self.units.len());
        for unit in &self.units {
            if !unit.is_operable() || unit.air_drop_active || !unit.has_alive_weapon() {
                decisions.push(None);
                continue;
            }
            let composite = match unit.side {
                Side::Player => &self.player_composite,
                Side::Enemy => &self.enemy_composite,
            };
            let opp_center = match unit.side {
                Side::Player => enemy_base_center,
                Side::Enemy => player_base_center,
            };
            let enemies: Vec<UnitInstance> =
                self.units.iter().filter(|u| u.side != unit.side && u.is_alive()).cloned().collect();
            let desired_range = desired_range_for(unit, &self.config);
            let input = DecisionInput {
                unit,
                enemies: &enemies,
                incoming_projectiles: &self.projectiles,
                dt: TICK_DT,
                desired_range,
                base_target: opp_center,
            };
            match decide_composite(composite, &input, &mut rng.fork()) {
                Ok(decision) => decisions.push(Some(decision)),
                Err(_) => decisions.push(None),
            }
        }
        decisions
    }

    fn execute_phase(&mut self, decisions: &[Option<CombatDecision>]) {
        let player_base_center = self.player_base.rect.center();
        let enemy_base_center = self.enemy_base.rect.center();
        let mut new_projectiles = Vec::new();

        for (i, unit) in self.units.iter_mut().enumerate() {
            if !unit.is_alive() {
                continue;
            }
            unit.control_impair_timer = (unit.control_impair_timer - TICK_DT).max(0.0);
            if unit.control_impair_timer <= 0.0 {
                unit.control_impair_factor = 1.0;
            }

            if !unit.has_alive_control() {
                continue;
            }

            if unit.air_drop_active {
                let own_center = if unit.side == Side::Player { player_base_center } else { enemy_base_center };
                let dir = own_center.sub(unit.pos).normalize();
                unit.facing = if dir.x >= 0.0 { 1 } else { -1 };
                unit.vel.x += dir.x * unit.accel.max(1.0) * TICK_DT;
                continue;
            }

            if !unit.has_alive_weapon() {
                let own_center = if unit.side == Side::Player { player_base_center } else { enemy_base_center };
                let dir = own_center.sub(unit.pos).normalize();
                unit.facing = if dir.x >= 0.0 { 1 } else { -1 };
                unit.vel.x += dir.x * unit.accel.max(1.0) * 0.6 * TICK_DT;
                if unit.unit_type == UnitKind::Air {
                    unit.air_drop_active = true;
                }
                continue;
            }

            let Some(decision) = decisions.get(i).and_then(|d| d.clone()) else { continue };
            unit.facing = decision.facing;
            unit.ai_state = decision.state;
            unit.ai_state_timer += TICK_DT;
            let kind = unit.unit_type;
            apply_movement(unit, decision.movement.ax, decision.movement.ay, kind);

            if let Some(plan) = decision.fire_plan {
                if let Some(proj) = try_fire(unit, &plan) {
                    new_projectiles.push(proj);
                }
            }
        }
        self.projectiles.extend(new_projectiles);
    }

    fn integrate_phase(&mut self) {
        let dt = TICK_DT;
        for unit in &mut self.units {
            if !unit.is_alive() {
                continue;
            }
            let speed_cap = if unit.air_drop_active { AIR_DROP_SPEED_CAP } else { unit.max_speed };
            unit.vel.x = clamp_speed(unit.vel.x, speed_cap.max(1.0));
            if unit.unit_type == UnitKind::Air {
                if unit.air_drop_active {
                    unit.vel.y += AIR_DROP_GRAVITY * dt;
                }
            } else {
                unit.vel.x *= unit.turn_drag;
            }
            unit.pos.x += unit.vel.x * dt;
            unit.pos.y += unit.vel.y * dt;
            unit.pos.x = clamp(unit.pos.x, self.config.lane_margin, self.config.battlefield_w - self.config.lane_margin);

            tick_weapons(unit, dt);
            tick_loaders(unit, dt);
            unit_model::apply_structure_recovery(unit, dt);
            recalc_mass(unit);
            refresh_mobility(unit);
        }
    }

    fn apply_ai_shot_feedback(&mut self) {
        for p in &self.projectiles {
            if let Some(intended) = p.intended_target {
                if !p.hit_intended_target && p.dead {
                    let miss_y = (p.y - intended.y).abs();
                    if miss_y > AI_MISS_VERTICAL_TOLERANCE {
                        if let Some(shooter) = self.units.iter_mut().find(|u| u.id == p.source_id) {
                            let sign = if p.y < intended.y { 1.0 } else { -1.0 };
                            shooter.ai_aim_correction_y = clamp(
                                shooter.ai_aim_correction_y + sign * AI_GRAVITY_CORRECTION_STEP,
                                -AI_GRAVITY_CORRECTION_CLAMP,
                                AI_GRAVITY_CORRECTION_CLAMP,
                            );
                        }
                    }
                }
            }
        }
    }

    fn detect_outcome(&mut self) {
        if self.player_base.hp <= 0.0 {
            self.outcome = Some(Outcome { player_victory: false, reason: "Enemy breached the player base".to_string() });
            return;
        }
        if self.enemy_base.hp <= 0.0 {
            self.outcome = Some(Outcome { player_victory: true, reason: "Player breached the enemy base".to_string() });
            return;
        }
        if self.elapsed >= self.max_sim_seconds {
            self.outcome = Some(Outcome {
                player_victory: self.enemy_base.hp <= self.player_base.hp,
                reason: "Arena deadline reached".to_string(),
            });
        }
    }
}

fn desired_range_for(unit: &UnitInstance, config: &SimConfig) -> f32 {
    let ranges = unit.alive_weapon_ranges();
    if ranges.is_empty() {
        return config.desired_range_min;
    }
    let avg = ranges.iter().sum::<f32>() / ranges.len() as f32;
    let mid = (config.desired_range_near_fraction + config.desired_range_far_fraction) * 0.5;
    clamp(avg * mid, config.desired_range_min, config.desired_range_max)
}

fn apply_movement(unit: &mut UnitInstance, ax: f32, ay: f32, kind: UnitKind) {
    match kind {
        UnitKind::Ground => {
            unit.vel.x += ax * TICK_DT * unit.control_impair_factor;
        }
        UnitKind::Air => {
            let lift_ratio = unit_model::air_lift_ratio(unit);
            if lift_ratio <= 1.0 {
                unit.air_drop_active = true;
                return;
            }
            let spare = (lift_ratio - 1.0).min(1.0).max(0.0);
            unit.vel.x += ax * TICK_DT * spare * unit.control_impair_factor;
            unit.vel.y += ay * TICK_DT * spare * 0.5 * unit.control_impair_factor;
        }
    }
}

/// Execute a fire request: checks cooldown/charges/angle were already
/// validated by the shoot module, spawns the muzzle projectile, applies
/// recoil, and consumes the charge or starts the burst cooldown (§4.2, §4.6
/// step 3).
fn try_fire(unit: &mut UnitInstance, plan: &FirePlan) -> Option<Projectile> {
    let slot = unit.weapon_slots.get_mut(plan.slot_index)?;
    if slot.cooldown > 0.0 || slot.charges == 0 {
        return None;
    }
    let attachment = &unit.attachments[slot.attachment_id];
    if !attachment.alive {
        return None;
    }
    let stats = attachment.stats;

    slot.charges -= 1;
    slot.cooldown = stats.cooldown.max(0.05);
    unit.ai_cycle_index = unit.ai_cycle_index.wrapping_add(1);
    unit.fire_origin_target_id = Some(plan.intended_target_id);

    let muzzle = Vec2::new(unit.pos.x + unit.facing as f32 * unit.radius, unit.pos.y);
    let aim = Vec2::new(plan.aim.x, plan.aim.y + unit.ai_aim_correction_y);
    let dir = aim.sub(muzzle).normalize();
    let speed = stats.muzzle_speed.max(1.0);

    unit.vel.x -= unit.facing as f32 * stats.recoil / unit.mass.max(1.0);

    let explosive = if stats.explosive_radius > 0.0 {
        Some(ExplosiveSpec {
            radius: stats.explosive_radius,
            damage: stats.damage,
            falloff_power: stats.explosive_falloff_power.max(1.0),
            fuse_timed: stats.explosive_fuse_timed,
            fuse_time: if stats.explosive_fuse_timed { Some(stats.explosive_fuse_time) } else { None },
        })
    } else {
        None
    };
    let homing = if stats.homing_turn_rate_deg_per_sec > 0.0 {
        Some(HomingSpec {
            target_id: Some(plan.intended_target_id),
            aim_x: plan.aim.x,
            aim_y: plan.aim.y,
            turn_rate_deg_per_sec: stats.homing_turn_rate_deg_per_sec,
        })
    } else {
        None
    };
    let control_impair = if stats.control_impair_factor > 0.0 {
        Some(ControlImpairSpec { factor: stats.control_impair_factor, duration: stats.control_impair_duration })
    } else {
        None
    };

    Some(Projectile {
        x: muzzle.x,
        y: muzzle.y,
        prev_x: muzzle.x,
        prev_y: muzzle.y,
        vx: dir.x * speed,
        vy: dir.y * speed,
        gravity: stats.gravity,
        ttl: 4.0,
        side: unit.side,
        source_id: unit.id,
        source_is_ground: unit.unit_type == UnitKind::Ground,
        fire_origin_y: muzzle.y,
        initial_vy: dir.y * speed,
        traveled_distance: 0.0,
        max_distance: plan.effective_range * 1.3,
        weapon_class: slot.class,
        damage: stats.damage,
        hit_impulse: stats.recoil * 2.0,
        radius: 3.0,
        explosive,
        homing,
        control_impair,
        hit_unit_ids: Vec::new(),
        intended_target: Some(IntendedTarget { id: plan.intended_target_id, x: plan.aim.x, y: plan.intended_target_y }),
        hit_intended_target: false,
        dead: false,
    })
}

fn tick_weapons(unit: &mut UnitInstance, dt: f32) {
    for slot in &mut unit.weapon_slots {
        if slot.cooldown > 0.0 {
            slot.cooldown = (slot.cooldown - dt).max(0.0);
        }
        if matches!(slot.class, WeaponClass::Rapid | WeaponClass::Beam) && slot.cooldown <= 0.0 {
            slot.charges = slot.capacity;
        }
    }
}

/// Loaders round-robin over the weapon slots they can feed (heavy,
/// explosive, tracking — any slot backed by a loader-summed capacity),
/// refilling one charge per completed load cycle (§4.2).
fn tick_loaders(unit: &mut UnitInstance, dt: f32) {
    let feedable: Vec<usize> = unit
        .weapon_slots
        .iter()
        .enumerate()
        .filter(|(_, s)| matches!(s.class, WeaponClass::Heavy | WeaponClass::Explosive | WeaponClass::Tracking))
        .map(|(i, _)| i)
        .collect();
    if feedable.is_empty() {
        return;
    }
    for loader_idx in 0..unit.loaders.len() {
        let attachment_id = unit.loaders[loader_idx].attachment_id;
        if !unit.attachments[attachment_id].alive {
            continue;
        }
        let stats = unit.attachments[attachment_id].stats;
        unit.loaders[loader_idx].timer -= dt;
        if unit.loaders[loader_idx].timer > 0.0 {
            continue;
        }
        let target_pos = unit.loaders[loader_idx].target_slot % feedable.len();
        let slot_idx = feedable[target_pos];
        let weapon_cooldown = unit.attachments[unit.weapon_slots[slot_idx].attachment_id].stats.cooldown;
        let duration = stats
            .min_load_time
            .max(weapon_cooldown * stats.load_multiplier * if stats.fast_operation { 0.82 } else { 1.08 });
        unit.loaders[loader_idx].timer = duration.max(0.05);
        unit.loaders[loader_idx].target_slot = target_pos + 1;
        let slot = &mut unit.weapon_slots[slot_idx];
        slot.charges = (slot.charges + 1).min(slot.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::CompositeSpec;
    use crate::domain::Vec2;
    use crate::templates::TemplateCatalog;

    fn fresh_battle() -> (BattleState, TemplateCatalog) {
        let catalog = TemplateCatalog::defaults();
        let battle = BattleState::new(
            SimConfig::default(),
            10.0,
            1.0,
            10_000.0,
            10_000.0,
            CompositeSpec::baseline(),
            CompositeSpec::baseline(),
            1000.0,
        );
        (battle, catalog)
    }

    #[test]
    fn spawn_respects_gas_cost() {
        let (mut battle, catalog) = fresh_battle();
        battle.player_gas = 10.0;
        let spawned = battle.spawn(&catalog, "tank", Side::Player, Vec2::new(500.0, 500.0), false, true, None);
        assert!(spawned.is_none());
    }

    #[test]
    fn stepping_an_empty_battle_reaches_deadline() {
        let (mut battle, catalog) = fresh_battle();
        let mut rng = Rng::new(1);
        let ticks = (battle.max_sim_seconds / TICK_DT).ceil() as u32 + 2;
        for _ in 0..ticks {
            battle.step(&catalog, &mut rng);
        }
        let outcome = battle.outcome.expect("deadline should have fired");
        assert!(outcome.reason.to_lowercase().contains("deadline"));
    }

    #[test]
    fn outcome_is_set_exactly_once() {
        let (mut battle, catalog) = fresh_battle();
        let mut rng = Rng::new(2);
        let ticks = (battle.max_sim_seconds / TICK_DT).ceil() as u32 + 5;
        for _ in 0..ticks {
            battle.step(&catalog, &mut rng);
        }
        let first = battle.outcome.clone().unwrap().reason;
        battle.step(&catalog, &mut rng);
        let second = battle.outcome.clone().unwrap().reason;
        assert_eq!(first, second);
    }
}
