//! Unit model (C2): instantiation, mobility recompute, structure recovery,
//! and the loader/weapon charge model.

use serde::{Deserialize, Serialize};

use crate::constants::{
    AIR_HOLD_GRAVITY, AIR_THRUST_ACCEL_SCALE, IMPULSE_DAMAGE_STRESS_FACTOR, MIN_UNIT_MASS,
};
use crate::domain::{clamp, Side, Vec2};
use crate::rng::Rng;
use crate::templates::{AttachmentStats, ComponentKind, Propulsion, UnitKind, UnitTemplate, WeaponClass};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AiState {
    Engage,
    Evade,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CellState {
    pub id: usize,
    pub x: i32,
    pub y: i32,
    pub armor: f32,
    pub recover_per_second: f32,
    pub mass: f32,
    pub strain: f32,
    pub break_threshold: f32,
    pub destroyed: bool,
    pub vibrate: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttachmentState {
    pub id: usize,
    pub cell_id: usize,
    pub kind: ComponentKind,
    pub stats: AttachmentStats,
    pub alive: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WeaponSlotState {
    pub attachment_id: usize,
    pub class: WeaponClass,
    pub cooldown: f32,
    pub charges: u32,
    pub capacity: u32,
    pub burst_timer: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoaderState {
    pub attachment_id: usize,
    pub timer: f32,
    pub target_slot: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnitInstance {
    pub id: u64,
    pub side: Side,
    pub template_id: String,
    pub unit_type: UnitKind,
    pub facing: i8,
    pub pos: Vec2,
    pub vel: Vec2,
    pub radius: f32,
    pub mass: f32,
    pub max_speed: f32,
    pub accel: f32,
    pub turn_drag: f32,
    pub cells: Vec<CellState>,
    pub attachments: Vec<AttachmentState>,
    pub weapon_slots: Vec<WeaponSlotState>,
    pub loaders: Vec<LoaderState>,
    pub control_impair_factor: f32,
    pub control_impair_timer: f32,
    pub air_drop_active: bool,
    pub ai_state: AiState,
    pub ai_state_timer: f32,
    pub ai_aim_correction_y: f32,
    pub ai_cycle_index: u32,
    pub deployment_gas_cost: u32,
    pub free_starter: bool,
    pub preferred_slot: Option<usize>,
    pub fire_origin_target_id: Option<u64>,
}

impl UnitInstance {
    pub fn is_alive(&self) -> bool {
        self.cells.iter().any(|c| !c.destroyed)
    }

    pub fn has_alive_control(&self) -> bool {
        self.attachments.iter().any(|a| a.alive && matches!(a.kind, ComponentKind::Control))
    }

    pub fn is_operable(&self) -> bool {
        self.is_alive() && self.has_alive_control()
    }

    pub fn has_alive_weapon(&self) -> bool {
        self.weapon_slots.iter().any(|slot| self.attachments[slot.attachment_id].alive)
    }

    pub fn alive_weapon_ranges(&self) -> Vec<f32> {
        self.weapon_slots
            .iter()
            .filter(|slot| self.attachments[slot.attachment_id].alive)
            .map(|slot| self.effective_weapon_range(slot.attachment_id))
            .collect()
    }

    /// Applies the global range multiplier and an aircraft-mounted bonus
    /// (§6 constants: `GLOBAL_WEAPON_RANGE_MULTIPLIER`, `AIRCRAFT_RANGE_BONUS_MAX`).
    pub fn effective_weapon_range(&self, attachment_id: usize) -> f32 {
        let base = self.attachments[attachment_id].stats.range;
        let bonus = match self.unit_type {
            UnitKind::Air => 1.0 + crate::constants::AIRCRAFT_RANGE_BONUS_MAX,
            UnitKind::Ground => 1.0,
        };
        base * crate::constants::GLOBAL_WEAPON_RANGE_MULTIPLIER * bonus
    }
}

/// Validate and build a unit instance from `template` for `side`, spawned at
/// `pos`. Returns `None` (never panics) on any validation failure — per §7,
/// instantiation failure is never fatal, just a skipped spawn.
pub fn instantiate(
    template: &UnitTemplate,
    side: Side,
    pos: Vec2,
    id: u64,
    free_starter: bool,
) -> Option<UnitInstance> {
    let cells: Vec<CellState> = template
        .structure
        .iter()
        .map(|c| CellState {
            id: c.id,
            x: c.x,
            y: c.y,
            armor: c.material.armor,
            recover_per_second: c.material.recover_per_second,
            mass: c.material.mass,
            strain: 0.0,
            break_threshold: c.material.hp,
            destroyed: false,
            vibrate: 0.0,
        })
        .collect();
    if cells.is_empty() {
        return None;
    }

    let attachments: Vec<AttachmentState> = template
        .attachments
        .iter()
        .map(|a| AttachmentState { id: a.id, cell_id: a.cell_id, kind: a.kind, stats: a.stats, alive: true })
        .collect();

    let control_count = attachments.iter().filter(|a| a.alive && matches!(a.kind, ComponentKind::Control)).count();
    if control_count != 1 {
        return None;
    }

    let mass = recompute_mass(&cells);
    if mass < MIN_UNIT_MASS {
        return None;
    }

    if template.unit_type == UnitKind::Air {
        let lift = total_lift_accel(&attachments, mass);
        if lift < AIR_HOLD_GRAVITY {
            return None;
        }
    }

    let weapon_slots = build_weapon_slots(&attachments);
    let loaders = build_loaders(&attachments);

    let mut unit = UnitInstance {
        id,
        side,
        template_id: template.id.clone(),
        unit_type: template.unit_type,
        facing: if side == Side::Player { 1 } else { -1 },
        pos,
        vel: Vec2::ZERO,
        radius: template.radius,
        mass,
        max_speed: 0.0,
        accel: 0.0,
        turn_drag: 0.8,
        cells,
        attachments,
        weapon_slots,
        loaders,
        control_impair_factor: 1.0,
        control_impair_timer: 0.0,
        air_drop_active: false,
        ai_state: AiState::Engage,
        ai_state_timer: 0.0,
        ai_aim_correction_y: 0.0,
        ai_cycle_index: 0,
        deployment_gas_cost: if free_starter { 0 } else { template.gas_cost },
        free_starter,
        preferred_slot: None,
        fire_origin_target_id: None,
    };
    refresh_mobility(&mut unit);
    Some(unit)
}

fn recompute_mass(cells: &[CellState]) -> f32 {
    cells.iter().filter(|c| !c.destroyed).map(|c| c.mass).sum::<f32>().max(MIN_UNIT_MASS)
}

pub fn recalc_mass(unit: &mut UnitInstance) {
    unit.mass = recompute_mass(&unit.cells);
}

fn total_lift_accel(attachments: &[AttachmentState], mass: f32) -> f32 {
    attachments
        .iter()
        .filter(|a| a.alive && matches!(a.kind, ComponentKind::Engine { propulsion: Propulsion::Air }))
        .map(|a| {
            let cone_scale = (1.0 - a.stats.cone_deg / 180.0).max(0.0);
            (a.stats.power / mass) * AIR_THRUST_ACCEL_SCALE * cone_scale.max(0.05)
        })
        .sum()
}

fn build_weapon_slots(attachments: &[AttachmentState]) -> Vec<WeaponSlotState> {
    attachments
        .iter()
        .filter_map(|a| {
            if let ComponentKind::Weapon { class } = a.kind {
                let capacity = match class {
                    WeaponClass::Rapid | WeaponClass::Beam => 1,
                    WeaponClass::Heavy | WeaponClass::Explosive | WeaponClass::Tracking => {
                        loader_capacity_for(attachments, a.cell_id)
                    }
                };
                Some(WeaponSlotState {
                    attachment_id: a.id,
                    class,
                    cooldown: 0.0,
                    charges: capacity.max(1),
                    capacity: capacity.max(1),
                    burst_timer: 0.0,
                })
            } else {
                None
            }
        })
        .collect()
}

fn loader_capacity_for(attachments: &[AttachmentState], _weapon_cell_id: usize) -> u32 {
    // Σ (1 + storeCapacity) across every alive loader on the unit. The
    // source rule does not restrict loaders to the weapon's own cell; any
    // alive loader on the unit contributes, since loaders round-robin
    // across all heavy/explosive/tracking slots (§4.2).
    attachments
        .iter()
        .filter(|a| a.alive && matches!(a.kind, ComponentKind::Loader))
        .map(|a| 1 + a.stats.store_capacity)
        .sum()
}

fn build_loaders(attachments: &[AttachmentState]) -> Vec<LoaderState> {
    attachments
        .iter()
        .filter(|a| a.alive && matches!(a.kind, ComponentKind::Loader))
        .map(|a| LoaderState { attachment_id: a.id, timer: 0.0, target_slot: 0 })
        .collect()
}

/// Recompute `maxSpeed`, `accel`, and `turnDrag` from currently alive
/// engines (§4.2). Runs once per tick, after structure changes for the tick
/// have landed.
pub fn refresh_mobility(unit: &mut UnitInstance) {
    recalc_mass(unit);
    let ground_speed_scale = 74.0;
    let air_speed_scale = 82.0;

    let (total_power, weighted_cap, any_engine) = match unit.unit_type {
        UnitKind::Ground => engine_totals(unit, Propulsion::Ground),
        UnitKind::Air => engine_totals(unit, Propulsion::Air),
    };

    if !any_engine {
        unit.max_speed = 0.0;
        unit.accel = 0.0;
        return;
    }

    let scale = match unit.unit_type {
        UnitKind::Ground => ground_speed_scale,
        UnitKind::Air => air_speed_scale,
    };
    let raw_cap = (total_power / unit.mass) * scale;
    unit.max_speed = raw_cap.min(weighted_cap);
    unit.accel = (unit.max_speed * 1.6).max(0.0);
    let speed_ratio = if unit.max_speed > 0.0 { (unit.vel.length() / unit.max_speed).min(1.0) } else { 0.0 };
    unit.turn_drag = 0.8 + speed_ratio * 0.14;
}

fn engine_totals(unit: &UnitInstance, propulsion: Propulsion) -> (f32, f32, bool) {
    let mut total_power = 0.0;
    let mut weighted_cap_num = 0.0;
    let mut weighted_cap_den = 0.0;
    let mut any = false;
    for a in &unit.attachments {
        if a.alive {
            if let ComponentKind::Engine { propulsion: p } = a.kind {
                if p == propulsion {
                    any = true;
                    total_power += a.stats.power;
                    weighted_cap_num += a.stats.power * a.stats.speed_cap;
                    weighted_cap_den += a.stats.power;
                }
            }
        }
    }
    let weighted_cap = if weighted_cap_den > 0.0 { weighted_cap_num / weighted_cap_den } else { f32::MAX };
    (total_power, weighted_cap, any)
}

/// Air-lift feasibility check usable mid-battle (e.g. after engine loss) —
/// the executor calls this to decide whether to force `airDropActive`.
pub fn air_lift_ratio(unit: &UnitInstance) -> f32 {
    if unit.unit_type != UnitKind::Air {
        return f32::MAX;
    }
    total_lift_accel(&unit.attachments, unit.mass) / AIR_HOLD_GRAVITY
}

/// Structure recovery (§4.3): `strain = max(0, strain − recoverPerSecond × dt)`
/// for every non-destroyed cell, only while the unit remains operable.
pub fn apply_structure_recovery(unit: &mut UnitInstance, dt: f32) {
    if !unit.is_operable() {
        return;
    }
    for cell in &mut unit.cells {
        if !cell.destroyed {
            cell.strain = (cell.strain - cell.recover_per_second * dt).max(0.0);
            cell.vibrate = (cell.vibrate - dt * 2.0).max(0.0);
        }
    }
}

/// Destroy a structure cell: marks it destroyed, detaches every attachment
/// mapped to it, and with 30% probability triggers an ammo-cell chain
/// reaction adding 18 strain to every surviving cell (§4.3).
pub fn destroy_cell(unit: &mut UnitInstance, cell_id: usize, rng: &mut Rng) {
    if let Some(cell) = unit.cells.iter_mut().find(|c| c.id == cell_id) {
        if cell.destroyed {
            return;
        }
        cell.destroyed = true;
    } else {
        return;
    }
    detach_cell_attachments(unit, cell_id);

    let had_ammo = unit.attachments.iter().any(|a| a.cell_id == cell_id && matches!(a.kind, ComponentKind::Ammo));
    if had_ammo && rng.bool_with_prob(0.3) {
        for cell in unit.cells.iter_mut().filter(|c| !c.destroyed) {
            cell.strain += 18.0;
        }
    }
    recalc_mass(unit);
    refresh_mobility(unit);
}

/// Detach (kill) every attachment whose footprint is the given cell.
pub fn detach_cell_attachments(unit: &mut UnitInstance, cell_id: usize) {
    for a in unit.attachments.iter_mut().filter(|a| a.cell_id == cell_id) {
        a.alive = false;
    }
    unit.weapon_slots.retain(|slot| unit_attachment_alive(unit, slot.attachment_id));
    unit.loaders.retain(|loader| unit_attachment_alive(unit, loader.attachment_id));
}

fn unit_attachment_alive(unit: &UnitInstance, attachment_id: usize) -> bool {
    unit.attachments.iter().find(|a| a.id == attachment_id).map(|a| a.alive).unwrap_or(false)
}

/// With probability `min(0.75, 0.22 + damage/180)`, select a local
/// attachment overlapping `cell_id` and kill it with probability
/// `min(0.98, chance × clamp(1/max(0.35, hpMul), 1, 2.4))` (§4.3).
pub fn maybe_destroy_local_attachment(unit: &mut UnitInstance, cell_id: usize, damage: f32, rng: &mut Rng) {
    let select_chance = (0.22 + damage / 180.0).min(0.75);
    if !rng.bool_with_prob(select_chance as f64) {
        return;
    }
    let candidates: Vec<usize> =
        unit.attachments.iter().filter(|a| a.alive && a.cell_id == cell_id).map(|a| a.id).collect();
    if candidates.is_empty() {
        return;
    }
    let pick = candidates[rng.index(candidates.len())];
    let hp_mul = unit.attachments.iter().find(|a| a.id == pick).map(|a| a.stats.hp_mul).unwrap_or(1.0);
    let kill_mult = clamp(1.0 / hp_mul.max(0.35), 1.0, 2.4);
    let kill_chance = (select_chance * kill_mult).min(0.98);
    if rng.bool_with_prob(kill_chance as f64) {
        if let Some(a) = unit.attachments.iter_mut().find(|a| a.id == pick) {
            a.alive = false;
        }
        refresh_mobility(unit);
    }
}

pub fn stress_from_hit(damage: f32, armor: f32, impulse: f32) -> f32 {
    damage / armor.max(0.7) + impulse * IMPULSE_DAMAGE_STRESS_FACTOR
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::TemplateCatalog;

    #[test]
    fn instantiate_valid_ground_unit() {
        let cat = TemplateCatalog::defaults();
        let t = cat.get("rifleman").unwrap();
        let u = instantiate(t, Side::Player, Vec2::new(10.0, 10.0), 1, false).unwrap();
        assert!(u.has_alive_control());
        assert!(u.mass >= MIN_UNIT_MASS);
        assert_eq!(u.weapon_slots.len(), 1);
    }

    #[test]
    fn air_unit_with_sufficient_lift_instantiates() {
        let cat = TemplateCatalog::defaults();
        let t = cat.get("interceptor").unwrap();
        let u = instantiate(t, Side::Enemy, Vec2::new(0.0, 0.0), 2, false);
        assert!(u.is_some());
    }

    #[test]
    fn instantiate_rejects_missing_control() {
        let cat = TemplateCatalog::defaults();
        let mut t = cat.get("rifleman").unwrap().clone();
        t.attachments.retain(|a| !matches!(a.kind, ComponentKind::Control));
        assert!(instantiate(&t, Side::Player, Vec2::ZERO, 1, false).is_none());
    }

    #[test]
    fn destroy_cell_detaches_attachments_and_recomputes_mobility() {
        let cat = TemplateCatalog::defaults();
        let t = cat.get("rifleman").unwrap();
        let mut u = instantiate(t, Side::Player, Vec2::ZERO, 1, false).unwrap();
        let mut rng = Rng::new(5);
        let weapon_cell = u.attachments.iter().find(|a| matches!(a.kind, ComponentKind::Weapon { .. })).unwrap().cell_id;
        destroy_cell(&mut u, weapon_cell, &mut rng);
        assert!(!u.has_alive_weapon());
    }

    #[test]
    fn recovery_reduces_strain_only_when_operable() {
        let cat = TemplateCatalog::defaults();
        let t = cat.get("tank").unwrap();
        let mut u = instantiate(t, Side::Player, Vec2::ZERO, 1, false).unwrap();
        u.cells[0].strain = 10.0;
        apply_structure_recovery(&mut u, 1.0);
        assert!(u.cells[0].strain < 10.0);
    }
}
