//! Physics & damage (C3): impulse-to-velocity conversion and the per-hit
//! structural stress / recovery model.

use crate::domain::clamp;
use crate::rng::Rng;
use crate::unit::{destroy_cell, maybe_destroy_local_attachment, stress_from_hit, UnitInstance};

pub fn impulse_to_delta_v(impulse: f32, mass: f32) -> f32 {
    impulse / mass.max(1.0)
}

/// Select the cell a projectile impacted. `preferred` is the swept-AABB
/// winner if one was found; otherwise fall back to the leftmost/rightmost
/// alive cell, chosen by `impact_side = sign(projectile.vx)` (§4.3).
pub fn pick_impacted_cell(unit: &UnitInstance, preferred: Option<usize>, impact_side: f32) -> Option<usize> {
    if let Some(id) = preferred {
        if unit.cells.iter().any(|c| c.id == id && !c.destroyed) {
            return Some(id);
        }
    }
    let mut candidates: Vec<&crate::unit::CellState> = unit.cells.iter().filter(|c| !c.destroyed).collect();
    if candidates.is_empty() {
        return None;
    }
    // Tie-break sort order: (x asc, y asc, id asc); pick the extreme end in
    // the direction the projectile was travelling.
    candidates.sort_by(|a, b| (a.x, a.y, a.id).cmp(&(b.x, b.y, b.id)));
    if impact_side >= 0.0 {
        candidates.last().map(|c| c.id)
    } else {
        candidates.first().map(|c| c.id)
    }
}

/// Apply one projectile (or splash) hit to `unit` at `cell_id`. Returns
/// `true` if the hit destroyed the cell (and thus possibly the unit).
pub fn apply_hit(
    unit: &mut UnitInstance,
    cell_id: usize,
    damage: f32,
    impulse: f32,
    impact_side: f32,
    rng: &mut Rng,
) -> bool {
    let (armor, break_threshold) = match unit.cells.iter().find(|c| c.id == cell_id) {
        Some(c) if !c.destroyed => (c.armor, c.break_threshold),
        _ => return false,
    };

    let stress = stress_from_hit(damage, armor, impulse);
    let dv = impulse_to_delta_v(impulse, unit.mass);

    let mut destroyed_now = false;
    if let Some(cell) = unit.cells.iter_mut().find(|c| c.id == cell_id) {
        cell.strain += stress;
        cell.vibrate = (cell.vibrate + dv * 1.6).min(1.7);
        unit.vel.x += impact_side.signum() * dv;
        destroyed_now = cell.strain >= cell.break_threshold;
    }

    maybe_destroy_local_attachment(unit, cell_id, damage, rng);

    if destroyed_now {
        destroy_cell(unit, cell_id, rng);
    }
    destroyed_now
}

pub fn clamp_speed(v: f32, max: f32) -> f32 {
    clamp(v, -max, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Side, Vec2};
    use crate::templates::TemplateCatalog;
    use crate::unit::instantiate;

    #[test]
    fn impulse_to_delta_v_floors_mass_at_one() {
        assert_eq!(impulse_to_delta_v(10.0, 0.1), 10.0);
        assert_eq!(impulse_to_delta_v(10.0, 10.0), 1.0);
    }

    #[test]
    fn hit_adds_strain_and_can_destroy_cell() {
        let cat = TemplateCatalog::defaults();
        let t = cat.get("rifleman").unwrap();
        let mut u = instantiate(t, Side::Player, Vec2::ZERO, 1, false).unwrap();
        let mut rng = Rng::new(1);
        let cell_id = u.cells[0].id;
        let broke = apply_hit(&mut u, cell_id, 1000.0, 50.0, 1.0, &mut rng);
        assert!(broke);
        assert!(u.cells.iter().find(|c| c.id == cell_id).unwrap().destroyed);
    }

    #[test]
    fn small_hit_does_not_destroy() {
        let cat = TemplateCatalog::defaults();
        let t = cat.get("tank").unwrap();
        let mut u = instantiate(t, Side::Player, Vec2::ZERO, 1, false).unwrap();
        let mut rng = Rng::new(2);
        let cell_id = u.cells[0].id;
        let broke = apply_hit(&mut u, cell_id, 1.0, 1.0, 1.0, &mut rng);
        assert!(!broke);
    }
}
