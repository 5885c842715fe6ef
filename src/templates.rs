//! Unit template catalog (C2): structure cells, attachments, and the fixed
//! starter roster the Match Runner (C7) draws symmetric starters from.
//!
//! Templates are read-only after load (§5 shared resources); a
//! [`TemplateCatalog`] is built once per match from [`TemplateCatalog::defaults`]
//! merged with any caller-supplied overrides and then never mutated again.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Ground,
    Air,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Propulsion {
    Ground,
    Air,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeaponClass {
    Rapid,
    Heavy,
    Explosive,
    Tracking,
    Beam,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ComponentKind {
    Control,
    Engine { propulsion: Propulsion },
    Weapon { class: WeaponClass },
    Loader,
    Ammo,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct MaterialSpec {
    pub armor: f32,
    pub hp: f32,
    pub recover_per_second: f32,
    pub mass: f32,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct StructureCellTemplate {
    pub id: usize,
    pub x: i32,
    pub y: i32,
    pub material: MaterialSpec,
}

/// Stat bag for one attachment. Not every field applies to every
/// [`ComponentKind`] — weapon fields are read by the shoot module and
/// projectile spawner, loader fields by the C2 charge model, engine fields
/// by mobility recompute.
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
pub struct AttachmentStats {
    // Weapon stats.
    pub damage: f32,
    pub cooldown: f32,
    pub range: f32,
    pub muzzle_speed: f32,
    pub gravity: f32,
    pub recoil: f32,
    pub shoot_angle_deg: f32,
    pub explosive_radius: f32,
    pub explosive_falloff_power: f32,
    pub explosive_fuse_timed: bool,
    pub explosive_fuse_time: f32,
    pub homing_turn_rate_deg_per_sec: f32,
    pub control_impair_factor: f32,
    pub control_impair_duration: f32,
    // Loader stats.
    pub min_load_time: f32,
    pub load_multiplier: f32,
    pub fast_operation: bool,
    pub store_capacity: u32,
    // Engine stats.
    pub power: f32,
    pub speed_cap: f32,
    pub cone_deg: f32,
    // Attachment fragility.
    pub hp_mul: f32,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct AttachmentTemplate {
    pub id: usize,
    pub cell_id: usize,
    pub kind: ComponentKind,
    pub stats: AttachmentStats,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnitTemplate {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub unit_type: UnitKind,
    pub gas_cost: u32,
    pub structure: Vec<StructureCellTemplate>,
    pub attachments: Vec<AttachmentTemplate>,
    pub radius: f32,
}

#[derive(Clone, Debug)]
pub struct TemplateCatalog {
    templates: HashMap<String, UnitTemplate>,
    /// Deployment preference order consulted by mirrored-random spawn and
    /// the Match Runner's starter roster (§4.7 step 4, §4.6 spawn policy).
    roster: Vec<String>,
}

impl TemplateCatalog {
    /// The fixed default roster: two ground units (a rapid-fire rifleman
    /// and a heavy-cannon tank), a rocket artillery piece with an explosive,
    /// timed-fuse warhead, and two air units (an interceptor with a rapid
    /// gun, a bomber with homing explosive ordnance).
    pub fn defaults() -> Self {
        let mut templates = HashMap::new();
        for t in [rifleman(), tank(), artillery(), interceptor(), bomber()] {
            templates.insert(t.id.clone(), t);
        }
        let roster = vec![
            "rifleman".to_string(),
            "tank".to_string(),
            "artillery".to_string(),
            "interceptor".to_string(),
            "bomber".to_string(),
        ];
        TemplateCatalog { templates, roster }
    }

    /// Merge caller-supplied template overrides on top of the defaults,
    /// replacing any template with the same id and appending new ids to the
    /// roster.
    pub fn merge_overrides(&mut self, overrides: Vec<UnitTemplate>) {
        for t in overrides {
            if !self.roster.contains(&t.id) {
                self.roster.push(t.id.clone());
            }
            self.templates.insert(t.id.clone(), t);
        }
    }

    /// Restrict the catalog (and roster order) to exactly the named
    /// templates, preserving the order requested. Used when a `MatchSpec`
    /// supplies `templateNames`.
    pub fn restrict_to(&mut self, names: &[String]) {
        self.roster = names.to_vec();
        self.templates.retain(|id, _| names.contains(id));
    }

    pub fn get(&self, id: &str) -> Option<&UnitTemplate> {
        self.templates.get(id)
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }
}

fn cell(id: usize, x: i32, y: i32, armor: f32, hp: f32, recover: f32, mass: f32) -> StructureCellTemplate {
    StructureCellTemplate { id, x, y, material: MaterialSpec { armor, hp, recover_per_second: recover, mass } }
}

fn rifleman() -> UnitTemplate {
    UnitTemplate {
        id: "rifleman".to_string(),
        name: "Rifleman".to_string(),
        unit_type: UnitKind::Ground,
        gas_cost: 40,
        radius: 10.0,
        structure: vec![
            cell(0, 0, 0, 0.9, 40.0, 1.5, 18.0),
            cell(1, 0, 1, 0.8, 30.0, 1.5, 10.0),
        ],
        attachments: vec![
            AttachmentTemplate { id: 0, cell_id: 0, kind: ComponentKind::Control, stats: AttachmentStats::default() },
            AttachmentTemplate {
                id: 1,
                cell_id: 0,
                kind: ComponentKind::Engine { propulsion: Propulsion::Ground },
                stats: AttachmentStats { power: 28.0, speed_cap: 74.0, hp_mul: 1.0, ..Default::default() },
            },
            AttachmentTemplate {
                id: 2,
                cell_id: 1,
                kind: ComponentKind::Weapon { class: WeaponClass::Rapid },
                stats: AttachmentStats {
                    damage: 6.0,
                    cooldown: 0.35,
                    range: 220.0,
                    muzzle_speed: 260.0,
                    gravity: 0.0,
                    recoil: 2.0,
                    shoot_angle_deg: 30.0,
                    hp_mul: 1.0,
                    ..Default::default()
                },
            },
        ],
    }
}

fn tank() -> UnitTemplate {
    UnitTemplate {
        id: "tank".to_string(),
        name: "Tank".to_string(),
        unit_type: UnitKind::Ground,
        gas_cost: 110,
        radius: 18.0,
        structure: vec![
            cell(0, 0, 0, 1.6, 90.0, 1.2, 40.0),
            cell(1, -1, 0, 1.4, 60.0, 1.2, 26.0),
            cell(2, 1, 0, 1.4, 60.0, 1.2, 26.0),
            cell(3, 0, -1, 1.5, 70.0, 1.2, 28.0),
        ],
        attachments: vec![
            AttachmentTemplate { id: 0, cell_id: 0, kind: ComponentKind::Control, stats: AttachmentStats::default() },
            AttachmentTemplate {
                id: 1,
                cell_id: 0,
                kind: ComponentKind::Engine { propulsion: Propulsion::Ground },
                stats: AttachmentStats { power: 70.0, speed_cap: 46.0, hp_mul: 1.0, ..Default::default() },
            },
            AttachmentTemplate {
                id: 2,
                cell_id: 3,
                kind: ComponentKind::Weapon { class: WeaponClass::Heavy },
                stats: AttachmentStats {
                    damage: 42.0,
                    cooldown: 1.8,
                    range: 340.0,
                    muzzle_speed: 260.0,
                    gravity: 20.0,
                    recoil: 18.0,
                    shoot_angle_deg: 18.0,
                    hp_mul: 0.7,
                    ..Default::default()
                },
            },
            AttachmentTemplate {
                id: 3,
                cell_id: 1,
                kind: ComponentKind::Loader,
                stats: AttachmentStats { min_load_time: 0.6, load_multiplier: 0.9, store_capacity: 1, hp_mul: 1.0, ..Default::default() },
            },
            AttachmentTemplate {
                id: 4,
                cell_id: 2,
                kind: ComponentKind::Ammo,
                stats: AttachmentStats { hp_mul: 1.0, ..Default::default() },
            },
        ],
    }
}

fn artillery() -> UnitTemplate {
    UnitTemplate {
        id: "artillery".to_string(),
        name: "Artillery".to_string(),
        unit_type: UnitKind::Ground,
        gas_cost: 140,
        radius: 16.0,
        structure: vec![
            cell(0, 0, 0, 1.1, 60.0, 1.2, 32.0),
            cell(1, 0, -1, 1.0, 40.0, 1.2, 20.0),
        ],
        attachments: vec![
            AttachmentTemplate { id: 0, cell_id: 0, kind: ComponentKind::Control, stats: AttachmentStats::default() },
            AttachmentTemplate {
                id: 1,
                cell_id: 0,
                kind: ComponentKind::Engine { propulsion: Propulsion::Ground },
                stats: AttachmentStats { power: 36.0, speed_cap: 34.0, hp_mul: 1.0, ..Default::default() },
            },
            AttachmentTemplate {
                id: 2,
                cell_id: 1,
                kind: ComponentKind::Weapon { class: WeaponClass::Explosive },
                stats: AttachmentStats {
                    damage: 55.0,
                    cooldown: 2.6,
                    range: 420.0,
                    muzzle_speed: 220.0,
                    gravity: 140.0,
                    recoil: 24.0,
                    shoot_angle_deg: 14.0,
                    explosive_radius: 70.0,
                    explosive_falloff_power: 1.6,
                    explosive_fuse_timed: true,
                    explosive_fuse_time: 2.2,
                    hp_mul: 0.8,
                    ..Default::default()
                },
            },
            AttachmentTemplate {
                id: 3,
                cell_id: 0,
                kind: ComponentKind::Loader,
                stats: AttachmentStats { min_load_time: 1.1, load_multiplier: 1.0, store_capacity: 1, hp_mul: 1.0, ..Default::default() },
            },
        ],
    }
}

fn interceptor() -> UnitTemplate {
    UnitTemplate {
        id: "interceptor".to_string(),
        name: "Interceptor".to_string(),
        unit_type: UnitKind::Air,
        gas_cost: 130,
        radius: 14.0,
        structure: vec![
            cell(0, 0, 0, 0.7, 50.0, 1.5, 16.0),
            cell(1, 0, 1, 0.6, 30.0, 1.5, 10.0),
        ],
        attachments: vec![
            AttachmentTemplate { id: 0, cell_id: 0, kind: ComponentKind::Control, stats: AttachmentStats::default() },
            AttachmentTemplate {
                id: 1,
                cell_id: 0,
                kind: ComponentKind::Engine { propulsion: Propulsion::Air },
                stats: AttachmentStats { power: 30.0, speed_cap: 96.0, cone_deg: 0.0, hp_mul: 1.0, ..Default::default() },
            },
            AttachmentTemplate {
                id: 2,
                cell_id: 1,
                kind: ComponentKind::Weapon { class: WeaponClass::Rapid },
                stats: AttachmentStats {
                    damage: 8.0,
                    cooldown: 0.3,
                    range: 240.0,
                    muzzle_speed: 260.0,
                    gravity: 0.0,
                    recoil: 1.5,
                    shoot_angle_deg: 26.0,
                    hp_mul: 1.0,
                    ..Default::default()
                },
            },
        ],
    }
}

fn bomber() -> UnitTemplate {
    UnitTemplate {
        id: "bomber".to_string(),
        name: "Bomber".to_string(),
        unit_type: UnitKind::Air,
        gas_cost: 170,
        radius: 18.0,
        structure: vec![
            cell(0, 0, 0, 1.0, 70.0, 1.4, 28.0),
            cell(1, 0, 1, 0.9, 40.0, 1.4, 16.0),
        ],
        attachments: vec![
            AttachmentTemplate { id: 0, cell_id: 0, kind: ComponentKind::Control, stats: AttachmentStats::default() },
            AttachmentTemplate {
                id: 1,
                cell_id: 0,
                kind: ComponentKind::Engine { propulsion: Propulsion::Air },
                stats: AttachmentStats { power: 46.0, speed_cap: 58.0, cone_deg: 0.0, hp_mul: 1.0, ..Default::default() },
            },
            AttachmentTemplate {
                id: 2,
                cell_id: 1,
                kind: ComponentKind::Weapon { class: WeaponClass::Tracking },
                stats: AttachmentStats {
                    damage: 30.0,
                    cooldown: 1.6,
                    range: 300.0,
                    muzzle_speed: 200.0,
                    gravity: 40.0,
                    recoil: 8.0,
                    shoot_angle_deg: 24.0,
                    explosive_radius: 50.0,
                    explosive_falloff_power: 1.4,
                    homing_turn_rate_deg_per_sec: 160.0,
                    hp_mul: 0.9,
                    ..Default::default()
                },
            },
            AttachmentTemplate {
                id: 3,
                cell_id: 0,
                kind: ComponentKind::Loader,
                stats: AttachmentStats { min_load_time: 0.7, load_multiplier: 1.0, store_capacity: 2, hp_mul: 1.0, ..Default::default() },
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_the_fixed_roster() {
        let cat = TemplateCatalog::defaults();
        for id in ["rifleman", "tank", "artillery", "interceptor", "bomber"] {
            assert!(cat.get(id).is_some(), "missing template {id}");
        }
        assert_eq!(cat.roster().len(), 5);
    }

    #[test]
    fn every_template_has_exactly_one_control_attachment() {
        let cat = TemplateCatalog::defaults();
        for id in cat.roster() {
            let t = cat.get(id).unwrap();
            let controls = t.attachments.iter().filter(|a| matches!(a.kind, ComponentKind::Control)).count();
            assert_eq!(controls, 1, "template {id} must have exactly one control");
        }
    }

    #[test]
    fn merge_overrides_replaces_and_appends() {
        let mut cat = TemplateCatalog::defaults();
        let mut custom = rifleman();
        custom.id = "rifleman".to_string();
        custom.gas_cost = 999;
        let mut brand_new = rifleman();
        brand_new.id = "custom-unit".to_string();
        cat.merge_overrides(vec![custom, brand_new]);
        assert_eq!(cat.get("rifleman").unwrap().gas_cost, 999);
        assert!(cat.get("custom-unit").is_some());
        assert!(cat.roster().iter().any(|r| r == "custom-unit"));
    }
}
