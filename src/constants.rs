//! Named tuning constants required for cross-implementation parity (§6).
//!
//! These are grouped here, rather than scattered through the modules that
//! consume them, so that a parity audit against another implementation of
//! this simulator has one place to diff against.

/// Minimum upward acceleration an air unit's engines must sustain to stay
/// aloft; see [`crate::domain::unit::instantiate`].
pub const AIR_HOLD_GRAVITY: f32 = 0.42;
/// Downward acceleration applied to an air unit once it enters airdrop mode.
pub const AIR_DROP_GRAVITY: f32 = 0.9;
/// Horizontal speed cap while in airdrop mode (overrides the unit's normal cap).
pub const AIR_DROP_SPEED_CAP: f32 = 3.4;
/// Scales raw `power/mass` into an acceleration figure for air engines.
pub const AIR_THRUST_ACCEL_SCALE: f32 = 1.65;
/// Minimum forward speed below which an air unit's lift cone stops counting
/// toward hold-altitude acceleration.
pub const AIR_MIN_LIFT_SPEED: f32 = 0.15;

/// Global multiplier applied to every weapon's declared range.
pub const GLOBAL_WEAPON_RANGE_MULTIPLIER: f32 = 1.5;
/// Maximum extra range fraction granted to aircraft-mounted weapons.
pub const AIRCRAFT_RANGE_BONUS_MAX: f32 = 1.0;
/// Baseline projectile muzzle speed (units/second) absent a weapon override.
pub const PROJECTILE_SPEED: f32 = 260.0;
/// Baseline projectile gravity (units/second^2) absent a weapon override.
pub const PROJECTILE_GRAVITY: f32 = 95.0;
/// Vertical tolerance, in world units, for a ground-based shooter to
/// consider a non-air target "on axis".
pub const GROUND_FIRE_Y_TOLERANCE: f32 = 92.0;

/// Step size (world units/second) for the AI's self-correcting vertical aim bias.
pub const AI_GRAVITY_CORRECTION_STEP: f32 = 10.0;
/// Clamp bound for the accumulated vertical aim correction.
pub const AI_GRAVITY_CORRECTION_CLAMP: f32 = 120.0;
/// Vertical miss distance beyond which the aim-correction feedback engages.
pub const AI_MISS_VERTICAL_TOLERANCE: f32 = 8.0;

/// Fraction of a unit's deployment gas cost refunded into "on-field gas value".
pub const BATTLE_SALVAGE_REFUND_FACTOR: f32 = 0.6;
/// Scales raw hit impulse into additional structural strain.
pub const IMPULSE_DAMAGE_STRESS_FACTOR: f32 = 0.015;
/// How far (world units) a ground-sourced projectile may drop below its
/// firing origin before it is forced to detonate or die.
pub const GROUND_PROJECTILE_MAX_DROP_BELOW_FIRE_Y: f32 = 600.0;

/// Default battlefield width, in world units.
pub const DEFAULT_BATTLEFIELD_WIDTH: f32 = 2000.0;
/// Default battlefield height, in world units.
pub const DEFAULT_BATTLEFIELD_HEIGHT: f32 = 1000.0;
/// Default ground line, as a fraction of battlefield height from the top.
pub const DEFAULT_GROUND_HEIGHT_RATIO: f32 = 0.5;

/// Fixed fallback stride added to a training phase's `seed0` per opponent
/// seed slot (see the Training Orchestrator, C11).
pub const TRAINING_SEED_STRIDE: u32 = 9973;
/// XOR mask deriving the spawn-decision PRNG stream from the match seed.
pub const SPAWN_PRNG_XOR: u32 = 0x2F7A1D;

/// Fixed simulation tick length, in seconds (60 Hz).
pub const TICK_DT: f32 = 1.0 / 60.0;
/// Ticks per simulated second, as an integer for loop bounds.
pub const TICKS_PER_SECOND: u32 = 60;

/// Minimum total mass a unit instance may have; instantiation fails below this.
pub const MIN_UNIT_MASS: f32 = 14.0;

/// World-space x bounds a unit is clamped to each tick: `[44, W-44]`.
pub const LANE_MARGIN: f32 = 44.0;
/// Inclusive low/high bounds for a mirrored-random spawn's y coordinate.
pub const SPAWN_Y_MIN: f32 = 220.0;
pub const SPAWN_Y_MAX: f32 = 480.0;

/// Splash damage below this fraction of max damage is ignored entirely.
pub const EXPLOSIVE_SPLASH_MIN: f32 = 0.25;
/// Splash impulse is reduced to this fraction of a direct hit's impulse.
pub const EXPLOSIVE_IMPULSE_SCALE: f32 = 0.45;
/// Splash control-impair duration/factor is reduced to this fraction.
pub const EXPLOSIVE_CONTROL_IMPAIR_SCALE: f32 = 0.8;
/// Fraction of a weapon's declared damage applied to an undefended base.
pub const BASE_DAMAGE_FACTOR: f32 = 0.5;

/// Spawn-interval clamp bounds for `ai` spawn mode (§4.7 step 5).
pub const AI_SPAWN_INTERVAL_MIN: f32 = 0.5;
pub const AI_SPAWN_INTERVAL_MAX: f32 = 6.0;
