//! Schema-typed parameter genetics (C10): default/random/mutate/crossover.
//!
//! Every generator here consumes an explicit [`crate::rng::Rng`] handle —
//! this is the training orchestrator's genetics stream, distinct from the
//! per-match simulation stream (C1). A schema is a small fixed vocabulary of
//! continuous, stepped-integer, and boolean knobs; see §3 for the field
//! semantics this mirrors exactly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{clamp, clamp_i64};
use crate::rng::Rng;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParamKind {
    Number { min: f64, max: f64, default: f64, sigma: f64 },
    Int { min: i64, max: i64, default: i64, step: i64, #[serde(rename = "mutateRate")] mutate_rate: f64 },
    Boolean { default: bool, #[serde(rename = "mutateRate")] mutate_rate: f64 },
}

pub type ParamSchema = BTreeMap<String, ParamKind>;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Int(i64),
    Boolean(bool),
}

impl ParamValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            ParamValue::Number(n) => n,
            ParamValue::Int(i) => i as f64,
            ParamValue::Boolean(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    pub fn as_i64(&self) -> i64 {
        match *self {
            ParamValue::Int(i) => i,
            ParamValue::Number(n) => n.round() as i64,
            ParamValue::Boolean(b) => i64::from(b),
        }
    }

    pub fn as_bool(&self) -> bool {
        match *self {
            ParamValue::Boolean(b) => b,
            ParamValue::Number(n) => n != 0.0,
            ParamValue::Int(i) => i != 0,
        }
    }
}

pub type Params = BTreeMap<String, ParamValue>;

/// `defaultParams(S)`.
pub fn default_params(schema: &ParamSchema) -> Params {
    schema
        .iter()
        .map(|(k, kind)| {
            let v = match kind {
                ParamKind::Number { default, .. } => ParamValue::Number(*default),
                ParamKind::Int { default, .. } => ParamValue::Int(*default),
                ParamKind::Boolean { default, .. } => ParamValue::Boolean(*default),
            };
            (k.clone(), v)
        })
        .collect()
}

/// `randomParams(S)`.
pub fn random_params(schema: &ParamSchema, rng: &mut Rng) -> Params {
    schema
        .iter()
        .map(|(k, kind)| {
            let v = match kind {
                ParamKind::Number { min, max, .. } => {
                    ParamValue::Number(rng.range_f32(*min as f32, *max as f32) as f64)
                }
                ParamKind::Int { min, max, step, .. } => {
                    ParamValue::Int(random_int_on_grid(rng, *min, *max, *step))
                }
                ParamKind::Boolean { default, .. } => {
                    // Independent default/flipped sampling: a fair coin
                    // decides whether we keep the declared default or its
                    // flip, per §4.10.
                    if rng.bool_with_prob(0.5) {
                        ParamValue::Boolean(*default)
                    } else {
                        ParamValue::Boolean(!*default)
                    }
                }
            };
            (k.clone(), v)
        })
        .collect()
}

fn random_int_on_grid(rng: &mut Rng, min: i64, max: i64, step: i64) -> i64 {
    let step = step.max(1);
    let steps = ((max - min) / step).max(0);
    let pick = rng.range_i64(0, steps);
    clamp_i64(min + pick * step, min, max)
}

/// `mutate(S, p)`: Gaussian perturbation for numbers, `±step` snap for ints,
/// flip for booleans, each gated by its own per-key rate/sigma and clamped
/// to the declared bounds afterward.
pub fn mutate(schema: &ParamSchema, params: &Params, rng: &mut Rng) -> Params {
    let mut out = params.clone();
    for (k, kind) in schema {
        let entry = out.entry(k.clone()).or_insert_with(|| default_for(kind));
        match kind {
            ParamKind::Number { min, max, sigma, .. } => {
                let cur = entry.as_f64() as f32;
                let mutated = cur + rng.gaussian() * (*sigma as f32);
                *entry = ParamValue::Number(clamp(mutated, *min as f32, *max as f32) as f64);
            }
            ParamKind::Int { min, max, step, mutate_rate, .. } => {
                if rng.bool_with_prob(*mutate_rate) {
                    let cur = entry.as_i64();
                    let dir = if rng.bool_with_prob(0.5) { *step } else { -*step };
                    *entry = ParamValue::Int(clamp_i64(cur + dir, *min, *max));
                }
            }
            ParamKind::Boolean { mutate_rate, .. } => {
                if rng.bool_with_prob(*mutate_rate) {
                    let cur = entry.as_bool();
                    *entry = ParamValue::Boolean(!cur);
                }
            }
        }
    }
    out
}

fn default_for(kind: &ParamKind) -> ParamValue {
    match kind {
        ParamKind::Number { default, .. } => ParamValue::Number(*default),
        ParamKind::Int { default, .. } => ParamValue::Int(*default),
        ParamKind::Boolean { default, .. } => ParamValue::Boolean(*default),
    }
}

/// `crossover(a, b)`: uniform 50/50 pick per key across the union of both
/// parents' keys. Does not consult a schema — callers must clamp the result
/// with [`clamp_to_schema`] afterward (§4.11's "post-op clamp" rule).
pub fn crossover(a: &Params, b: &Params, rng: &mut Rng) -> Params {
    let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
    keys.sort();
    keys.dedup();
    let mut out = Params::new();
    for k in keys {
        let pick = if rng.bool_with_prob(0.5) { a.get(k).or_else(|| b.get(k)) } else { b.get(k).or_else(|| a.get(k)) };
        if let Some(v) = pick {
            out.insert(k.clone(), *v);
        }
    }
    out
}

/// Re-clamp every value in `params` to its schema bounds, snapping ints back
/// onto their step grid and leaving booleans untouched. Used after
/// [`crossover`] and as a defensive pass after [`mutate`].
pub fn clamp_to_schema(schema: &ParamSchema, params: &Params) -> Params {
    schema
        .iter()
        .map(|(k, kind)| {
            let v = params.get(k).copied().unwrap_or_else(|| default_for(kind));
            let clamped = match kind {
                ParamKind::Number { min, max, .. } => {
                    ParamValue::Number(clamp(v.as_f64() as f32, *min as f32, *max as f32) as f64)
                }
                ParamKind::Int { min, max, step, .. } => {
                    let snapped = snap_to_grid(v.as_i64(), *min, *step);
                    ParamValue::Int(clamp_i64(snapped, *min, *max))
                }
                ParamKind::Boolean { .. } => ParamValue::Boolean(v.as_bool()),
            };
            (k.clone(), clamped)
        })
        .collect()
}

fn snap_to_grid(value: i64, min: i64, step: i64) -> i64 {
    let step = step.max(1);
    let offset = value - min;
    min + (offset as f64 / step as f64).round() as i64 * step
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> ParamSchema {
        let mut s = ParamSchema::new();
        s.insert(
            "aggression".to_string(),
            ParamKind::Number { min: 0.0, max: 1.0, default: 0.5, sigma: 0.2 },
        );
        s.insert(
            "strategy".to_string(),
            ParamKind::Int { min: 0, max: 3, default: 1, step: 1, mutate_rate: 0.3 },
        );
        s.insert(
            "aggressive".to_string(),
            ParamKind::Boolean { default: false, mutate_rate: 0.3 },
        );
        s
    }

    #[test]
    fn default_params_matches_schema_defaults() {
        let s = sample_schema();
        let p = default_params(&s);
        assert_eq!(p["aggression"].as_f64(), 0.5);
        assert_eq!(p["strategy"].as_i64(), 1);
        assert_eq!(p["aggressive"].as_bool(), false);
    }

    #[test]
    fn random_params_respect_bounds() {
        let s = sample_schema();
        let mut rng = Rng::new(1);
        for _ in 0..200 {
            let p = random_params(&s, &mut rng);
            assert!((0.0..=1.0).contains(&p["aggression"].as_f64()));
            assert!((0..=3).contains(&p["strategy"].as_i64()));
        }
    }

    #[test]
    fn mutate_keeps_bounds_and_grid() {
        let s = sample_schema();
        let mut rng = Rng::new(77);
        let mut p = default_params(&s);
        for _ in 0..500 {
            p = mutate(&s, &p, &mut rng);
            assert!((0.0..=1.0).contains(&p["aggression"].as_f64()));
            let strat = p["strategy"].as_i64();
            assert!((0..=3).contains(&strat));
        }
    }

    #[test]
    fn crossover_picks_from_either_parent_and_clamp_restores_grid() {
        let s = sample_schema();
        let mut rng = Rng::new(3);
        let a = random_params(&s, &mut rng);
        let b = random_params(&s, &mut rng);
        for _ in 0..100 {
            let child = crossover(&a, &b, &mut rng);
            let clamped = clamp_to_schema(&s, &child);
            assert!((0.0..=1.0).contains(&clamped["aggression"].as_f64()));
            assert!((0..=3).contains(&clamped["strategy"].as_i64()));
        }
    }

    #[test]
    fn boolean_mutate_rate_zero_never_flips() {
        let mut s = ParamSchema::new();
        s.insert("flag".to_string(), ParamKind::Boolean { default: true, mutate_rate: 0.0 });
        let mut rng = Rng::new(9);
        let mut p = default_params(&s);
        for _ in 0..50 {
            p = mutate(&s, &p, &mut rng);
            assert_eq!(p["flag"].as_bool(), true);
        }
    }
}

#[cfg(test)]
mod proptests {
    //! Bounds-preservation as a "for all schemas/seeds" property (§8.1),
    //! rather than the handful of fixed examples above.

    use proptest::prelude::*;

    use super::*;

    fn number_schema(min: f64, span: f64, default_frac: f64, sigma: f64) -> ParamSchema {
        let max = min + span.max(1e-3);
        let default = min + (max - min) * default_frac;
        let mut s = ParamSchema::new();
        s.insert("n".to_string(), ParamKind::Number { min, max, default, sigma });
        s
    }

    proptest! {
        #[test]
        fn mutate_never_leaves_the_declared_number_bounds(
            min in -100.0f64..100.0,
            span in 0.1f64..200.0,
            default_frac in 0.0f64..1.0,
            sigma in 0.0f64..20.0,
            seed in any::<u32>(),
            steps in 1usize..40,
        ) {
            let schema = number_schema(min, span, default_frac, sigma);
            let mut rng = Rng::new(seed);
            let mut params = default_params(&schema);
            for _ in 0..steps {
                params = mutate(&schema, &params, &mut rng);
                let v = params["n"].as_f64();
                prop_assert!(v >= min - 1e-6 && v <= min + span.max(1e-3) + 1e-6);
            }
        }

        #[test]
        fn crossover_then_clamp_never_leaves_the_declared_number_bounds(
            min in -100.0f64..100.0,
            span in 0.1f64..200.0,
            default_frac in 0.0f64..1.0,
            sigma in 0.0f64..20.0,
            seed in any::<u32>(),
        ) {
            let schema = number_schema(min, span, default_frac, sigma);
            let mut rng = Rng::new(seed);
            let a = random_params(&schema, &mut rng);
            let b = random_params(&schema, &mut rng);
            let child = clamp_to_schema(&schema, &crossover(&a, &b, &mut rng));
            let v = child["n"].as_f64();
            prop_assert!(v >= min - 1e-6 && v <= min + span.max(1e-3) + 1e-6);
        }

        #[test]
        fn mutated_ints_never_leave_their_declared_bounds(
            min in -50i64..50,
            span in 1i64..50,
            step in 1i64..5,
            seed in any::<u32>(),
            steps in 1usize..30,
        ) {
            let max = min + span;
            let mut schema = ParamSchema::new();
            schema.insert("i".to_string(), ParamKind::Int { min, max, default: min, step, mutate_rate: 0.9 });
            let mut rng = Rng::new(seed);
            let mut params = default_params(&schema);
            for _ in 0..steps {
                params = mutate(&schema, &params, &mut rng);
                let v = params["i"].as_i64();
                prop_assert!(v >= min && v <= max);
            }
        }
    }
}
