//! Confidence-decay engine (§4.G)
//!
//! Pure functions of `(importance, age, config)`; callers always supply
//! `now` so results are reproducible in tests and across replicas.

use crate::memory::{DecayFunction, Memory};

/// Global fallback config; individual memories may override any field
/// (`Memory::decay_rate`, `last_refreshed_at`, `confidence_floor`,
/// `decay_function`).
#[derive(Debug, Clone)]
pub struct DecayConfig {
    pub function: DecayFunction,
    /// Seconds; used by the exponential function as `halfLife`.
    pub half_life_secs: i64,
    /// Seconds; used by the linear function as `fullDecay`.
    pub full_decay_secs: i64,
    pub floor: f32,
    /// Thresholds for the step function, `(ageSecs, score)` ascending by age.
    pub step_thresholds: Vec<(i64, f32)>,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            function: DecayFunction::Exponential,
            half_life_secs: 30 * 86_400,
            full_decay_secs: 180 * 86_400,
            floor: 0.1,
            step_thresholds: vec![(7 * 86_400, 1.0), (30 * 86_400, 0.7), (90 * 86_400, 0.4)],
        }
    }
}

/// The result of computing or refreshing a memory's effective confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayResult {
    pub effective_confidence: f32,
    pub age_secs: i64,
    pub pinned: bool,
}

fn step_score(age_secs: i64, thresholds: &[(i64, f32)]) -> f32 {
    let mut score = 1.0;
    for (threshold_age, threshold_score) in thresholds {
        if age_secs >= *threshold_age {
            score = *threshold_score;
        }
    }
    score
}

/// Computes the decay function's multiplier in `[0,1]` for one of the
/// three non-identity functions (§4.F and §4.G share the step table shape).
fn decay_multiplier(function: DecayFunction, age_secs: i64, half_life_secs: i64, full_decay_secs: i64, steps: &[(i64, f32)]) -> f32 {
    match function {
        DecayFunction::Exponential => {
            if half_life_secs <= 0 {
                return 1.0;
            }
            0.5_f32.powf(age_secs as f32 / half_life_secs as f32)
        }
        DecayFunction::Linear => {
            if full_decay_secs <= 0 {
                return 1.0;
            }
            (1.0 - age_secs as f32 / full_decay_secs as f32).max(0.0)
        }
        DecayFunction::Step => step_score(age_secs, steps),
        DecayFunction::None => 1.0,
    }
}

/// Computes a memory's effective confidence at `now` (unix seconds),
/// applying per-memory overrides with a fallback to `config`.
pub fn effective_confidence(memory: &Memory, config: &DecayConfig, now: i64) -> DecayResult {
    if memory.is_pinned() {
        return DecayResult {
            effective_confidence: memory.importance,
            age_secs: 0,
            pinned: true,
        };
    }

    let function = memory.decay_function.unwrap_or(config.function);
    let floor = memory.confidence_floor.unwrap_or(config.floor);
    let anchor = memory.anchor_timestamp();
    let age_secs = (now - anchor).max(0);

    // A per-memory `decayRate` overrides the half-life/full-decay timescale
    // directly: a higher rate shortens the effective half-life/full-decay.
    let (half_life, full_decay) = match memory.decay_rate {
        Some(rate) if rate > 0.0 => (
            (config.half_life_secs as f32 / rate) as i64,
            (config.full_decay_secs as f32 / rate) as i64,
        ),
        _ => (config.half_life_secs, config.full_decay_secs),
    };

    let multiplier = decay_multiplier(function, age_secs, half_life, full_decay, &config.step_thresholds);
    let decayed = memory.importance * multiplier;

    DecayResult {
        effective_confidence: decayed.max(floor),
        age_secs,
        pinned: false,
    }
}

/// A refresh resets the decay anchor and optionally bumps importance,
/// returning the before/after effective confidence (§4.G).
#[derive(Debug, Clone, Copy)]
pub struct RefreshResult {
    pub before: f32,
    pub after: f32,
}

/// Applies a refresh to `memory` in place: sets `last_refreshed_at = now`
/// and, if `new_importance` is given, replaces `importance`.
pub fn refresh(memory: &mut Memory, config: &DecayConfig, now: i64, new_importance: Option<f32>) -> RefreshResult {
    let before = effective_confidence(memory, config, now).effective_confidence;
    memory.last_refreshed_at = Some(now);
    if let Some(importance) = new_importance {
        memory.importance = importance.clamp(0.0, 1.0);
    }
    let after = effective_confidence(memory, config, now).effective_confidence;
    RefreshResult { before, after }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn memory(importance: f32, created_at: i64, accessed_at: i64) -> Memory {
        Memory {
            id: "m1".into(),
            memory_type: crate::memory::MemoryType::Note,
            title: "t".into(),
            content: "c".into(),
            summary: None,
            importance,
            tags: BTreeSet::new(),
            related_files: vec![],
            git_commit: None,
            source_pr: None,
            experts: BTreeSet::new(),
            created_at,
            accessed_at,
            access_count: 0,
            needs_review: false,
            vector_id: None,
            decay_rate: None,
            last_refreshed_at: None,
            confidence_floor: None,
            decay_function: None,
        }
    }

    #[test]
    fn pinned_memory_never_decays() {
        let mut m = memory(0.9, 0, 0);
        m.decay_rate = Some(0.0);
        let result = effective_confidence(&m, &DecayConfig::default(), 10_000_000);
        assert!(result.pinned);
        assert_eq!(result.effective_confidence, 0.9);
    }

    #[test]
    fn exponential_decay_halves_at_half_life() {
        let m = memory(1.0, 0, 0);
        let config = DecayConfig { function: DecayFunction::Exponential, half_life_secs: 1000, floor: 0.0, ..DecayConfig::default() };
        let result = effective_confidence(&m, &config, 1000);
        assert!((result.effective_confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn linear_decay_reaches_zero_at_full_decay() {
        let m = memory(1.0, 0, 0);
        let config = DecayConfig { function: DecayFunction::Linear, full_decay_secs: 1000, floor: 0.0, ..DecayConfig::default() };
        let result = effective_confidence(&m, &config, 2000);
        assert_eq!(result.effective_confidence, 0.0);
    }

    #[test]
    fn floor_bounds_decayed_value() {
        let m = memory(1.0, 0, 0);
        let config = DecayConfig { function: DecayFunction::Exponential, half_life_secs: 1, floor: 0.3, ..DecayConfig::default() };
        let result = effective_confidence(&m, &config, 100_000);
        assert_eq!(result.effective_confidence, 0.3);
    }

    #[test]
    fn none_function_never_decays() {
        let m = memory(0.7, 0, 0);
        let config = DecayConfig { function: DecayFunction::None, ..DecayConfig::default() };
        let result = effective_confidence(&m, &config, 10_000_000);
        assert_eq!(result.effective_confidence, 0.7);
    }

    #[test]
    fn last_refreshed_at_takes_anchor_priority_over_accessed_and_created() {
        let mut m = memory(1.0, 0, 500);
        m.last_refreshed_at = Some(900);
        assert_eq!(m.anchor_timestamp(), 900);
        let config = DecayConfig { function: DecayFunction::Exponential, half_life_secs: 1000, floor: 0.0, ..DecayConfig::default() };
        let result = effective_confidence(&m, &config, 1900);
        assert_eq!(result.age_secs, 1000);
    }

    #[test]
    fn per_memory_decay_rate_shortens_half_life() {
        let mut m = memory(1.0, 0, 0);
        m.decay_rate = Some(2.0);
        let config = DecayConfig { function: DecayFunction::Exponential, half_life_secs: 1000, floor: 0.0, ..DecayConfig::default() };
        let result = effective_confidence(&m, &config, 500);
        assert!((result.effective_confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn refresh_resets_anchor_and_reports_before_after() {
        let mut m = memory(1.0, 0, 0);
        let config = DecayConfig { function: DecayFunction::Exponential, half_life_secs: 1000, floor: 0.0, ..DecayConfig::default() };
        let result = refresh(&mut m, &config, 1000, Some(0.8));
        assert!((result.before - 0.5).abs() < 1e-6);
        assert_eq!(result.after, 0.8);
        assert_eq!(m.last_refreshed_at, Some(1000));
    }
}
