//! Worn-armor weight terms

use smallvec::SmallVec;

use crate::config::ArmorConfig;
use crate::host::{FormHandle, WornArmor};

/// Total (or heaviest) worn weight, counting multi-slot items once
pub fn armor_weight(worn: &[WornArmor], use_max: bool) -> f32 {
    let mut seen: SmallVec<[FormHandle; 16]> = SmallVec::new();
    let mut total = 0.0f32;
    let mut heaviest = 0.0f32;
    for item in worn {
        if seen.contains(&item.form) {
            continue;
        }
        seen.push(item.form);
        let weight = if item.weight.is_finite() { item.weight.max(0.0) } else { 0.0 };
        total += weight;
        heaviest = heaviest.max(weight);
    }
    if use_max {
        heaviest
    } else {
        total
    }
}

/// Clamped movement contribution
pub fn movement_delta(weight: f32, cfg: &ArmorConfig) -> f32 {
    (cfg.slope_move * (weight - cfg.pivot)).clamp(cfg.move_min, cfg.move_max)
}

/// Unclamped attack-multiplier term
pub fn attack_term(weight: f32, cfg: &ArmorConfig) -> f32 {
    cfg.slope_attack * (weight - cfg.pivot)
}
