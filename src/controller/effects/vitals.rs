//! Low-vital penalties with a linear ramp below each threshold

use crate::config::{VitalRule, VitalsConfig};
use crate::host::{AttributeAccess, AttributeChannel, EntityId};

/// Penalty magnitude for a vital at `pct` percent
///
/// Zero at or above the threshold, full at `threshold - smooth_width` and
/// below, linear in between.
pub fn ramp_penalty(pct: f32, rule: &VitalRule) -> f32 {
    if !rule.enabled || !pct.is_finite() || pct >= rule.threshold_pct {
        return 0.0;
    }
    if rule.smooth_width <= 0.0 {
        return rule.penalty;
    }
    let depth = ((rule.threshold_pct - pct) / rule.smooth_width).clamp(0.0, 1.0);
    rule.penalty * depth
}

fn percent<A: AttributeAccess + ?Sized>(host: &A, entity: EntityId, channel: AttributeChannel) -> Option<f32> {
    let current = host.read_attribute(entity, channel).ok()?;
    let max = host.read_maximum(entity, channel).ok()?;
    if !current.is_finite() || !max.is_finite() || max <= 0.0 {
        return None;
    }
    Some((current / max * 100.0).clamp(0.0, 100.0))
}

/// Summed penalty magnitude over health, stamina and magicka
pub fn vitals_penalty<A: AttributeAccess + ?Sized>(host: &A, entity: EntityId, cfg: &VitalsConfig) -> f32 {
    if !cfg.enabled {
        return 0.0;
    }
    [
        (AttributeChannel::Health, &cfg.health),
        (AttributeChannel::Stamina, &cfg.stamina),
        (AttributeChannel::Magicka, &cfg.magicka),
    ]
    .into_iter()
    .filter(|(_, rule)| rule.enabled)
    .filter_map(|(channel, rule)| percent(host, entity, channel).map(|pct| ramp_penalty(pct, rule)))
    .sum()
}
