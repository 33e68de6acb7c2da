//! Attack-cadence multiplier
//!
//! Unsmoothed and tracked in its own slot on a second attribute, so visible
//! speed and attack cadence stay independently tunable.

use crate::config::ControllerConfig;
use crate::controller::commit::write_delta;
use crate::controller::constants::attribute::COMMIT_EPSILON;
use crate::controller::effects::{armor, is_weapon_drawn};
use crate::controller::state::EntityState;
use crate::host::{AttributeAccess, AttributeChannel, BehaviorState, HostError, WorldSample};
use crate::metrics::Metrics;

pub fn attack_multiplier(cfg: &ControllerConfig, equipped_weight: f32, scale: f32, armor_weight: f32) -> f32 {
    let a = &cfg.attack;
    let mut mult = a.base + a.weight_slope * (equipped_weight - a.weight_pivot);
    if a.use_actor_scale && scale.is_finite() {
        mult += a.scale_slope * (scale - 1.0);
    }
    if cfg.armor.affects_attack {
        mult += armor::attack_term(armor_weight, &cfg.armor);
    }
    if !mult.is_finite() {
        return a.base.clamp(a.min_mult, a.max_mult);
    }
    mult.clamp(a.min_mult, a.max_mult)
}

fn attack_active(cfg: &ControllerConfig, behavior: &BehaviorState) -> bool {
    cfg.attack.enabled
        && !(cfg.attack.only_when_drawn && !is_weapon_drawn(behavior))
        && !(cfg.general.ignore_beast_forms && behavior.transformed)
}

/// Bring the attack slot to its current target in one net write
pub fn update_attack<A: AttributeAccess + ?Sized>(
    host: &mut A,
    state: &mut EntityState,
    behavior: &BehaviorState,
    world: &WorldSample,
    cfg: &ControllerConfig,
    metrics: &Metrics,
) -> Result<(), HostError> {
    let current = host.read_attribute(state.id, AttributeChannel::AttackSpeed)?;
    let baseline = current - state.attack_delta;
    if !baseline.is_finite() {
        Metrics::bump(&metrics.non_finite_dropped);
        return Ok(());
    }

    let target_delta = if attack_active(cfg, behavior) {
        let armor_weight = armor::armor_weight(&world.worn_armor, cfg.armor.use_max);
        attack_multiplier(cfg, world.equipped_weight, world.scale, armor_weight) - baseline
    } else {
        0.0
    };

    let change = target_delta - state.attack_delta;
    if change.abs() > COMMIT_EPSILON || (target_delta == 0.0 && state.attack_delta != 0.0) {
        if write_delta(host, state.id, AttributeChannel::AttackSpeed, change, metrics)? {
            state.attack_delta = target_delta;
        }
    }
    Ok(())
}
