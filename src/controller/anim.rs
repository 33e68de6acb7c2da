//! Sprint animation playback-rate sync

use crate::config::ControllerConfig;
use crate::controller::commit::push_anim_rate;
use crate::controller::constants::attribute::REFERENCE_SPEED;
use crate::controller::smoothing::FilterParams;
use crate::controller::state::EntityState;
use crate::host::{AttributeAccess, AttributeChannel, BehaviorQuery, HostError};

/// Rate matching the live movement value
pub fn target_rate(live_speed: f32, cfg: &ControllerConfig) -> f32 {
    let a = &cfg.sprint_anim;
    if !live_speed.is_finite() {
        return 1.0;
    }
    let rate = (live_speed / REFERENCE_SPEED).clamp(a.min, a.max);
    if a.only_slow_down {
        rate.min(1.0)
    } else {
        rate
    }
}

/// Smooth and push the sprint rate; reset to 1.0 when not sprinting
pub fn update_sprint_anim<H: AttributeAccess + BehaviorQuery + ?Sized>(
    host: &mut H,
    state: &mut EntityState,
    sprinting: bool,
    dt: f32,
    cfg: &ControllerConfig,
) -> Result<(), HostError> {
    if !cfg.sprint_anim.enabled || !sprinting {
        if state.anim_rate != 1.0 {
            push_anim_rate(host, state, 1.0);
            state.anim_rate = 1.0;
        }
        return Ok(());
    }

    let live = host.read_attribute(state.id, AttributeChannel::SpeedMult)?;
    let target = target_rate(live, cfg);
    let params = if cfg.sprint_anim.own_smoothing {
        FilterParams::sprint_anim(&cfg.sprint_anim)
    } else {
        FilterParams::movement(&cfg.smoothing)
    };
    let rate = params.step(state.anim_rate, target, dt);
    if push_anim_rate(host, state, rate) {
        state.anim_rate = rate;
    }
    Ok(())
}
