//! Per-entity composition and commit
//!
//! Evaluates every effect, smooths the movement target, predicts the
//! diagonal correction, folds floor/ceiling/clamp corrections into the
//! movement slot only, then commits slot by slot. Any host failure aborts
//! the entity for this tick; slots already committed stay consistent
//! because each is updated only after its write succeeded.

use tracing::trace;

use crate::config::{ControllerConfig, SlopeMethod};
use crate::controller::anim::update_sprint_anim;
use crate::controller::attack::update_attack;
use crate::controller::commit::{revert_entity, write_delta};
use crate::controller::constants::attribute::{COMMIT_EPSILON, FLOOR_EPSILON};
use crate::controller::effects::{armor, base, diagonal, rules, scale, slope, sprint, vitals};
use crate::controller::smoothing::FilterParams;
use crate::controller::state::{EntityState, PreviousFlags};
use crate::host::{AttributeAccess, AttributeChannel, HostError, Host};
use crate::metrics::Metrics;
use crate::util::vec3::Vec3;

/// Values shared by every entity evaluated in one tick
pub struct TickContext<'a> {
    pub cfg: &'a ControllerConfig,
    pub now_ms: u64,
    pub metrics: &'a Metrics,
    /// Player sprint input latch
    pub sprint_latch: bool,
}

impl TickContext<'_> {
    fn default_dt_ms(&self) -> u64 {
        self.cfg.general.heartbeat_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalOutcome {
    Evaluated,
    /// Entity left scope (transformed); contributions reverted
    Released,
    /// Degenerate host value, nothing touched
    Skipped,
}

/// Everything besides smoothing that feeds the movement target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementTarget {
    pub case: base::MoveCase,
    pub want: f32,
}

/// Step 1: compose the instantaneous movement target
pub fn compose_target<H: Host + ?Sized>(
    host: &H,
    state: &EntityState,
    behavior: &crate::host::BehaviorState,
    world: &crate::host::WorldSample,
    sprinting: bool,
    is_player: bool,
    cfg: &ControllerConfig,
) -> MovementTarget {
    let case = base::compute_case(behavior, &cfg.movement);
    let mut want = base::case_delta(case, state.jogging, &cfg.movement);

    let location = rules::match_location(&cfg.rules, world, host);
    let weather = rules::match_weather(&cfg.rules, world, host);
    want = rules::apply_rules(want, case, &cfg.rules, location, weather);

    want += sprint::sprint_bonus(sprinting, case, &cfg.movement);

    if cfg.armor.affects_movement {
        let weight = armor::armor_weight(&world.worn_armor, cfg.armor.use_max);
        want += armor::movement_delta(weight, &cfg.armor);
    }

    want -= vitals::vitals_penalty(host, state.id, &cfg.vitals);
    want += scale::additive_delta(world.scale, &cfg.scale);

    if !is_player {
        want *= cfg.npc.percent_of_player / 100.0;
    }
    MovementTarget { case, want }
}

fn slope_enabled(cfg: &ControllerConfig, is_player: bool) -> bool {
    cfg.slope.enabled && cfg.slope.method == SlopeMethod::Path && (is_player || cfg.slope.affects_npcs)
}

/// Full evaluation of one entity
pub fn evaluate_full<H: Host + ?Sized>(
    host: &mut H,
    state: &mut EntityState,
    ctx: &TickContext<'_>,
    is_player: bool,
) -> Result<EvalOutcome, HostError> {
    let cfg = ctx.cfg;
    let id = state.id;
    let behavior = host.behavior(id)?;
    let world = host.world(id)?;
    let live = host.read_attribute(id, AttributeChannel::SpeedMult)?;
    if !live.is_finite() {
        Metrics::bump(&ctx.metrics.non_finite_dropped);
        return Ok(EvalOutcome::Skipped);
    }
    // Invariant under slot releases below, which move live and tracked alike
    let baseline = live - state.tracked_speed_sum();

    if cfg.general.ignore_beast_forms && behavior.transformed {
        revert_entity(host, state, ctx.metrics)?;
        state.reset_dynamics();
        return Ok(EvalOutcome::Released);
    }

    let dt = state.eval_dt(ctx.now_ms, ctx.default_dt_ms());
    let sprinting = sprint::sprinting_by_graph(host, id) || (is_player && ctx.sprint_latch);
    let flags = PreviousFlags {
        sprinting,
        sneaking: behavior.sneaking,
        drawn: base::is_weapon_drawn(&behavior),
    };
    let flipped = state.prev_flags.is_some_and(|prev| prev != flags);

    // Diagonal slot depends on input axes, stale across a flip
    if flipped && state.diagonal.applied != 0.0 {
        state
            .diagonal
            .release(host, id, AttributeChannel::SpeedMult, ctx.metrics)?;
    }

    // 1. target
    let target = compose_target(host, state, &behavior, &world, sprinting, is_player, cfg);
    let want = if target.want.is_finite() {
        target.want
    } else {
        Metrics::bump(&ctx.metrics.non_finite_dropped);
        state.movement_delta
    };

    // 2. smoothing
    let smoothing_on = cfg.smoothing.enabled && (is_player || cfg.smoothing.affects_npcs);
    let bypass = state.force_bypass || (cfg.smoothing.bypass_on_state_change && flipped);
    let mut new_move = if smoothing_on && !bypass {
        FilterParams::movement(&cfg.smoothing).step(state.movement_delta, want, dt)
    } else {
        want
    };

    let floor = cfg.general.min_final_speed;

    // 3. predicted diagonal at the new movement delta
    let diagonal_on = cfg.diagonal.enabled && (is_player || cfg.diagonal.npcs);
    let predicted_diagonal = if diagonal_on {
        let (x, y) = if is_player {
            host.player_move_axes()
        } else {
            diagonal::npc_axes(host, id)
        };
        let headroom = baseline + new_move + state.slope.applied - floor;
        diagonal::diagonal_penalty(diagonal::diagonal_factor(x, y), headroom, sprinting)
    } else {
        0.0
    };

    // 4. expected final value
    let k = scale::inverse_factor(world.scale, &cfg.scale);
    let mut expected = (baseline + new_move + predicted_diagonal + state.slope.applied) * k;

    // 5. slope clamp band
    if slope_enabled(cfg, is_player) && cfg.slope.clamp_enabled && state.slope.applied != 0.0 {
        if expected < cfg.slope.min_final {
            new_move += (cfg.slope.min_final - expected) / k;
            expected = cfg.slope.min_final;
        } else if expected > cfg.slope.max_final {
            new_move -= (expected - cfg.slope.max_final) / k;
            expected = cfg.slope.max_final;
        }
    }

    // 6. floor, then optional ceiling
    if expected < floor {
        new_move += (floor - expected) / k;
        expected = floor;
    }
    if cfg.general.ceiling_enabled && expected > cfg.general.max_final_speed {
        new_move -= (expected - cfg.general.max_final_speed) / k;
    }

    // 7. movement slot
    let change = new_move - state.movement_delta;
    if change.abs() > COMMIT_EPSILON
        && write_delta(host, id, AttributeChannel::SpeedMult, change, ctx.metrics)?
    {
        state.movement_delta = new_move;
    }

    // 8. diagonal and slope through the granular committer
    let granularity = cfg.general.granularity;
    state.diagonal.commit(
        host,
        id,
        AttributeChannel::SpeedMult,
        predicted_diagonal,
        granularity,
        ctx.metrics,
    )?;
    update_slope(host, state, world.position, ctx, is_player)?;

    // 9. scale-inverse slot from the pre-scale preview
    let preview = baseline + state.movement_delta + state.diagonal.applied + state.slope.applied;
    let scale_target = if k != 1.0 { preview * (k - 1.0) } else { 0.0 };
    state.scale.commit(
        host,
        id,
        AttributeChannel::SpeedMult,
        scale_target,
        granularity,
        ctx.metrics,
    )?;

    // 10. safety net
    enforce_floor(host, state, floor, ctx.metrics)?;

    update_attack(host, state, &behavior, &world, cfg, ctx.metrics)?;
    update_sprint_anim(host, state, sprinting, dt, cfg)?;

    state.prev_flags = Some(flags);
    state.force_bypass = false;
    state.last_eval_ms = Some(ctx.now_ms);
    Metrics::bump(&ctx.metrics.full_evaluations);
    trace!(
        "Evaluated {} case={:?} want={:.2} move={:.2} diag={:.2} slope={:.2}",
        id,
        target.case,
        want,
        state.movement_delta,
        state.diagonal.applied,
        state.slope.applied
    );
    Ok(EvalOutcome::Evaluated)
}

/// Path-slope update shared by full and slope-only ticks
pub fn update_slope<H: Host + ?Sized>(
    host: &mut H,
    state: &mut EntityState,
    position: Vec3,
    ctx: &TickContext<'_>,
    is_player: bool,
) -> Result<(), HostError> {
    let cfg = &ctx.cfg.slope;
    let granularity = ctx.cfg.general.granularity;

    if !slope_enabled(ctx.cfg, is_player) {
        state.path.clear();
        state.slope_estimates.clear();
        state.slope_filtered = 0.0;
        state
            .slope
            .commit(host, state.id, AttributeChannel::SpeedMult, 0.0, granularity, ctx.metrics)?;
        state.last_slope_ms = Some(ctx.now_ms);
        return Ok(());
    }

    let dt = state.slope_dt(ctx.now_ms, ctx.default_dt_ms());
    slope::push_sample(&mut state.path, position, ctx.now_ms, cfg);

    let raw = if slope::is_still(&state.path, ctx.now_ms) {
        state.slope_estimates.clear();
        0.0
    } else {
        match slope::estimate_degrees(&state.path, cfg.lookback_units) {
            Some(degrees) => {
                // The window may shrink after a config change
                let keep = cfg.median_n.max(1) - 1;
                let excess = state.slope_estimates.len().saturating_sub(keep);
                state.slope_estimates.drain(..excess);
                state.slope_estimates.push(degrees);
                slope::median(&state.slope_estimates)
                    .map(|d| slope::slope_target(d, cfg))
                    .unwrap_or(0.0)
            }
            None => 0.0,
        }
    };

    let mut filtered = crate::controller::smoothing::exponential(state.slope_filtered, raw, dt, cfg.tau);
    // Settle exactly on zero so a flat or idle entity releases the slot
    if raw == 0.0 && filtered.abs() < granularity * 0.5 {
        filtered = 0.0;
    }
    state.slope_filtered = filtered;
    state.slope.commit(
        host,
        state.id,
        AttributeChannel::SpeedMult,
        filtered,
        granularity,
        ctx.metrics,
    )?;
    state.last_slope_ms = Some(ctx.now_ms);
    Ok(())
}

/// Cheap tick inside the main throttle window
pub fn evaluate_slope_only<H: Host + ?Sized>(
    host: &mut H,
    state: &mut EntityState,
    ctx: &TickContext<'_>,
    is_player: bool,
) -> Result<(), HostError> {
    if state.last_eval_ms.is_none() {
        return Ok(());
    }
    let cfg = ctx.cfg;
    let world = host.world(state.id)?;
    update_slope(host, state, world.position, ctx, is_player)?;
    if slope_enabled(cfg, is_player) && cfg.slope.clamp_enabled && state.slope.applied != 0.0 {
        enforce_band(host, state, cfg.slope.min_final, cfg.slope.max_final, ctx.metrics)?;
    }
    if cfg.general.ceiling_enabled {
        enforce_band(host, state, f32::NEG_INFINITY, cfg.general.max_final_speed, ctx.metrics)?;
    }
    enforce_floor(host, state, cfg.general.min_final_speed, ctx.metrics)?;
    Metrics::bump(&ctx.metrics.slope_only_ticks);
    Ok(())
}

/// Fold the live value back into `[lo, hi]` through the movement slot
pub fn enforce_band<A: AttributeAccess + ?Sized>(
    host: &mut A,
    state: &mut EntityState,
    lo: f32,
    hi: f32,
    metrics: &Metrics,
) -> Result<(), HostError> {
    let live = host.read_attribute(state.id, AttributeChannel::SpeedMult)?;
    if !live.is_finite() {
        return Ok(());
    }
    let correction = if live < lo - FLOOR_EPSILON {
        lo - live
    } else if live > hi + FLOOR_EPSILON {
        hi - live
    } else {
        return Ok(());
    };
    if write_delta(host, state.id, AttributeChannel::SpeedMult, correction, metrics)? {
        state.movement_delta += correction;
    }
    Ok(())
}

/// Add any remaining shortfall below `floor` to the movement slot
pub fn enforce_floor<A: AttributeAccess + ?Sized>(
    host: &mut A,
    state: &mut EntityState,
    floor: f32,
    metrics: &Metrics,
) -> Result<(), HostError> {
    let live = host.read_attribute(state.id, AttributeChannel::SpeedMult)?;
    if !live.is_finite() || live >= floor - FLOOR_EPSILON {
        return Ok(());
    }
    let shortfall = floor - live;
    if write_delta(host, state.id, AttributeChannel::SpeedMult, shortfall, metrics)? {
        state.movement_delta += shortfall;
    }
    Ok(())
}
