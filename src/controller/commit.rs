//! Attribute writes
//!
//! Every change to an externally owned attribute goes through here so the
//! finiteness guard, the write counter and the granular buffer apply
//! uniformly. Slots are only updated after the host accepted the write.

use tracing::trace;

use crate::controller::constants::attribute::{COMMIT_EPSILON, REFRESH_NUDGE};
use crate::controller::constants::graph::SPRINT_RATE_VARS;
use crate::controller::state::EntityState;
use crate::host::{AttributeAccess, AttributeChannel, BehaviorQuery, EntityId, HostError};
use crate::metrics::Metrics;

/// Apply `delta` to an attribute
///
/// Returns `Ok(false)` (and writes nothing) for non-finite deltas.
pub fn write_delta<A: AttributeAccess + ?Sized>(
    host: &mut A,
    entity: EntityId,
    channel: AttributeChannel,
    delta: f32,
    metrics: &Metrics,
) -> Result<bool, HostError> {
    if !delta.is_finite() {
        Metrics::bump(&metrics.non_finite_dropped);
        trace!("Dropped non-finite {:?} delta for {}", channel, entity);
        return Ok(false);
    }
    host.modify_attribute(entity, channel, delta)?;
    Metrics::bump(&metrics.attribute_writes);
    Ok(true)
}

/// Net-zero nudge on an unrelated channel so dependent host systems
/// recompute immediately
pub fn force_refresh<A: AttributeAccess + ?Sized>(
    host: &mut A,
    entity: EntityId,
    metrics: &Metrics,
) -> Result<(), HostError> {
    write_delta(host, entity, AttributeChannel::CarryWeight, REFRESH_NUDGE, metrics)?;
    write_delta(host, entity, AttributeChannel::CarryWeight, -REFRESH_NUDGE, metrics)?;
    Metrics::bump(&metrics.forced_refreshes);
    Ok(())
}

/// What a commit did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommitOutcome {
    /// Net change written to the host
    Written(f32),
    /// Below granularity, kept as residual
    Buffered,
    Unchanged,
}

/// Applied amount plus sub-granularity residual of one effect
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GranularSlot {
    pub applied: f32,
    pub residual: f32,
}

impl GranularSlot {
    pub fn with_applied(applied: f32) -> Self {
        Self {
            applied,
            residual: 0.0,
        }
    }

    /// Move the applied amount toward `target`
    ///
    /// Pending changes below `granularity` are buffered, except that an
    /// exact-zero target always flushes so disabled effects revert fully.
    pub fn commit<A: AttributeAccess + ?Sized>(
        &mut self,
        host: &mut A,
        entity: EntityId,
        channel: AttributeChannel,
        target: f32,
        granularity: f32,
        metrics: &Metrics,
    ) -> Result<CommitOutcome, HostError> {
        if !target.is_finite() {
            Metrics::bump(&metrics.non_finite_dropped);
            return Ok(CommitOutcome::Unchanged);
        }

        let pending = target - self.applied;
        let releasing = target == 0.0 && self.applied != 0.0;
        if pending.abs() <= COMMIT_EPSILON && !releasing {
            self.residual = 0.0;
            return Ok(CommitOutcome::Unchanged);
        }

        if pending.abs() >= granularity || releasing {
            if !write_delta(host, entity, channel, pending, metrics)? {
                return Ok(CommitOutcome::Unchanged);
            }
            self.applied = target;
            self.residual = 0.0;
            Ok(CommitOutcome::Written(pending))
        } else {
            self.residual = pending;
            Metrics::bump(&metrics.granular_suppressed);
            Ok(CommitOutcome::Buffered)
        }
    }

    /// Revert the applied amount completely
    pub fn release<A: AttributeAccess + ?Sized>(
        &mut self,
        host: &mut A,
        entity: EntityId,
        channel: AttributeChannel,
        metrics: &Metrics,
    ) -> Result<CommitOutcome, HostError> {
        self.commit(host, entity, channel, 0.0, 0.0, metrics)
    }
}

/// Push a sprint playback rate through the graph-variable table
///
/// The variable that accepted the last write is tried first.
pub fn push_anim_rate<B: BehaviorQuery + ?Sized>(host: &mut B, state: &mut EntityState, rate: f32) -> bool {
    if let Some(var) = state.anim_var {
        if host.set_graph_float(state.id, var, rate) {
            return true;
        }
    }
    for var in SPRINT_RATE_VARS {
        if host.set_graph_float(state.id, var, rate) {
            state.anim_var = Some(var);
            return true;
        }
    }
    false
}

/// Remove every contribution of `state` from the host and zero its slots
///
/// The movement slots go out as one combined write.
pub fn revert_entity<H: AttributeAccess + BehaviorQuery + ?Sized>(
    host: &mut H,
    state: &mut EntityState,
    metrics: &Metrics,
) -> Result<(), HostError> {
    let id = state.id;
    let total = state.tracked_speed_sum();
    if total != 0.0 {
        write_delta(host, id, AttributeChannel::SpeedMult, -total, metrics)?;
    }
    state.movement_delta = 0.0;
    state.diagonal = GranularSlot::default();
    state.slope = GranularSlot::default();
    state.scale = GranularSlot::default();

    if state.attack_delta != 0.0 {
        write_delta(host, id, AttributeChannel::AttackSpeed, -state.attack_delta, metrics)?;
        state.attack_delta = 0.0;
    }

    if state.anim_rate != 1.0 {
        push_anim_rate(host, state, 1.0);
        state.anim_rate = 1.0;
    }
    Ok(())
}
