//! Diagonal movement correction
//!
//! Hosts commonly move faster on diagonals because the input vector is not
//! normalized. The correction removes the excess in proportion to the
//! headroom above the floor.

use crate::controller::constants::diagonal::{INPUT_EPSILON, SPRINT_SHARE};
use crate::controller::constants::graph::NPC_INPUT_AXES;
use crate::host::{BehaviorQuery, EntityId};

/// `min(1, max(|x|, |y|) / |(x, y)|)`; 1.0 on a single axis or at rest
pub fn diagonal_factor(x: f32, y: f32) -> f32 {
    if !x.is_finite() || !y.is_finite() {
        return 1.0;
    }
    let magnitude = (x * x + y * y).sqrt();
    if magnitude < INPUT_EPSILON {
        return 1.0;
    }
    (x.abs().max(y.abs()) / magnitude).min(1.0)
}

/// `headroom * (f - 1)`, halved while sprinting
pub fn diagonal_penalty(factor: f32, headroom: f32, sprinting: bool) -> f32 {
    if factor >= 1.0 || headroom <= 0.0 {
        return 0.0;
    }
    let share = if sprinting { SPRINT_SHARE } else { 1.0 };
    headroom * (factor - 1.0) * share
}

/// NPC move input from the first graph schema that exposes both axes
pub fn npc_axes<B: BehaviorQuery + ?Sized>(host: &B, entity: EntityId) -> (f32, f32) {
    for (x_var, y_var) in NPC_INPUT_AXES {
        if let (Some(x), Some(y)) = (host.graph_float(entity, x_var), host.graph_float(entity, y_var)) {
            return (x, y);
        }
    }
    (0.0, 0.0)
}
