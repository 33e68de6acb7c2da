//! Behavioral case and its base reduction

use crate::config::MovementConfig;
use crate::host::{BehaviorState, WeaponState};

/// Mutually exclusive behavioral case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveCase {
    Combat,
    Drawn,
    Sneak,
    Default,
}

/// Weapon drawn, preferring the authoritative status field
pub fn is_weapon_drawn(behavior: &BehaviorState) -> bool {
    match behavior.weapon_state {
        WeaponState::Drawn | WeaponState::Drawing | WeaponState::WantToDraw => true,
        WeaponState::Sheathed | WeaponState::Sheathing | WeaponState::WantToSheathe => false,
        WeaponState::Unknown => behavior.holds_drawable,
    }
}

/// Combat > Sneak > Drawn > Default
pub fn compute_case(behavior: &BehaviorState, cfg: &MovementConfig) -> MoveCase {
    if behavior.in_combat && cfg.no_reduction_in_combat {
        MoveCase::Combat
    } else if behavior.sneaking {
        MoveCase::Sneak
    } else if is_weapon_drawn(behavior) {
        MoveCase::Drawn
    } else {
        MoveCase::Default
    }
}

/// Signed base contribution for a case
pub fn case_delta(case: MoveCase, jogging: bool, cfg: &MovementConfig) -> f32 {
    match case {
        MoveCase::Combat => 0.0,
        MoveCase::Drawn => -cfg.reduce_drawn,
        MoveCase::Sneak => -cfg.reduce_sneak,
        MoveCase::Default if jogging => -cfg.reduce_jogging_out_of_combat,
        MoveCase::Default => -cfg.reduce_out_of_combat,
    }
}
