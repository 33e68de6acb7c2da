//! Sprint detection and bonus

use crate::config::MovementConfig;
use crate::controller::constants::graph::SPRINT_FLAGS;
use crate::controller::effects::MoveCase;
use crate::host::{BehaviorQuery, EntityId};

/// Any of the known graph flags reports a sprint
pub fn sprinting_by_graph<B: BehaviorQuery + ?Sized>(host: &B, entity: EntityId) -> bool {
    SPRINT_FLAGS
        .iter()
        .any(|name| host.graph_bool(entity, name).unwrap_or(false))
}

/// Sprint input seen recently enough to bridge the graph flag's lag
///
/// `last_input_ms == 0` means released.
#[inline]
pub fn latch_active(last_input_ms: u64, now_ms: u64, window_ms: u64) -> bool {
    last_input_ms != 0 && now_ms.saturating_sub(last_input_ms) <= window_ms
}

pub fn sprint_bonus(sprinting: bool, case: MoveCase, cfg: &MovementConfig) -> f32 {
    if !sprinting || (case == MoveCase::Combat && !cfg.sprint_affects_combat) {
        return 0.0;
    }
    cfg.increase_sprinting
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryHost;

    #[test]
    fn test_graph_flags() {
        let player = EntityId(1);
        let mut host = MemoryHost::new(player);
        assert!(!sprinting_by_graph(&host, player));
        host.actor_mut(player)
            .unwrap()
            .graph_bools
            .insert("bSprint".to_string(), true);
        assert!(sprinting_by_graph(&host, player));
    }

    #[test]
    fn test_latch_window() {
        assert!(!latch_active(0, 1000, 150));
        assert!(latch_active(900, 1000, 150));
        assert!(latch_active(850, 1000, 150));
        assert!(!latch_active(849, 1000, 150));
    }

    #[test]
    fn test_bonus_in_combat() {
        let mut cfg = MovementConfig::default();
        assert_eq!(sprint_bonus(true, MoveCase::Default, &cfg), 25.0);
        assert_eq!(sprint_bonus(true, MoveCase::Combat, &cfg), 0.0);
        assert_eq!(sprint_bonus(false, MoveCase::Default, &cfg), 0.0);
        cfg.sprint_affects_combat = true;
        assert_eq!(sprint_bonus(true, MoveCase::Combat, &cfg), 25.0);
    }
}
