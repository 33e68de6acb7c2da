//! Effect evaluators
//!
//! Pure functions (or read-only host queries) producing one contribution
//! each. Composition, smoothing and commits happen in `compose`.

pub mod armor;
pub mod base;
pub mod diagonal;
pub mod rules;
pub mod scale;
pub mod slope;
pub mod sprint;
pub mod vitals;

pub use base::{compute_case, is_weapon_drawn, MoveCase};
