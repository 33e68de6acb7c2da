//! Time-based filters for the movement delta and the sprint animation rate

use std::f32::consts::LN_2;

use crate::config::{SmoothingConfig, SmoothingMode, SprintAnimConfig};

/// Resolved filter parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    pub mode: SmoothingMode,
    /// Exponential time constant in seconds
    pub tau: f32,
    /// Rate-limit ceiling in units per second
    pub max_per_second: f32,
}

impl FilterParams {
    pub fn movement(cfg: &SmoothingConfig) -> Self {
        Self {
            mode: cfg.mode,
            tau: tau_from_half_life(cfg.half_life_ms / 1000.0),
            max_per_second: cfg.max_change_per_second,
        }
    }

    pub fn sprint_anim(cfg: &SprintAnimConfig) -> Self {
        Self {
            mode: cfg.mode,
            tau: cfg.tau,
            max_per_second: cfg.rate_per_sec,
        }
    }

    /// Advance `prev` toward `target` over `dt` seconds
    pub fn step(&self, prev: f32, target: f32, dt: f32) -> f32 {
        if !target.is_finite() {
            return prev;
        }
        if !prev.is_finite() {
            return target;
        }
        match self.mode {
            SmoothingMode::Exponential => exponential(prev, target, dt, self.tau),
            SmoothingMode::RateLimit => rate_limit(prev, target, dt, self.max_per_second),
            SmoothingMode::ExpoThenRate => {
                let expo = exponential(prev, target, dt, self.tau);
                rate_limit(prev, expo, dt, self.max_per_second)
            }
        }
    }
}

#[inline]
pub fn tau_from_half_life(half_life_s: f32) -> f32 {
    half_life_s.max(0.0) / LN_2
}

/// `prev + (target - prev) * (1 - exp(-dt / tau))`
#[inline]
pub fn exponential(prev: f32, target: f32, dt: f32, tau: f32) -> f32 {
    if dt <= 0.0 {
        return prev;
    }
    if tau <= 0.0 {
        return target;
    }
    let alpha = 1.0 - (-dt / tau).exp();
    prev + (target - prev) * alpha
}

/// Move toward `target` by at most `max_per_second * dt`
#[inline]
pub fn rate_limit(prev: f32, target: f32, dt: f32, max_per_second: f32) -> f32 {
    if dt <= 0.0 {
        return prev;
    }
    if max_per_second <= 0.0 {
        return target;
    }
    let max_step = max_per_second * dt;
    prev + (target - prev).clamp(-max_step, max_step)
}
