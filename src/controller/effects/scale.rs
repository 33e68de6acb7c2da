//! Actor-scale compensation

use crate::config::{ScaleConfig, ScaleMode};

fn applies(scale: f32, cfg: &ScaleConfig) -> bool {
    scale.is_finite() && scale > f32::EPSILON && !(cfg.only_when_smaller && scale >= 1.0)
}

/// `per_unit * (1 - scale)` composed into the movement target
pub fn additive_delta(scale: f32, cfg: &ScaleConfig) -> f32 {
    if cfg.mode != ScaleMode::Additive || !applies(scale, cfg) {
        return 0.0;
    }
    cfg.per_unit * (1.0 - scale)
}

/// Multiplier turning the pre-scale value into the final one (1.0 when off)
pub fn inverse_factor(scale: f32, cfg: &ScaleConfig) -> f32 {
    if cfg.mode != ScaleMode::Inverse || !applies(scale, cfg) {
        return 1.0;
    }
    1.0 / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(mode: ScaleMode) -> ScaleConfig {
        ScaleConfig {
            mode,
            ..ScaleConfig::default()
        }
    }

    #[test]
    fn test_additive() {
        let c = cfg(ScaleMode::Additive);
        assert!((additive_delta(0.8, &c) - 20.0).abs() < 1e-4);
        // Larger actors are left alone by default
        assert_eq!(additive_delta(1.2, &c), 0.0);
        let both = ScaleConfig {
            only_when_smaller: false,
            ..c
        };
        assert!((additive_delta(1.2, &both) + 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_inverse() {
        let c = cfg(ScaleMode::Inverse);
        assert_eq!(inverse_factor(0.5, &c), 2.0);
        assert_eq!(inverse_factor(0.0, &c), 1.0);
        assert_eq!(inverse_factor(f32::NAN, &c), 1.0);
        assert_eq!(inverse_factor(0.5, &cfg(ScaleMode::Off)), 1.0);
        assert_eq!(additive_delta(0.5, &c), 0.0);
    }
}
