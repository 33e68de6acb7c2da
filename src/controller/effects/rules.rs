//! Location and weather rules
//!
//! Rule values are reduction magnitudes. A specific form match wins over a
//! keyword/type match; within one list the first matching entry wins.

use crate::config::{FormRule, RuleAffects, RuleMode, RulesConfig};
use crate::controller::effects::MoveCase;
use crate::host::{FormHandle, FormResolver, LocationSample, WorldSample};

fn resolve_rule<R: FormResolver + ?Sized>(resolver: &R, rule: &FormRule) -> Option<FormHandle> {
    let spec = rule.spec()?;
    resolver.resolve(&spec.plugin, spec.local_id)
}

fn locations(world: &WorldSample) -> impl Iterator<Item = &LocationSample> {
    world.location.iter().chain(world.parent_location.iter())
}

/// Reduction of the first matching location rule
pub fn match_location<R: FormResolver + ?Sized>(
    rules: &RulesConfig,
    world: &WorldSample,
    resolver: &R,
) -> Option<f32> {
    world.location.as_ref()?;

    for rule in &rules.location_specific {
        if let Some(handle) = resolve_rule(resolver, rule) {
            if locations(world).any(|loc| loc.form == handle) {
                return Some(rule.value);
            }
        }
    }
    for rule in &rules.location_type {
        if let Some(keyword) = resolve_rule(resolver, rule) {
            if locations(world).any(|loc| loc.keywords.contains(&keyword)) {
                return Some(rule.value);
            }
        }
    }
    None
}

/// Reduction of the first matching weather rule
pub fn match_weather<R: FormResolver + ?Sized>(
    rules: &RulesConfig,
    world: &WorldSample,
    resolver: &R,
) -> Option<f32> {
    if !rules.weather_enabled || (world.interior && rules.weather_ignore_interior) {
        return None;
    }
    let weather = world.weather?;

    for rule in &rules.weather_specific {
        if resolve_rule(resolver, rule) == Some(weather.form) {
            return Some(rule.value);
        }
    }
    rules
        .weather_type
        .iter()
        .find(|rule| rule.kind == weather.kind)
        .map(|rule| rule.value)
}

/// Combine matched reductions with the case's base delta
pub fn apply_rules(
    base: f32,
    case: MoveCase,
    rules: &RulesConfig,
    location: Option<f32>,
    weather: Option<f32>,
) -> f32 {
    if rules.affects == RuleAffects::DefaultOnly && case != MoveCase::Default {
        return base;
    }
    if location.is_none() && weather.is_none() {
        return base;
    }
    let reduction = location.unwrap_or(0.0) + weather.unwrap_or(0.0);
    match rules.mode {
        RuleMode::Replace => -reduction,
        RuleMode::Add => base - reduction,
    }
}
