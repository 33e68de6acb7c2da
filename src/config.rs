//! Controller configuration document
//!
//! Every tunable lives in one `ControllerConfig`. The on-disk form is a JSON
//! document that is loaded tolerantly: unknown keys are ignored, missing keys
//! keep their defaults, a value of the wrong type falls back to its default,
//! and out-of-range numbers are clamped by [`ControllerConfig::sanitize`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Environment variable overriding the config document location
pub const CONFIG_PATH_ENV: &str = "SPEED_CONTROLLER_CONFIG";

/// Errors while reading or writing the config document
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed config document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Movement-delta / animation-rate filter family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmoothingMode {
    Exponential,
    RateLimit,
    ExpoThenRate,
}

/// Slope estimation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlopeMethod {
    /// Placeholder, never produces a correction
    Instant,
    /// Distance-windowed estimate over the path history
    Path,
}

/// Actor-scale compensation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleMode {
    Off,
    /// `per_unit * (1 - scale)` added to the composed target
    Additive,
    /// Final value divided by scale, tracked in its own slot
    Inverse,
}

/// Which behavioral states location/weather rules apply to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleAffects {
    DefaultOnly,
    AllStates,
}

/// How a matched rule combines with the base magnitude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleMode {
    Replace,
    Add,
}

/// Coarse weather classification used by weather type rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeatherKind {
    Pleasant,
    Cloudy,
    Rainy,
    Snow,
}

/// A parsed `"plugin|0xID"` reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormSpec {
    pub plugin: String,
    pub local_id: u32,
}

impl FormSpec {
    /// Parse `"Skyrim.esm|0x0001A2B3"` (the `0x` prefix is optional)
    pub fn parse(spec: &str) -> Option<Self> {
        let (plugin, id) = spec.split_once('|')?;
        let plugin = plugin.trim();
        if plugin.is_empty() {
            return None;
        }
        let id = id.trim();
        let hex = id
            .strip_prefix("0x")
            .or_else(|| id.strip_prefix("0X"))
            .unwrap_or(id);
        let local_id = u32::from_str_radix(hex, 16).ok()?;
        Some(Self {
            plugin: plugin.to_string(),
            local_id,
        })
    }
}

impl std::fmt::Display for FormSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|0x{:06X}", self.plugin, self.local_id)
    }
}

/// `{identifier, value}` rule entry keyed by a form spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormRule {
    pub form: String,
    /// Reduction magnitude (positive slows down)
    pub value: f32,
}

impl FormRule {
    pub fn new(form: impl Into<String>, value: f32) -> Self {
        Self {
            form: form.into(),
            value,
        }
    }

    pub fn spec(&self) -> Option<FormSpec> {
        FormSpec::parse(&self.form)
    }
}

/// Weather classification rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherTypeRule {
    pub kind: WeatherKind,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Skip (and revert) actors in werewolf/vampire-lord forms
    pub ignore_beast_forms: bool,
    /// Timer thread wake interval
    pub heartbeat_ms: u64,
    /// Minimum interval between full evaluations (event debounce)
    pub eval_throttle_ms: u64,
    /// Absolute floor for the final movement attribute
    pub min_final_speed: f32,
    pub ceiling_enabled: bool,
    pub max_final_speed: f32,
    /// Minimum accumulated change before a granular slot is flushed
    pub granularity: f32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            ignore_beast_forms: true,
            heartbeat_ms: 50,
            eval_throttle_ms: 10,
            min_final_speed: 10.0,
            ceiling_enabled: false,
            max_final_speed: 300.0,
            granularity: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub reduce_out_of_combat: f32,
    pub reduce_jogging_out_of_combat: f32,
    pub reduce_drawn: f32,
    pub reduce_sneak: f32,
    pub increase_sprinting: f32,
    pub no_reduction_in_combat: bool,
    pub sprint_affects_combat: bool,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            reduce_out_of_combat: 45.0,
            reduce_jogging_out_of_combat: 15.0,
            reduce_drawn: 15.0,
            reduce_sneak: 20.0,
            increase_sprinting: 25.0,
            no_reduction_in_combat: true,
            sprint_affects_combat: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Raw key code toggling jogging mode (0 disables)
    pub toggle_key: u32,
    /// User-event name toggling jogging mode (empty disables)
    pub toggle_event: String,
    /// User-event name that arms the sprint latch
    pub sprint_event: String,
    pub toggle_cooldown_ms: u64,
    pub sprint_latch_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            toggle_key: 269,
            toggle_event: "Shout".to_string(),
            sprint_event: "Sprint".to_string(),
            toggle_cooldown_ms: 150,
            sprint_latch_ms: 150,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpcConfig {
    pub enabled: bool,
    /// Proc radius in world units, 0 evaluates every loaded actor
    pub radius: f32,
    /// Fraction (in percent) of the player's composed target NPCs receive
    pub percent_of_player: f32,
    /// Upper bound on simultaneously tracked NPCs (closest first)
    pub max_tracked: usize,
}

impl Default for NpcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            radius: 4096.0,
            percent_of_player: 100.0,
            max_tracked: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub enabled: bool,
    pub affects_npcs: bool,
    pub bypass_on_state_change: bool,
    pub mode: SmoothingMode,
    pub half_life_ms: f32,
    pub max_change_per_second: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            affects_npcs: true,
            bypass_on_state_change: true,
            mode: SmoothingMode::ExpoThenRate,
            half_life_ms: 160.0,
            max_change_per_second: 120.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagonalConfig {
    pub enabled: bool,
    pub npcs: bool,
}

impl Default for DiagonalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            npcs: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlopeConfig {
    pub enabled: bool,
    pub affects_npcs: bool,
    pub method: SlopeMethod,
    pub uphill_per_deg: f32,
    pub downhill_per_deg: f32,
    pub max_abs: f32,
    /// Exponential time constant in seconds
    pub tau: f32,
    pub lookback_units: f32,
    pub max_history_sec: f32,
    pub min_xy_per_frame: f32,
    /// Median over the last N raw estimates (1 disables)
    pub median_n: usize,
    pub clamp_enabled: bool,
    pub min_final: f32,
    pub max_final: f32,
}

impl Default for SlopeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            affects_npcs: true,
            method: SlopeMethod::Path,
            uphill_per_deg: 0.60,
            downhill_per_deg: 0.30,
            max_abs: 25.0,
            tau: 0.25,
            lookback_units: 96.0,
            max_history_sec: 1.0,
            min_xy_per_frame: 0.25,
            median_n: 3,
            clamp_enabled: false,
            min_final: 60.0,
            max_final: 200.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmorConfig {
    pub affects_movement: bool,
    /// Max single piece instead of the sum
    pub use_max: bool,
    pub pivot: f32,
    /// Movement points per weight unit above the pivot
    pub slope_move: f32,
    pub move_min: f32,
    pub move_max: f32,
    pub affects_attack: bool,
    /// Attack multiplier per weight unit above the pivot
    pub slope_attack: f32,
}

impl Default for ArmorConfig {
    fn default() -> Self {
        Self {
            affects_movement: false,
            use_max: false,
            pivot: 20.0,
            slope_move: -0.5,
            move_min: -30.0,
            move_max: 10.0,
            affects_attack: false,
            slope_attack: -0.005,
        }
    }
}

/// Low-vital penalty ramp for one of health/stamina/magicka
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalRule {
    pub enabled: bool,
    /// Percentage at or above which no penalty applies
    pub threshold_pct: f32,
    /// Ramp width below the threshold until the full penalty
    pub smooth_width: f32,
    /// Full penalty magnitude in movement points
    pub penalty: f32,
}

impl Default for VitalRule {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_pct: 30.0,
            smooth_width: 10.0,
            penalty: 15.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalsConfig {
    pub enabled: bool,
    pub health: VitalRule,
    pub stamina: VitalRule,
    pub magicka: VitalRule,
}

impl Default for VitalsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            health: VitalRule::default(),
            stamina: VitalRule {
                threshold_pct: 25.0,
                penalty: 20.0,
                ..VitalRule::default()
            },
            magicka: VitalRule {
                enabled: false,
                ..VitalRule::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    pub mode: ScaleMode,
    pub per_unit: f32,
    pub only_when_smaller: bool,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            mode: ScaleMode::Off,
            per_unit: 100.0,
            only_when_smaller: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackConfig {
    pub enabled: bool,
    pub only_when_drawn: bool,
    pub base: f32,
    pub weight_pivot: f32,
    pub weight_slope: f32,
    pub use_actor_scale: bool,
    pub scale_slope: f32,
    pub min_mult: f32,
    pub max_mult: f32,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            only_when_drawn: true,
            base: 1.0,
            weight_pivot: 10.0,
            weight_slope: -0.03,
            use_actor_scale: false,
            scale_slope: 0.25,
            min_mult: 0.6,
            max_mult: 1.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SprintAnimConfig {
    pub enabled: bool,
    pub only_slow_down: bool,
    pub min: f32,
    pub max: f32,
    /// Use the parameters below instead of the movement smoothing ones
    pub own_smoothing: bool,
    pub mode: SmoothingMode,
    /// Exponential time constant in seconds
    pub tau: f32,
    pub rate_per_sec: f32,
}

impl Default for SprintAnimConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            only_slow_down: true,
            min: 0.50,
            max: 1.25,
            own_smoothing: true,
            mode: SmoothingMode::ExpoThenRate,
            tau: 0.10,
            rate_per_sec: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub affects: RuleAffects,
    pub mode: RuleMode,
    pub location_specific: Vec<FormRule>,
    pub location_type: Vec<FormRule>,
    pub weather_enabled: bool,
    pub weather_ignore_interior: bool,
    pub weather_specific: Vec<FormRule>,
    pub weather_type: Vec<WeatherTypeRule>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            affects: RuleAffects::DefaultOnly,
            mode: RuleMode::Replace,
            location_specific: Vec::new(),
            location_type: Vec::new(),
            weather_enabled: true,
            weather_ignore_interior: true,
            weather_specific: Vec::new(),
            weather_type: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Post-load window before evaluation resumes
    pub grace_ms: u64,
    /// Forced refreshes issued inside the grace window
    pub forced_refreshes: u32,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            grace_ms: 1500,
            forced_refreshes: 3,
        }
    }
}

/// Complete controller configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub general: GeneralConfig,
    pub movement: MovementConfig,
    pub input: InputConfig,
    pub npc: NpcConfig,
    pub smoothing: SmoothingConfig,
    pub diagonal: DiagonalConfig,
    pub slope: SlopeConfig,
    pub armor: ArmorConfig,
    pub vitals: VitalsConfig,
    pub scale: ScaleConfig,
    pub attack: AttackConfig,
    pub sprint_anim: SprintAnimConfig,
    pub rules: RulesConfig,
    pub restore: RestoreConfig,
}

fn clampf(v: f32, lo: f32, hi: f32) -> f32 {
    if v.is_finite() {
        v.clamp(lo, hi)
    } else {
        lo
    }
}

fn ordered(lo: &mut f32, hi: &mut f32) {
    if *lo > *hi {
        std::mem::swap(lo, hi);
    }
}

fn retain_valid_specs(list: &mut Vec<FormRule>, what: &str) {
    list.retain(|rule| {
        let ok = rule.spec().is_some();
        if !ok {
            warn!("Dropping {} rule with malformed form spec '{}'", what, rule.form);
        }
        ok
    });
    for rule in list.iter_mut() {
        rule.value = clampf(rule.value, -100.0, 100.0);
    }
}

impl ControllerConfig {
    /// Default document location
    pub fn default_path() -> PathBuf {
        if let Ok(p) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(p);
        }
        Path::new("Data")
            .join("SKSE")
            .join("Plugins")
            .join("SpeedController.json")
    }

    /// Load from the default path, falling back to defaults on any failure
    pub fn load_or_default() -> Self {
        let path = Self::default_path();
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Config load failed ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Load a document; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No config document at {}", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Parse a document tolerantly and clamp it
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let user: Value = serde_json::from_str(text)?;
        let mut merged = serde_json::to_value(Self::default())?;

        let mut leaves = Vec::new();
        collect_leaves(&merged, &user, String::new(), &mut leaves);

        for (pointer, value) in leaves {
            let Some(slot) = merged.pointer_mut(&pointer) else {
                continue;
            };
            let previous = std::mem::replace(slot, value);
            if serde_json::from_value::<Self>(merged.clone()).is_err() {
                warn!("Ignoring config value at '{}': wrong type or variant", pointer);
                if let Some(slot) = merged.pointer_mut(&pointer) {
                    *slot = previous;
                }
            }
        }

        let mut config: Self = serde_json::from_value(merged)?;
        config.sanitize();
        Ok(config)
    }

    /// Write the document as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Clamp every numeric tunable into its supported range
    pub fn sanitize(&mut self) {
        let g = &mut self.general;
        g.heartbeat_ms = g.heartbeat_ms.clamp(5, 5_000);
        g.eval_throttle_ms = g.eval_throttle_ms.clamp(1, 1_000);
        g.min_final_speed = clampf(g.min_final_speed, 0.0, 100.0);
        g.max_final_speed = clampf(g.max_final_speed, g.min_final_speed, 1_000.0);
        g.granularity = clampf(g.granularity, 0.001, 5.0);

        let m = &mut self.movement;
        m.reduce_out_of_combat = clampf(m.reduce_out_of_combat, 0.0, 100.0);
        m.reduce_jogging_out_of_combat = clampf(m.reduce_jogging_out_of_combat, 0.0, 100.0);
        m.reduce_drawn = clampf(m.reduce_drawn, 0.0, 100.0);
        m.reduce_sneak = clampf(m.reduce_sneak, 0.0, 100.0);
        m.increase_sprinting = clampf(m.increase_sprinting, 0.0, 100.0);

        let i = &mut self.input;
        i.toggle_cooldown_ms = i.toggle_cooldown_ms.min(5_000);
        i.sprint_latch_ms = i.sprint_latch_ms.min(2_000);

        let n = &mut self.npc;
        n.radius = clampf(n.radius, 0.0, 16_384.0);
        n.percent_of_player = clampf(n.percent_of_player, 0.0, 200.0);
        n.max_tracked = n.max_tracked.clamp(1, 1_024);

        let s = &mut self.smoothing;
        s.half_life_ms = clampf(s.half_life_ms, 1.0, 2_000.0);
        s.max_change_per_second = clampf(s.max_change_per_second, 1.0, 300.0);

        let sl = &mut self.slope;
        sl.uphill_per_deg = clampf(sl.uphill_per_deg, 0.0, 5.0);
        sl.downhill_per_deg = clampf(sl.downhill_per_deg, 0.0, 5.0);
        sl.max_abs = clampf(sl.max_abs, 0.0, 100.0);
        sl.tau = clampf(sl.tau, 0.01, 5.0);
        sl.lookback_units = clampf(sl.lookback_units, 1.0, 200.0);
        sl.max_history_sec = clampf(sl.max_history_sec, 0.1, 5.0);
        sl.min_xy_per_frame = clampf(sl.min_xy_per_frame, 0.01, 5.0);
        sl.median_n = sl.median_n.clamp(1, 10);
        sl.min_final = clampf(sl.min_final, 0.0, 500.0);
        sl.max_final = clampf(sl.max_final, 0.0, 500.0);
        ordered(&mut sl.min_final, &mut sl.max_final);

        let a = &mut self.armor;
        a.pivot = clampf(a.pivot, 0.0, 80.0);
        a.slope_move = clampf(a.slope_move, -5.0, 5.0);
        a.move_min = clampf(a.move_min, -200.0, 200.0);
        a.move_max = clampf(a.move_max, -200.0, 200.0);
        ordered(&mut a.move_min, &mut a.move_max);
        a.slope_attack = clampf(a.slope_attack, -0.2, 0.2);

        for rule in [
            &mut self.vitals.health,
            &mut self.vitals.stamina,
            &mut self.vitals.magicka,
        ] {
            rule.threshold_pct = clampf(rule.threshold_pct, 0.0, 100.0);
            rule.smooth_width = clampf(rule.smooth_width, 0.0, 100.0);
            rule.penalty = clampf(rule.penalty, 0.0, 100.0);
        }

        let sc = &mut self.scale;
        sc.per_unit = clampf(sc.per_unit, 0.0, 500.0);

        let at = &mut self.attack;
        at.base = clampf(at.base, 0.3, 20.0);
        at.weight_pivot = clampf(at.weight_pivot, 0.0, 50.0);
        at.weight_slope = clampf(at.weight_slope, -1.0, 1.0);
        at.scale_slope = clampf(at.scale_slope, -1.0, 1.0);
        at.min_mult = clampf(at.min_mult, 0.1, 10.0);
        at.max_mult = clampf(at.max_mult, 0.1, 10.0);
        ordered(&mut at.min_mult, &mut at.max_mult);

        let an = &mut self.sprint_anim;
        an.min = clampf(an.min, 0.0, 2.0);
        an.max = clampf(an.max, 0.05, 2.0);
        ordered(&mut an.min, &mut an.max);
        an.tau = clampf(an.tau, 0.01, 1.0);
        an.rate_per_sec = clampf(an.rate_per_sec, 0.1, 20.0);

        let r = &mut self.rules;
        retain_valid_specs(&mut r.location_specific, "location");
        retain_valid_specs(&mut r.location_type, "location keyword");
        retain_valid_specs(&mut r.weather_specific, "weather");
        for rule in r.weather_type.iter_mut() {
            rule.value = clampf(rule.value, -100.0, 100.0);
        }

        let rs = &mut self.restore;
        rs.grace_ms = rs.grace_ms.min(10_000);
        rs.forced_refreshes = rs.forced_refreshes.min(20);
    }
}

fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Pair every user leaf with its pointer, for keys the defaults know about
fn collect_leaves(defaults: &Value, user: &Value, prefix: String, out: &mut Vec<(String, Value)>) {
    match (defaults, user) {
        (Value::Object(known), Value::Object(given)) => {
            for (key, value) in given {
                if let Some(default_child) = known.get(key) {
                    let pointer = format!("{}/{}", prefix, escape_pointer(key));
                    collect_leaves(default_child, value, pointer, out);
                }
            }
        }
        _ => {
            if !prefix.is_empty() {
                out.push((prefix, user.clone()));
            }
        }
    }
}

/// Shared, swappable configuration
///
/// Readers take an `Arc` snapshot once per tick so a concurrent `replace`
/// never produces a torn mix of old and new settings.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<ControllerConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Immutable view for one tick
    #[inline]
    pub fn snapshot(&self) -> Arc<ControllerConfig> {
        self.inner.read().clone()
    }

    pub fn replace(&self, mut config: ControllerConfig) {
        config.sanitize();
        *self.inner.write() = Arc::new(config);
    }

    /// Copy-modify-swap convenience
    pub fn update(&self, f: impl FnOnce(&mut ControllerConfig)) {
        let mut next = (*self.snapshot()).clone();
        f(&mut next);
        self.replace(next);
    }
}
