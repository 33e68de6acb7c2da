//! Controller constants
//!
//! Tunables live in `ControllerConfig`; these are the fixed numbers.

/// Attribute write constants
pub mod attribute {
    /// Reference movement value (vanilla walk/run baseline)
    pub const REFERENCE_SPEED: f32 = 100.0;
    /// Smallest movement-slot change worth a write
    pub const COMMIT_EPSILON: f32 = 0.0001;
    /// Tolerance of the final floor safety net
    pub const FLOOR_EPSILON: f32 = 0.001;
    /// Magnitude of the net-zero nudge that forces dependent recomputation
    pub const REFRESH_NUDGE: f32 = 0.1;
}

/// Animation-graph schema tables, tried in priority order
pub mod graph {
    /// Boolean variables signalling an active sprint
    pub const SPRINT_FLAGS: &[&str] = &["IsSprinting", "bIsSprinting", "bSprint"];
    /// Float variables accepting a sprint playback-rate multiplier
    pub const SPRINT_RATE_VARS: &[&str] = &["SprintSpeedMult", "fSprintPlaybackRate", "SpeedSampledMult"];
    /// (x, y) move-input variables exposed by NPC graphs
    pub const NPC_INPUT_AXES: &[(&str, &str)] = &[
        ("InputDirectionX", "InputDirectionY"),
        ("fInputX", "fInputY"),
    ];
}

/// Diagonal correction constants
pub mod diagonal {
    /// Input magnitude below which the factor is 1.0
    pub const INPUT_EPSILON: f32 = 0.001;
    /// Share of the penalty kept while sprinting
    pub const SPRINT_SHARE: f32 = 0.5;
}

/// Slope estimation constants
pub mod slope {
    /// Hard clamp on estimated pitch
    pub const MAX_DEGREES: f32 = 85.0;
    /// Minimum XY span for a meaningful estimate
    pub const MIN_SPAN_XY: f32 = 1.0;
    /// No accepted path sample for this long means the entity stands still
    pub const STILL_AFTER_MS: u64 = 250;
    /// Upper bound on path buffer length regardless of history age
    pub const MAX_PATH_SAMPLES: usize = 256;
}

/// Tick driver / task queue constants
pub mod driver {
    pub const TASK_QUEUE_CAPACITY: usize = 256;
    /// Cap on the elapsed time fed to filters after a stall
    pub const MAX_DT_SECONDS: f32 = 0.5;
    /// Ticks an evicted entity may stay unavailable before its state is dropped
    pub const MAX_UNAVAILABLE_RETRIES: u32 = 40;
}

/// Persisted record constants
pub mod record {
    /// Record type tag ("SPDC" little-endian)
    pub const TAG: u32 = u32::from_le_bytes(*b"SPDC");
    pub const MIN_VERSION: u32 = 1;
    pub const CURRENT_VERSION: u32 = 5;
    /// Records claiming more payload than this are treated as corrupt
    pub const MAX_PAYLOAD: u32 = 1024;
}
