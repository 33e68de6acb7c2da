//! Persisted record codec and post-load restore
//!
//! Record layout (bincode, fixed-width little endian):
//!
//! ```text
//! header  : tag u32 | version u32 | payload length u32
//! payload : jogging bool | movement f32 | diagonal f32 | baseline f32 | slope f32 | attack f32
//! ```
//!
//! Version N carries a prefix of the payload fields (v1 jogging only, v2 adds
//! movement, v3 diagonal and baseline, v4 slope, v5 attack). Readers decode
//! fields one at a time until the stored length runs out; missing fields keep
//! their defaults.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RestoreConfig;
use crate::controller::commit::{write_delta, GranularSlot};
use crate::controller::constants::record::{CURRENT_VERSION, MAX_PAYLOAD, MIN_VERSION, TAG};
use crate::controller::state::EntityState;
use crate::host::{AttributeAccess, AttributeChannel, EntityId, HostError};
use crate::metrics::Metrics;

/// Encoded header size
pub const HEADER_LEN: usize = 12;

/// Player state captured at save time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub jogging_mode: bool,
    pub movement_delta: f32,
    pub diagonal_delta: f32,
    /// Attribute value without any of our contributions; NaN when unknown
    pub baseline: f32,
    pub slope_delta: f32,
    pub attack_delta: f32,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            jogging_mode: false,
            movement_delta: 0.0,
            diagonal_delta: 0.0,
            baseline: f32::NAN,
            slope_delta: 0.0,
            attack_delta: 0.0,
        }
    }
}

impl Snapshot {
    /// Capture from the player's record and the live movement value
    pub fn capture(state: Option<&EntityState>, live_speed: f32, jogging: bool) -> Self {
        let Some(state) = state else {
            return Self {
                jogging_mode: jogging,
                baseline: live_speed,
                ..Self::default()
            };
        };
        Self {
            jogging_mode: jogging,
            movement_delta: state.movement_delta,
            diagonal_delta: state.diagonal.applied,
            baseline: live_speed - state.tracked_speed_sum(),
            slope_delta: state.slope.applied,
            attack_delta: state.attack_delta,
        }
    }

    /// Persisted contribution on the movement attribute
    pub fn speed_sum(&self) -> f32 {
        self.slope_delta + self.movement_delta + self.diagonal_delta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub tag: u32,
    pub version: u32,
    pub length: u32,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("Record truncated: {0} bytes left")]
    Truncated(usize),
    #[error("Foreign record type {0:#010X}")]
    ForeignTag(u32),
    #[error("Unsupported record version {0}")]
    UnsupportedVersion(u32),
    #[error("Record payload length {0} out of range")]
    BadLength(u32),
}

fn field_count(version: u32) -> usize {
    match version {
        1 => 1,
        2 => 2,
        3 => 4,
        4 => 5,
        _ => 6,
    }
}

fn append<T: Serialize>(out: &mut Vec<u8>, value: &T) -> Result<(), RecordError> {
    let bytes = bincode::serde::encode_to_vec(value, bincode::config::legacy())
        .map_err(|e| RecordError::Encode(e.to_string()))?;
    out.extend_from_slice(&bytes);
    Ok(())
}

/// Encode at the current version
pub fn encode_record(snapshot: &Snapshot) -> Result<Vec<u8>, RecordError> {
    encode_record_version(snapshot, CURRENT_VERSION)
}

/// Encode the field prefix belonging to `version`
pub fn encode_record_version(snapshot: &Snapshot, version: u32) -> Result<Vec<u8>, RecordError> {
    if !(MIN_VERSION..=CURRENT_VERSION).contains(&version) {
        return Err(RecordError::UnsupportedVersion(version));
    }
    let mut payload = Vec::with_capacity(32);
    append(&mut payload, &snapshot.jogging_mode)?;
    let floats = [
        snapshot.movement_delta,
        snapshot.diagonal_delta,
        snapshot.baseline,
        snapshot.slope_delta,
        snapshot.attack_delta,
    ];
    for value in floats.iter().take(field_count(version) - 1) {
        append(&mut payload, value)?;
    }

    let header = RecordHeader {
        tag: TAG,
        version,
        length: payload.len() as u32,
    };
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    append(&mut out, &header)?;
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Sequential field reader over one payload
struct FieldReader<'a> {
    data: &'a [u8],
}

impl FieldReader<'_> {
    fn next<T: DeserializeOwned>(&mut self) -> Option<T> {
        let (value, used) =
            bincode::serde::decode_from_slice::<T, _>(self.data, bincode::config::legacy()).ok()?;
        self.data = &self.data[used..];
        Some(value)
    }
}

/// Decode a payload, tolerating short records
pub fn decode_payload(version: u32, payload: &[u8]) -> Snapshot {
    let mut snapshot = Snapshot::default();
    let mut reader = FieldReader { data: payload };
    let Some(jogging) = reader.next::<bool>() else {
        return snapshot;
    };
    snapshot.jogging_mode = jogging;

    let slots = [
        &mut snapshot.movement_delta,
        &mut snapshot.diagonal_delta,
        &mut snapshot.baseline,
        &mut snapshot.slope_delta,
        &mut snapshot.attack_delta,
    ];
    for slot in slots.into_iter().take(field_count(version) - 1) {
        match reader.next::<f32>() {
            Some(value) => *slot = value,
            None => break,
        }
    }
    snapshot
}

fn read_header(data: &[u8]) -> Result<RecordHeader, RecordError> {
    if data.len() < HEADER_LEN {
        return Err(RecordError::Truncated(data.len()));
    }
    bincode::serde::decode_from_slice::<RecordHeader, _>(&data[..HEADER_LEN], bincode::config::legacy())
        .map(|(header, _)| header)
        .map_err(|_| RecordError::Truncated(data.len()))
}

/// Result of scanning a persisted blob
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RecordScan {
    /// Last valid record of ours
    pub snapshot: Option<Snapshot>,
    pub skipped: usize,
}

/// Walk every record in `blob`, skipping foreign and unsupported ones
pub fn decode_records(blob: &[u8]) -> RecordScan {
    let mut scan = RecordScan::default();
    let mut rest = blob;
    while !rest.is_empty() {
        let header = match read_header(rest) {
            Ok(header) => header,
            Err(e) => {
                warn!("Stopping record scan: {}", e);
                scan.skipped += 1;
                break;
            }
        };
        let body = &rest[HEADER_LEN..];
        if header.length > MAX_PAYLOAD || header.length as usize > body.len() {
            warn!("Stopping record scan: {}", RecordError::BadLength(header.length));
            scan.skipped += 1;
            break;
        }
        let (payload, next) = body.split_at(header.length as usize);
        rest = next;

        if header.tag != TAG {
            debug!("Skipping record: {}", RecordError::ForeignTag(header.tag));
            scan.skipped += 1;
            continue;
        }
        if !(MIN_VERSION..=CURRENT_VERSION).contains(&header.version) {
            warn!("Skipping record: {}", RecordError::UnsupportedVersion(header.version));
            scan.skipped += 1;
            continue;
        }
        scan.snapshot = Some(decode_payload(header.version, payload));
    }
    scan
}

/// Replay a snapshot onto the player
///
/// Brings the live value to the baseline, then reapplies slope, movement and
/// diagonal in that order so the result equals `baseline + sum(slots)`. The
/// persisted attack contribution is reverted; it is recomputed on the next
/// evaluation.
pub fn apply_snapshot<A: AttributeAccess + ?Sized>(
    host: &mut A,
    player: EntityId,
    snapshot: &Snapshot,
    metrics: &Metrics,
) -> Result<EntityState, HostError> {
    let live = host.read_attribute(player, AttributeChannel::SpeedMult)?;
    let baseline = if snapshot.baseline.is_finite() {
        snapshot.baseline
    } else {
        live - snapshot.speed_sum()
    };

    let mut state = EntityState::new(player, snapshot.jogging_mode);
    if !baseline.is_finite() {
        Metrics::bump(&metrics.non_finite_dropped);
        return Ok(state);
    }

    let zero = baseline - live;
    if zero != 0.0 {
        write_delta(host, player, AttributeChannel::SpeedMult, zero, metrics)?;
    }
    for (value, slot) in [
        (snapshot.slope_delta, 0),
        (snapshot.movement_delta, 1),
        (snapshot.diagonal_delta, 2),
    ] {
        if value == 0.0 || !value.is_finite() {
            continue;
        }
        if write_delta(host, player, AttributeChannel::SpeedMult, value, metrics)? {
            match slot {
                0 => {
                    state.slope = GranularSlot::with_applied(value);
                    state.slope_filtered = value;
                }
                1 => state.movement_delta = value,
                _ => state.diagonal = GranularSlot::with_applied(value),
            }
        }
    }

    if snapshot.attack_delta != 0.0 && snapshot.attack_delta.is_finite() {
        write_delta(host, player, AttributeChannel::AttackSpeed, -snapshot.attack_delta, metrics)?;
    }
    Ok(state)
}

/// What the grace window wants done this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraceStep {
    pub refresh: bool,
    pub finished: bool,
}

/// Post-load settling window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraceWindow {
    until_ms: u64,
    refreshes_left: u32,
    refresh_every_ms: u64,
    next_refresh_ms: u64,
}

impl GraceWindow {
    /// Refreshes are spread evenly, the first one immediately
    pub fn open(now_ms: u64, cfg: &RestoreConfig) -> Self {
        let spacing = cfg.grace_ms / u64::from(cfg.forced_refreshes.max(1));
        Self {
            until_ms: now_ms + cfg.grace_ms,
            refreshes_left: cfg.forced_refreshes,
            refresh_every_ms: spacing.max(1),
            next_refresh_ms: now_ms,
        }
    }

    pub fn poll(&mut self, now_ms: u64) -> GraceStep {
        let mut step = GraceStep::default();
        if self.refreshes_left > 0 && now_ms >= self.next_refresh_ms {
            self.refreshes_left -= 1;
            self.next_refresh_ms = now_ms + self.refresh_every_ms;
            step.refresh = true;
        }
        step.finished = now_ms >= self.until_ms;
        step
    }
}
