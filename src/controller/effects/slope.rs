//! Terrain slope estimation over a distance-windowed path history

use std::collections::VecDeque;

use crate::config::SlopeConfig;
use crate::controller::constants::slope::{MAX_DEGREES, MAX_PATH_SAMPLES, MIN_SPAN_XY, STILL_AFTER_MS};
use crate::controller::state::PathSample;
use crate::util::vec3::Vec3;

/// Age out old samples, then append `position` if it moved far enough in XY
///
/// Returns true if a sample was appended.
pub fn push_sample(path: &mut VecDeque<PathSample>, position: Vec3, now_ms: u64, cfg: &SlopeConfig) -> bool {
    if !position.is_finite() {
        return false;
    }

    let max_age_ms = (cfg.max_history_sec.max(0.0) * 1000.0) as u64;
    while let Some(front) = path.front() {
        if now_ms.saturating_sub(front.timestamp_ms) > max_age_ms {
            path.pop_front();
        } else {
            break;
        }
    }

    let cumulative_xy = match path.back() {
        Some(last) => {
            let step = last.position.distance_xy_to(position);
            if step < cfg.min_xy_per_frame {
                return false;
            }
            last.cumulative_xy + step
        }
        None => 0.0,
    };

    if path.len() >= MAX_PATH_SAMPLES {
        path.pop_front();
    }
    path.push_back(PathSample {
        position,
        cumulative_xy,
        timestamp_ms: now_ms,
    });
    true
}

/// Near-zero recent XY movement
pub fn is_still(path: &VecDeque<PathSample>, now_ms: u64) -> bool {
    match path.back() {
        Some(last) => path.len() < 2 || now_ms.saturating_sub(last.timestamp_ms) > STILL_AFTER_MS,
        None => true,
    }
}

/// Pitch in degrees between the newest sample and the one `lookback` behind it
pub fn estimate_degrees(path: &VecDeque<PathSample>, lookback: f32) -> Option<f32> {
    let current = path.back()?;
    if path.len() < 2 {
        return None;
    }
    let wanted = current.cumulative_xy - lookback;
    let anchor = path
        .iter()
        .rev()
        .skip(1)
        .find(|s| s.cumulative_xy <= wanted)
        .or_else(|| path.front())?;

    let dxy = current.cumulative_xy - anchor.cumulative_xy;
    if dxy < MIN_SPAN_XY {
        return None;
    }
    let dz = current.position.z - anchor.position.z;
    let degrees = dz.atan2(dxy).to_degrees();
    degrees.is_finite().then(|| degrees.clamp(-MAX_DEGREES, MAX_DEGREES))
}

/// Median of a short window (mean of the middle pair for even lengths)
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: smallvec::SmallVec<[f32; 10]> = values.iter().copied().collect();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) * 0.5)
    } else {
        Some(sorted[mid])
    }
}

/// Signed speed correction for a pitch
pub fn slope_target(degrees: f32, cfg: &SlopeConfig) -> f32 {
    let raw = if degrees > 0.0 {
        -cfg.uphill_per_deg * degrees
    } else {
        cfg.downhill_per_deg * degrees.abs()
    };
    raw.clamp(-cfg.max_abs, cfg.max_abs)
}
