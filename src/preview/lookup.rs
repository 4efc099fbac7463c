// Hover lookup
//
// Maps a playback time to a rectangle inside one sprite. Runs on every pointer
// move, so it is constant time and never fails: out-of-range times simply
// have no preview.

use serde::Serialize;

use super::index::IndexRecord;
use crate::constants::TOOLTIP_GAP_PX;

const SNAP_EPSILON: f64 = 1e-9;

/// The sprite cell to show for a given time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoverFrame {
    pub sprite_url: String,
    pub pixel_x: u32,
    pub pixel_y: u32,
    pub width: u32,
    pub height: u32,
    pub index: u32,
    pub sprite_index: u32,
    pub local_index: u32,
}

impl HoverFrame {
    /// CSS `background-position` that reveals this cell.
    pub fn background_position(&self) -> String {
        format!("-{}px -{}px", self.pixel_x, self.pixel_y)
    }
}

/// Locate the sprite cell for `time_secs`, or `None` if no frame covers it.
pub fn locate(time_secs: f64, record: &IndexRecord) -> Option<HoverFrame> {
    if !time_secs.is_finite() || !(record.interval > 0.0) || record.thumbs_per_sprite == 0 {
        return None;
    }

    let index = frame_position(time_secs / record.interval);
    if index < 0.0 || index >= record.total_frames as f64 {
        return None;
    }
    let index = index as u32;

    let sprite_index = index / record.thumbs_per_sprite;
    let sprite = record.sprites.get(sprite_index as usize)?;

    let local_index = index.checked_sub(sprite.start_index)?;
    if local_index >= sprite.frames || sprite.columns == 0 {
        return None;
    }

    Some(HoverFrame {
        sprite_url: sprite.url.clone(),
        pixel_x: (local_index % sprite.columns) * record.thumb_width,
        pixel_y: (local_index / sprite.columns) * record.thumb_height,
        width: record.thumb_width,
        height: record.thumb_height,
        index,
        sprite_index,
        local_index,
    })
}

/// Floor of `quotient`, snapping values within rounding error of an integer
/// onto it. `index * interval / interval` can land just below `index`.
fn frame_position(quotient: f64) -> f64 {
    let nearest = quotient.round();
    if (quotient - nearest).abs() <= SNAP_EPSILON * nearest.abs().max(1.0) {
        nearest
    } else {
        quotient.floor()
    }
}

/// Playback time under a pointer at `fraction` (0.0 = left edge, 1.0 = right edge) of the seek bar.
pub fn time_at_pointer(fraction: f64, duration: f64) -> f64 {
    if !fraction.is_finite() || !duration.is_finite() {
        return 0.0;
    }
    fraction.clamp(0.0, 1.0) * duration.max(0.0)
}

/// Top-left corner for the hover tooltip: centered on the pointer, just above it.
pub fn tooltip_origin(pointer_x: f64, pointer_y: f64, width: u32, height: u32) -> (f64, f64) {
    (
        pointer_x - width as f64 / 2.0,
        pointer_y - height as f64 - TOOLTIP_GAP_PX,
    )
}
