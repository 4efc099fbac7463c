// Source video metadata
//
// Duration is informational only: the extracted frame count is the ground
// truth for partitioning and lookup.

pub mod ffprobe;

use serde::{Deserialize, Serialize};

/// What the build needs to know about the source video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}
