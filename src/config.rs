// Build and lookup configuration
//
// One explicit value drives a build; the grid and thumbnail parameters it
// carries are embedded verbatim in the published record.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_INTERVAL_SECS, DEFAULT_SPRITE_COLUMNS, DEFAULT_SPRITE_ROWS, DEFAULT_THUMB_HEIGHT,
    DEFAULT_THUMB_WIDTH, DEFAULT_TOOL_TIMEOUT_SECS, MAX_CONCURRENT_FFMPEG, METADATA_FILENAME,
    METADATA_FOLDER, SPRITES_FOLDER, THUMB_QUALITY, VTT_FILENAME,
};
use crate::error::{PreviewError, Result};

/// Parameters shared by frame extraction, tiling and lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewConfig {
    /// Seconds between sampled frames.
    pub interval: f64,
    pub thumb_width: u32,
    pub thumb_height: u32,
    pub columns: u32,
    pub rows: u32,
    /// JPEG quality, 1-100.
    pub quality: u32,
    /// Upper bound on concurrent sprite builds.
    pub workers: usize,
    /// Per external-tool call.
    pub tool_timeout_secs: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL_SECS,
            thumb_width: DEFAULT_THUMB_WIDTH,
            thumb_height: DEFAULT_THUMB_HEIGHT,
            columns: DEFAULT_SPRITE_COLUMNS,
            rows: DEFAULT_SPRITE_ROWS,
            quality: THUMB_QUALITY,
            workers: MAX_CONCURRENT_FFMPEG,
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
        }
    }
}

impl PreviewConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: PreviewConfig = serde_json::from_str(&json)?;
        Ok(config)
    }

    /// Reject values no build could honor.
    pub fn validate(&self) -> Result<()> {
        if !self.interval.is_finite() || self.interval <= 0.0 {
            return Err(PreviewError::InvalidInput(format!(
                "interval must be a positive number of seconds, got {}",
                self.interval
            )));
        }
        if self.thumb_width == 0 || self.thumb_height == 0 {
            return Err(PreviewError::InvalidInput(format!(
                "thumbnail size must be non-zero, got {}x{}",
                self.thumb_width, self.thumb_height
            )));
        }
        if self.columns == 0 || self.rows == 0 {
            return Err(PreviewError::InvalidInput(format!(
                "sprite grid must be at least 1x1, got {}x{}",
                self.columns, self.rows
            )));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(PreviewError::InvalidInput(format!(
                "quality must be within 1-100, got {}",
                self.quality
            )));
        }
        if self.workers == 0 {
            return Err(PreviewError::InvalidInput("workers must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Frames held by one full sprite.
    pub fn capacity(&self) -> u32 {
        self.columns * self.rows
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// FFmpeg JPEG quality scale is 2-31 where 2 is best.
    pub fn ffmpeg_qscale(&self) -> u32 {
        let q = ((100 - self.quality.min(100)) as f32 / 100.0 * 29.0 + 2.0) as u32;
        q.clamp(2, 31)
    }
}

/// Where a build publishes its artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayout {
    pub root: PathBuf,
    pub sprites_dir: PathBuf,
    pub metadata_dir: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            sprites_dir: root.join(SPRITES_FOLDER),
            metadata_dir: root.join(METADATA_FOLDER),
            root,
        }
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.metadata_dir.join(METADATA_FILENAME)
    }

    pub fn vtt_path(&self) -> PathBuf {
        self.metadata_dir.join(VTT_FILENAME)
    }

    /// Create the published folders.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.sprites_dir)?;
        std::fs::create_dir_all(&self.metadata_dir)?;
        Ok(())
    }
}
