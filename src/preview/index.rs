// Preview index record
//
// The single published artifact: global sampling and grid parameters plus one
// descriptor per sprite. Built from the partition plan verbatim, so the
// sprites array is sorted, contiguous and sums to total_frames by construction.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::partition::{sprite_file_name, Partition};
use crate::config::PreviewConfig;
use crate::constants::SPRITES_URL_PREFIX;
use crate::error::{PreviewError, Result};

/// Where one sprite lives and which frames it holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpriteDescriptor {
    pub url: String,
    pub start_index: u32,
    pub frames: u32,
    pub columns: u32,
    pub rows: u32,
}

/// Published mapping from frame index to sprite file and grid geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecord {
    pub duration: f64,
    pub interval: f64,
    pub thumb_width: u32,
    pub thumb_height: u32,
    #[serde(alias = "totalThumbs")]
    pub total_frames: u32,
    pub thumbs_per_sprite: u32,
    /// Grid shape the build used. Older records omit it.
    #[serde(default)]
    pub columns: u32,
    #[serde(default)]
    pub rows: u32,
    pub sprites: Vec<SpriteDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params_hash: Option<String>,
}

impl IndexRecord {
    pub fn sprite_count(&self) -> usize {
        self.sprites.len()
    }
}

/// Public URL of sprite `index`.
pub fn sprite_url(index: u32) -> String {
    format!("{}/{}", SPRITES_URL_PREFIX, sprite_file_name(index))
}

/// Aggregate the partition plan and build parameters into a record.
pub fn finalize(
    duration: f64,
    config: &PreviewConfig,
    total_frames: u32,
    partitions: &[Partition],
    sprite_urls: &[String],
) -> Result<IndexRecord> {
    if partitions.len() != sprite_urls.len() {
        return Err(PreviewError::InvalidInput(format!(
            "{} partitions but {} sprite urls",
            partitions.len(),
            sprite_urls.len()
        )));
    }

    let sprites = partitions
        .iter()
        .zip(sprite_urls)
        .map(|(p, url)| SpriteDescriptor {
            url: url.clone(),
            start_index: p.start_index,
            frames: p.frames,
            columns: p.columns,
            rows: p.rows_used,
        })
        .collect();

    Ok(IndexRecord {
        duration,
        interval: config.interval,
        thumb_width: config.thumb_width,
        thumb_height: config.thumb_height,
        total_frames,
        thumbs_per_sprite: config.capacity(),
        columns: config.columns,
        rows: config.rows,
        sprites,
        generated_at: Some(chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        params_hash: None,
    })
}

/// Write `bytes` to `path` so readers see either the old file or the new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        PreviewError::InvalidInput(format!("{} has no parent directory", path.display()))
    })?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".preview-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PreviewError::Io(e.error))?;
    Ok(())
}

/// Durably publish the record as pretty JSON.
pub fn write_record(path: &Path, record: &IndexRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    write_atomic(path, json.as_bytes())
}

/// Load a published record.
pub fn read_record(path: &Path) -> Result<IndexRecord> {
    let json = std::fs::read_to_string(path)?;
    let record: IndexRecord = serde_json::from_str(&json)?;
    Ok(record)
}

/// Fingerprint of everything that shapes the output: build parameters and the
/// source file's identity. Worker count and timeouts do not participate.
pub fn params_hash(config: &PreviewConfig, video: &Path) -> Result<String> {
    let meta = std::fs::metadata(video)?;
    let modified = meta
        .modified()
        .ok()
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339());

    let fingerprint = serde_json::json!({
        "interval": config.interval,
        "thumbWidth": config.thumb_width,
        "thumbHeight": config.thumb_height,
        "columns": config.columns,
        "rows": config.rows,
        "quality": config.quality,
        "source": video.to_string_lossy(),
        "sourceSize": meta.len(),
        "sourceModified": modified,
    });

    let hash = blake3::hash(fingerprint.to_string().as_bytes());
    Ok(hash.to_hex()[..16].to_string())
}

/// True when `record` was built from the same source and parameters.
pub fn is_fresh(record: &IndexRecord, hash: &str) -> bool {
    record.params_hash.as_deref() == Some(hash)
}

/// Generate a WebVTT thumbnail track: one cue per frame pointing at its sprite cell.
pub fn generate_vtt(record: &IndexRecord) -> String {
    let mut vtt = String::from("WEBVTT\n\n");

    for sprite in &record.sprites {
        let columns = sprite.columns.max(1);
        for k in 0..sprite.frames {
            let global = sprite.start_index + k;
            let start = global as f64 * record.interval;
            let end = ((global + 1) as f64 * record.interval)
                .min(record.duration)
                .max(start);

            let x = (k % columns) * record.thumb_width;
            let y = (k / columns) * record.thumb_height;

            vtt.push_str(&format!(
                "{} --> {}\n{}#xywh={},{},{},{}\n\n",
                format_vtt_time(secs_to_ms(start)),
                format_vtt_time(secs_to_ms(end)),
                sprite.url,
                x, y, record.thumb_width, record.thumb_height
            ));
        }
    }

    vtt
}

fn secs_to_ms(secs: f64) -> u64 {
    (secs * 1000.0).round().max(0.0) as u64
}

/// Format milliseconds as VTT timestamp (HH:MM:SS.mmm).
fn format_vtt_time(ms: u64) -> String {
    let hours = ms / (60 * 60 * 1000);
    let minutes = (ms % (60 * 60 * 1000)) / (60 * 1000);
    let seconds = (ms % (60 * 1000)) / 1000;
    let millis = ms % 1000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}
