// Preview pipeline module
//
// Builds hover-scrub previews for one source video:
// - Frames: one still per interval, extracted by ffmpeg
// - Partitions: fixed-capacity grids over the ordered frames
// - Sprites: one tiled JPG per partition, built in parallel
// - Index: preview.json (+ preview.vtt) mapping time to sprite cell
//
// All intermediate files live in a scoped work directory under the output
// root. Nothing is published until every sprite built, and the index is
// written only after its sprites are in place.

pub mod frames;
pub mod index;
pub mod lookup;
pub mod partition;
pub mod sprite;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::config::{OutputLayout, PreviewConfig};
use crate::constants::WORK_DIR_PREFIX;
use crate::error::{PreviewError, Result};
use crate::metadata::{ffprobe, MediaMetadata};
use crate::tools::ToolError;

use frames::{list_frames, Frame};
use index::{finalize, generate_vtt, params_hash, sprite_url, write_atomic, write_record, IndexRecord};
use partition::{parse_sprite_file_name, plan, Partition};

/// The external media tool, seen as three blocking primitives.
pub trait MediaBackend: Send + Sync {
    /// Inspect the source video.
    fn probe(&self, video: &Path, config: &PreviewConfig, cancel: &AtomicBool) -> Result<MediaMetadata>;

    /// Write one pre-scaled still per interval into `frames_dir`, names sorting in time order.
    fn extract_frames(
        &self,
        video: &Path,
        frames_dir: &Path,
        config: &PreviewConfig,
        cancel: &AtomicBool,
    ) -> anyhow::Result<()>;

    /// Tile `frames` row-major into a `columns` x `rows` image at `output`.
    fn tile(
        &self,
        frames: &[Frame],
        columns: u32,
        rows: u32,
        config: &PreviewConfig,
        output: &Path,
        cancel: &AtomicBool,
    ) -> anyhow::Result<()>;
}

/// Production backend: ffprobe + ffmpeg.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

impl MediaBackend for FfmpegBackend {
    fn probe(&self, video: &Path, config: &PreviewConfig, cancel: &AtomicBool) -> Result<MediaMetadata> {
        ffprobe::probe(video, config.tool_timeout(), cancel)
    }

    fn extract_frames(
        &self,
        video: &Path,
        frames_dir: &Path,
        config: &PreviewConfig,
        cancel: &AtomicBool,
    ) -> anyhow::Result<()> {
        frames::extract_frames(video, frames_dir, config, cancel)?;
        Ok(())
    }

    fn tile(
        &self,
        frames: &[Frame],
        columns: u32,
        rows: u32,
        config: &PreviewConfig,
        output: &Path,
        cancel: &AtomicBool,
    ) -> anyhow::Result<()> {
        sprite::tile_frames(frames, columns, rows, config, output, cancel)
    }
}

/// Everything one build needs.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub video: PathBuf,
    pub layout: OutputLayout,
    pub config: PreviewConfig,
}

fn check_cancel(cancel: &AtomicBool) -> Result<()> {
    if crate::jobs::is_cancelled(cancel) {
        return Err(PreviewError::Cancelled);
    }
    Ok(())
}

fn extraction_failure(err: anyhow::Error) -> PreviewError {
    if let Some(ToolError::Cancelled { .. }) = err.downcast_ref::<ToolError>() {
        return PreviewError::Cancelled;
    }
    PreviewError::ExtractionFailed(format!("{:#}", err))
}

/// Run the full batch build and publish its artifacts.
pub fn build_preview(
    backend: &dyn MediaBackend,
    request: &BuildRequest,
    cancel: &AtomicBool,
) -> Result<IndexRecord> {
    let config = &request.config;
    let layout = &request.layout;

    config.validate()?;
    if !request.video.is_file() {
        return Err(PreviewError::InvalidInput(format!(
            "source video not found: {}",
            request.video.display()
        )));
    }

    layout.ensure()?;
    let fingerprint = params_hash(config, &request.video)?;

    let work = tempfile::Builder::new()
        .prefix(WORK_DIR_PREFIX)
        .tempdir_in(&layout.root)?;
    let frames_dir = work.path().join("frames");
    let staged_dir = work.path().join("sprites");
    let previous_dir = work.path().join("previous");
    std::fs::create_dir_all(&frames_dir)?;
    std::fs::create_dir_all(&staged_dir)?;
    std::fs::create_dir_all(&previous_dir)?;

    // 1. Duration (informational)
    let probed = match backend.probe(&request.video, config, cancel) {
        Ok(meta) => meta.duration_secs,
        Err(PreviewError::Cancelled) => return Err(PreviewError::Cancelled),
        Err(e) => {
            log::warn!("Could not probe {}: {}", request.video.display(), e);
            None
        }
    };
    if let Some(d) = probed {
        log::info!("Video duration: {:.3}s", d);
    }
    check_cancel(cancel)?;

    // 2. Frames
    backend
        .extract_frames(&request.video, &frames_dir, config, cancel)
        .map_err(extraction_failure)?;
    let frames = list_frames(&frames_dir)?;
    if frames.is_empty() {
        return Err(PreviewError::ExtractionFailed(
            "no frames extracted (video shorter than one interval?)".to_string(),
        ));
    }
    let total_frames = u32::try_from(frames.len()).map_err(|_| {
        PreviewError::InvalidInput(format!("too many frames: {}", frames.len()))
    })?;
    log::info!("Extracted {} frames", total_frames);

    // 3. Plan
    let partitions = plan(total_frames, config.columns, config.rows)?;
    log::info!(
        "Packing into {} sprite(s) of up to {} frames",
        partitions.len(),
        config.capacity()
    );

    // 4. Sprites (staged)
    build_sprites(backend, &partitions, &frames, &staged_dir, config, cancel)?;
    check_cancel(cancel)?;

    // 5. Publish sprites, then the index that references them
    publish_sprites(&partitions, &staged_dir, &previous_dir, &layout.sprites_dir)?;

    let urls: Vec<String> = partitions.iter().map(|p| sprite_url(p.index)).collect();
    let duration = probed.unwrap_or(total_frames as f64 * config.interval);
    let mut record = finalize(duration, config, total_frames, &partitions, &urls)?;
    record.params_hash = Some(fingerprint);

    let metadata_path = layout.metadata_path();
    write_record(&metadata_path, &record)?;
    log::info!("Metadata saved to {}", metadata_path.display());

    // The record is live from here on; later steps only warn
    if let Err(e) = write_atomic(&layout.vtt_path(), generate_vtt(&record).as_bytes()) {
        log::warn!("Failed to write {}: {}", layout.vtt_path().display(), e);
    }

    match prune_stale_sprites(&layout.sprites_dir, partitions.len()) {
        Ok(0) => {}
        Ok(n) => log::info!("Removed {} stale sprite(s)", n),
        Err(e) => log::warn!("Failed to prune stale sprites: {}", e),
    }

    Ok(record)
}

/// Build every partition's sprite into `out_dir` on up to `config.workers` threads.
/// Stops handing out partitions after the first failure and reports the
/// failure with the lowest partition index.
fn build_sprites(
    backend: &dyn MediaBackend,
    partitions: &[Partition],
    frames: &[Frame],
    out_dir: &Path,
    config: &PreviewConfig,
    cancel: &AtomicBool,
) -> Result<Vec<PathBuf>> {
    let workers = config.workers.clamp(1, partitions.len().max(1));
    let next = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let results: Mutex<Vec<(u32, Result<PathBuf>)>> = Mutex::new(Vec::with_capacity(partitions.len()));

    std::thread::scope(|s| {
        for _ in 0..workers {
            s.spawn(|| loop {
                if failed.load(Ordering::Relaxed) || cancel.load(Ordering::Relaxed) {
                    break;
                }
                let i = next.fetch_add(1, Ordering::Relaxed);
                let Some(part) = partitions.get(i) else {
                    break;
                };

                let slice = &frames[part.start_index as usize..part.end_index() as usize];
                let result = sprite::build_sprite(backend, part, slice, out_dir, config, cancel);
                match &result {
                    Ok(_) => log::info!(
                        "Built sprite {}/{} ({} frames)",
                        part.index + 1,
                        partitions.len(),
                        part.frames
                    ),
                    Err(e) => {
                        log::error!("{}", e);
                        failed.store(true, Ordering::Relaxed);
                    }
                }

                results
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push((part.index, result));
            });
        }
    });

    let mut results = results.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    results.sort_by_key(|(index, _)| *index);

    let mut paths = Vec::with_capacity(results.len());
    for (_, result) in results {
        paths.push(result?);
    }

    // Workers only stop early without an error when cancelled
    if paths.len() != partitions.len() {
        return Err(PreviewError::Cancelled);
    }
    Ok(paths)
}

/// Move staged sprites into the published folder. Sprites they replace are
/// parked in `previous_dir`; if any move fails the published folder is put
/// back the way it was, so the live record never sees a mixed set.
fn publish_sprites(
    partitions: &[Partition],
    staged_dir: &Path,
    previous_dir: &Path,
    sprites_dir: &Path,
) -> Result<()> {
    let mut placed = Vec::with_capacity(partitions.len());
    let mut parked = Vec::new();

    if let Err(e) = swap_in_sprites(partitions, staged_dir, previous_dir, sprites_dir, &mut placed, &mut parked) {
        log::error!("Publishing sprites failed, restoring previous set: {}", e);
        restore_sprites(previous_dir, sprites_dir, &placed, &parked)?;
        return Err(e.into());
    }

    sync_dir(sprites_dir);
    Ok(())
}

fn swap_in_sprites(
    partitions: &[Partition],
    staged_dir: &Path,
    previous_dir: &Path,
    sprites_dir: &Path,
    placed: &mut Vec<String>,
    parked: &mut Vec<String>,
) -> std::io::Result<()> {
    for part in partitions {
        let name = part.file_name();
        let target = sprites_dir.join(&name);
        if target.exists() {
            std::fs::rename(&target, previous_dir.join(&name))?;
            parked.push(name.clone());
        }
        std::fs::rename(staged_dir.join(&name), &target)?;
        placed.push(name);
    }
    Ok(())
}

/// Undo a partial publish: drop new sprites, move parked ones back.
fn restore_sprites(previous_dir: &Path, sprites_dir: &Path, placed: &[String], parked: &[String]) -> Result<()> {
    let mut failures = Vec::new();

    for name in placed {
        if let Err(e) = std::fs::remove_file(sprites_dir.join(name)) {
            failures.push(format!("{}: {}", name, e));
        }
    }
    for name in parked {
        if let Err(e) = std::fs::rename(previous_dir.join(name), sprites_dir.join(name)) {
            failures.push(format!("{}: {}", name, e));
        }
    }

    if failures.is_empty() {
        return Ok(());
    }
    Err(PreviewError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!(
            "sprites in {} are a mix of two builds, rebuild required ({})",
            sprites_dir.display(),
            failures.join("; ")
        ),
    )))
}

/// Best-effort fsync of a directory so renames survive a crash. Not supported on every platform.
fn sync_dir(dir: &Path) {
    if let Ok(handle) = std::fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

/// Remove sprites left over from an earlier build with more partitions.
fn prune_stale_sprites(sprites_dir: &Path, sprite_count: usize) -> Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(sprites_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let index = match name.to_str().and_then(parse_sprite_file_name) {
            Some(i) => i as usize,
            None => continue,
        };
        if index >= sprite_count {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Remove work directories abandoned by a crashed build. Call only while
/// holding the build lock for `root`.
pub fn sweep_work_dirs(root: &Path) -> Result<usize> {
    if !root.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let is_work_dir = entry
            .file_name()
            .to_str()
            .map(|n| n.starts_with(WORK_DIR_PREFIX))
            .unwrap_or(false);
        if is_work_dir && entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
