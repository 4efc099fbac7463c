// Sprite sheet generation
//
// Tiles one partition's pre-sized frames row-major into a single JPG. Frame k
// lands at ((k mod columns) * W, (k div columns) * H); cells past the last
// frame stay blank. Output goes to a scoped temp file and is published by rename.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::AtomicBool;

use anyhow::{anyhow, Context};

use super::frames::Frame;
use super::partition::Partition;
use super::MediaBackend;
use crate::config::PreviewConfig;
use crate::error::{PreviewError, Result};
use crate::tools::{run_tool, ToolError};

/// Quote a path for an ffmpeg concat list entry.
fn concat_entry(path: &Path) -> String {
    let escaped = path.to_string_lossy().replace('\'', "'\\''");
    format!("file '{}'", escaped)
}

/// Render the concat demuxer list for `frames`. Paths must be absolute:
/// ffmpeg resolves relative entries against the list file's directory.
fn concat_list(frames: &[PathBuf]) -> String {
    let mut list = String::from("ffconcat version 1.0\n");
    for path in frames {
        list.push_str(&concat_entry(path));
        list.push('\n');
    }
    list
}

fn tile_args(list_path: &Path, columns: u32, rows: u32, qscale: u32, output: &Path) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(), "error".to_string(),
        "-y".to_string(),
        "-f".to_string(), "concat".to_string(),
        "-safe".to_string(), "0".to_string(),
        "-i".to_string(), list_path.to_string_lossy().into_owned(),
        "-vf".to_string(), format!("tile={}x{}", columns, rows),
        "-frames:v".to_string(), "1".to_string(),
        "-update".to_string(), "1".to_string(),
        "-q:v".to_string(), qscale.to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Tile `frames` into a `columns` x `rows` grid at `output` with ffmpeg.
/// The frame list lives in a temp file that is removed on every exit path.
pub fn tile_frames(
    frames: &[Frame],
    columns: u32,
    rows: u32,
    config: &PreviewConfig,
    output: &Path,
    cancel: &AtomicBool,
) -> anyhow::Result<()> {
    let list_dir = output
        .parent()
        .ok_or_else(|| anyhow!("sprite output has no parent directory"))?;

    let mut absolute = Vec::with_capacity(frames.len());
    for frame in frames {
        let path = frame
            .path
            .canonicalize()
            .with_context(|| format!("frame {} unreadable", frame.path.display()))?;
        absolute.push(path);
    }

    let mut list = tempfile::Builder::new()
        .prefix(".list-")
        .suffix(".txt")
        .tempfile_in(list_dir)?;
    list.write_all(concat_list(&absolute).as_bytes())?;
    list.flush()?;

    let mut cmd = Command::new(crate::tools::ffmpeg_path());
    cmd.args(tile_args(list.path(), columns, rows, config.ffmpeg_qscale(), output));

    run_tool(cmd, config.tool_timeout(), cancel)?;
    Ok(())
}

/// Map a backend failure for `partition` into the build taxonomy.
fn partition_failure(partition: u32, err: anyhow::Error) -> PreviewError {
    if let Some(ToolError::Cancelled { .. }) = err.downcast_ref::<ToolError>() {
        return PreviewError::Cancelled;
    }
    PreviewError::build_failed(partition, format!("{:#}", err))
}

/// Build the sprite for one partition and publish it into `out_dir`.
pub fn build_sprite(
    backend: &dyn MediaBackend,
    partition: &Partition,
    frames: &[Frame],
    out_dir: &Path,
    config: &PreviewConfig,
    cancel: &AtomicBool,
) -> Result<PathBuf> {
    let p = partition.index;

    if frames.len() != partition.frames as usize {
        return Err(PreviewError::build_failed(
            p,
            format!("expected {} frames, got {}", partition.frames, frames.len()),
        ));
    }
    for (k, frame) in frames.iter().enumerate() {
        let expected = partition.start_index + k as u32;
        if frame.index != expected {
            return Err(PreviewError::build_failed(
                p,
                format!("frame {} out of order (expected {})", frame.index, expected),
            ));
        }
        if !frame.path.is_file() {
            return Err(PreviewError::build_failed(
                p,
                format!("missing frame {}", frame.path.display()),
            ));
        }
    }

    let tmp_path = tempfile::Builder::new()
        .prefix(".sprite-")
        .suffix(".jpg")
        .tempfile_in(out_dir)
        .map_err(|e| PreviewError::build_failed(p, format!("temp file: {}", e)))?
        .into_temp_path();

    let first = frames.first().map(|f| f.timestamp(config.interval)).unwrap_or(0.0);
    log::debug!(
        "Tiling sprite {} ({} frames from {:.2}s, {}x{})",
        p, partition.frames, first, partition.columns, partition.rows_used
    );

    backend
        .tile(frames, partition.columns, partition.rows_used, config, &tmp_path, cancel)
        .map_err(|e| partition_failure(p, e))?;

    let size = std::fs::metadata(&tmp_path)
        .map_err(|e| PreviewError::build_failed(p, format!("sprite not created: {}", e)))?
        .len();
    if size == 0 {
        return Err(PreviewError::build_failed(p, "sprite file is empty"));
    }
    File::open(&tmp_path)
        .and_then(|f| f.sync_all())
        .map_err(|e| PreviewError::build_failed(p, format!("sync: {}", e)))?;

    let final_path = out_dir.join(partition.file_name());
    tmp_path
        .persist(&final_path)
        .map_err(|e| PreviewError::build_failed(p, format!("publish: {}", e.error)))?;

    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MediaMetadata;
    use crate::preview::partition::plan;
    use tempfile::TempDir;

    /// Writes the frame count into the sprite, or fails on demand.
    struct StubTiler {
        fail: bool,
    }

    impl MediaBackend for StubTiler {
        fn probe(&self, _: &Path, _: &PreviewConfig, _: &AtomicBool) -> Result<MediaMetadata> {
            Ok(MediaMetadata::default())
        }

        fn extract_frames(&self, _: &Path, _: &Path, _: &PreviewConfig, _: &AtomicBool) -> anyhow::Result<()> {
            Ok(())
        }

        fn tile(
            &self,
            frames: &[Frame],
            columns: u32,
            rows: u32,
            _: &PreviewConfig,
            output: &Path,
            _: &AtomicBool,
        ) -> anyhow::Result<()> {
            if self.fail {
                std::fs::write(output, b"partial")?;
                return Err(anyhow!("tile exploded"));
            }
            std::fs::write(output, format!("{} {}x{}", frames.len(), columns, rows))?;
            Ok(())
        }
    }

    fn make_frames(dir: &Path, start: u32, count: u32) -> Vec<Frame> {
        (start..start + count)
            .map(|i| {
                let path = dir.join(format!("thumb-{:06}.jpg", i + 1));
                std::fs::write(&path, b"jpg").unwrap();
                Frame { index: i, path }
            })
            .collect()
    }

    fn visible_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_concat_entry_escapes_quotes() {
        assert_eq!(
            concat_entry(Path::new("/v/dad's clip/thumb-000001.jpg")),
            "file '/v/dad'\\''s clip/thumb-000001.jpg'"
        );
    }

    #[test]
    fn test_concat_list_keeps_order() {
        let list = concat_list(&[PathBuf::from("/f/b.jpg"), PathBuf::from("/f/a.jpg")]);
        assert_eq!(list, "ffconcat version 1.0\nfile '/f/b.jpg'\nfile '/f/a.jpg'\n");
    }

    #[test]
    fn test_tile_args_grid() {
        let args = tile_args(Path::new("l.txt"), 5, 1, 6, Path::new("out.jpg"));
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf + 1], "tile=5x1");
        assert_eq!(args.last().unwrap(), "out.jpg");
    }

    #[test]
    fn test_build_sprite_publishes_named_file() {
        let tmp = TempDir::new().unwrap();
        let frames_dir = tmp.path().join("frames");
        let out_dir = tmp.path().join("sprites");
        std::fs::create_dir_all(&frames_dir).unwrap();
        std::fs::create_dir_all(&out_dir).unwrap();

        let part = plan(52, 5, 5).unwrap()[2];
        let frames = make_frames(&frames_dir, 50, 2);
        let cancel = AtomicBool::new(false);

        let path = build_sprite(&StubTiler { fail: false }, &part, &frames, &out_dir,
                                &PreviewConfig::default(), &cancel).unwrap();

        assert_eq!(path, out_dir.join("sprite-002.jpg"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "2 5x1");
        assert_eq!(visible_files(&out_dir), vec!["sprite-002.jpg"]);
    }

    #[test]
    fn test_missing_frame_fails_without_output() {
        let tmp = TempDir::new().unwrap();
        let part = plan(3, 5, 5).unwrap()[0];
        let frames = make_frames(tmp.path(), 0, 3);
        std::fs::remove_file(&frames[1].path).unwrap();
        let out_dir = tmp.path().join("sprites");
        std::fs::create_dir_all(&out_dir).unwrap();

        let err = build_sprite(&StubTiler { fail: false }, &part, &frames, &out_dir,
                               &PreviewConfig::default(), &AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, PreviewError::BuildFailed { partition: 0, .. }));
        assert!(visible_files(&out_dir).is_empty());
    }

    #[test]
    fn test_frame_count_mismatch() {
        let tmp = TempDir::new().unwrap();
        let part = plan(30, 5, 5).unwrap()[1];
        let frames = make_frames(tmp.path(), 25, 4);

        let err = build_sprite(&StubTiler { fail: false }, &part, &frames, tmp.path(),
                               &PreviewConfig::default(), &AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, PreviewError::BuildFailed { partition: 1, .. }));
    }

    #[test]
    fn test_tile_failure_removes_partial_output() {
        let tmp = TempDir::new().unwrap();
        let frames_dir = tmp.path().join("frames");
        let out_dir = tmp.path().join("sprites");
        std::fs::create_dir_all(&frames_dir).unwrap();
        std::fs::create_dir_all(&out_dir).unwrap();

        let part = plan(4, 2, 2).unwrap()[0];
        let frames = make_frames(&frames_dir, 0, 4);

        let err = build_sprite(&StubTiler { fail: true }, &part, &frames, &out_dir,
                               &PreviewConfig::default(), &AtomicBool::new(false)).unwrap_err();
        match err {
            PreviewError::BuildFailed { partition, reason } => {
                assert_eq!(partition, 0);
                assert!(reason.contains("tile exploded"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(visible_files(&out_dir).is_empty());
    }

    #[test]
    fn test_cancelled_tool_maps_to_cancelled() {
        let err = partition_failure(4, anyhow::Error::new(ToolError::Cancelled { tool: "ffmpeg".into() }));
        assert!(matches!(err, PreviewError::Cancelled));
        let err = partition_failure(4, anyhow!("boom"));
        assert!(matches!(err, PreviewError::BuildFailed { partition: 4, .. }));
    }
}
