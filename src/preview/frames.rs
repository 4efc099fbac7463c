// Frame extraction
//
// Samples one still per interval with ffmpeg, pre-scaled to the thumbnail size.
// File names are zero-padded so lexical order is temporal order.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::AtomicBool;

use walkdir::WalkDir;

use crate::config::PreviewConfig;
use crate::constants::{FRAME_PATTERN, FRAME_PREFIX, THUMB_FORMAT};
use crate::error::Result;
use crate::tools::{run_tool, ToolError};

/// One sampled still, implicitly timestamped at `index * interval`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: u32,
    pub path: PathBuf,
}

impl Frame {
    pub fn timestamp(&self, interval: f64) -> f64 {
        self.index as f64 * interval
    }
}

/// Build the ffmpeg arguments for sampling `video` into `frames_dir`.
fn extract_args(video: &Path, frames_dir: &Path, config: &PreviewConfig) -> Vec<String> {
    let filter = format!(
        "fps=1/{},scale={}:{}",
        config.interval, config.thumb_width, config.thumb_height
    );

    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(), "error".to_string(),
        "-y".to_string(),
        "-i".to_string(), video.to_string_lossy().into_owned(),
        "-vf".to_string(), filter,
        "-q:v".to_string(), config.ffmpeg_qscale().to_string(),
        frames_dir.join(FRAME_PATTERN).to_string_lossy().into_owned(),
    ]
}

/// Run ffmpeg to sample frames from `video` into `frames_dir`.
pub fn extract_frames(
    video: &Path,
    frames_dir: &Path,
    config: &PreviewConfig,
    cancel: &AtomicBool,
) -> std::result::Result<(), ToolError> {
    let mut cmd = Command::new(crate::tools::ffmpeg_path());
    cmd.args(extract_args(video, frames_dir, config));

    log::info!(
        "Extracting frames every {}s at {}x{} from {}",
        config.interval,
        config.thumb_width,
        config.thumb_height,
        video.display()
    );
    run_tool(cmd, config.tool_timeout(), cancel)?;
    Ok(())
}

/// List extracted frames in temporal order and assign their indices.
pub fn list_frames(frames_dir: &Path) -> Result<Vec<Frame>> {
    let mut paths = Vec::new();

    for entry in WalkDir::new(frames_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
    {
        let entry = entry.map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
        })?;
        if entry.file_type().is_file() && is_frame_file(entry.path()) {
            paths.push(entry.into_path());
        }
    }

    paths.sort();

    Ok(paths
        .into_iter()
        .enumerate()
        .map(|(i, path)| Frame { index: i as u32, path })
        .collect())
}

fn is_frame_file(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    name.starts_with(FRAME_PREFIX) && ext == THUMB_FORMAT
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extract_args() {
        let config = PreviewConfig::default();
        let args = extract_args(Path::new("in.mp4"), Path::new("/tmp/frames"), &config);
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf + 1], "fps=1/2,scale=160:90");
        assert_eq!(args.last().unwrap(), "/tmp/frames/thumb-%06d.jpg");
        assert!(args.contains(&"in.mp4".to_string()));
    }

    #[test]
    fn test_extract_args_fractional_interval() {
        let config = PreviewConfig { interval: 0.5, ..Default::default() };
        let args = extract_args(Path::new("in.mp4"), Path::new("f"), &config);
        assert!(args.contains(&"fps=1/0.5,scale=160:90".to_string()));
    }

    #[test]
    fn test_list_frames_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for name in ["thumb-000003.jpg", "thumb-000001.jpg", "thumb-000002.jpg",
                     "list-0.txt", "other.jpg", "thumb-000004.png"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("thumb-000009.jpg")).unwrap();

        let frames = list_frames(dir.path()).unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["thumb-000001.jpg", "thumb-000002.jpg", "thumb-000003.jpg"]);
        assert_eq!(frames.iter().map(|f| f.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_list_frames_empty_dir() {
        let dir = TempDir::new().unwrap();
        assert!(list_frames(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_frame_timestamp() {
        let frame = Frame { index: 30, path: PathBuf::from("thumb-000031.jpg") };
        assert_eq!(frame.timestamp(2.0), 60.0);
    }
}
