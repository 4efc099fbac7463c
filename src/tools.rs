// External tool resolver and runner for ffmpeg/ffprobe
//
// Resolution order:
// 1) Environment variable override (SCRUBPREV_FFMPEG_PATH, SCRUBPREV_FFPROBE_PATH)
// 2) Sidecar next to the executable (or in bin/ beside it)
// 3) PATH fallback
//
// Every tool invocation is a blocking call with an explicit result. The runner
// polls the child so it can be killed on timeout or when the caller cancels.

use std::env;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::constants::TOOL_POLL_INTERVAL_MS;

/// Lines of stderr kept in a failure message.
const STDERR_TAIL_LINES: usize = 12;

/// Get the directory containing the current executable
fn exe_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
}

/// Resolve a tool path.
fn resolve_tool(env_key: &str, default_name: &str) -> PathBuf {
    if let Ok(v) = env::var(env_key) {
        let p = PathBuf::from(&v);
        if p.exists() {
            return p;
        }
    }

    let mut filename = default_name.to_string();
    if cfg!(windows) && !filename.to_lowercase().ends_with(".exe") {
        filename.push_str(".exe");
    }

    if let Some(dir) = exe_dir() {
        let candidate = dir.join(&filename);
        if candidate.exists() {
            return candidate;
        }

        let bin_candidate = dir.join("bin").join(&filename);
        if bin_candidate.exists() {
            return bin_candidate;
        }
    }

    PathBuf::from(default_name)
}

/// Get path to ffmpeg binary
pub fn ffmpeg_path() -> PathBuf {
    resolve_tool("SCRUBPREV_FFMPEG_PATH", "ffmpeg")
}

/// Get path to ffprobe binary
pub fn ffprobe_path() -> PathBuf {
    resolve_tool("SCRUBPREV_FFPROBE_PATH", "ffprobe")
}

/// Check if a tool is available at the resolved path
pub fn is_tool_available(tool: &str) -> bool {
    let path = match tool {
        "ffprobe" => ffprobe_path(),
        "ffmpeg" => ffmpeg_path(),
        _ => return false,
    };

    if path.exists() {
        return true;
    }

    Command::new(&path)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} timed out after {secs}s")]
    TimedOut { tool: String, secs: u64 },

    #[error("{tool} was cancelled")]
    Cancelled { tool: String },
}

/// Captured output of a successful tool run.
#[derive(Debug, Default)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Run a command to completion, killing it if `timeout` elapses or `cancel` is set.
pub fn run_tool(
    mut cmd: Command,
    timeout: Duration,
    cancel: &AtomicBool,
) -> std::result::Result<ToolOutput, ToolError> {
    let tool = tool_name(&cmd);

    if cancel.load(Ordering::Relaxed) {
        return Err(ToolError::Cancelled { tool });
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
        tool: tool.clone(),
        source,
    })?;

    // Drain both pipes on their own threads so a chatty child never blocks on a full pipe
    let stdout_reader = child.stdout.take().map(drain);
    let stderr_reader = child.stderr.take().map(drain);

    let started = Instant::now();
    let poll = Duration::from_millis(TOOL_POLL_INTERVAL_MS);

    let outcome: std::result::Result<ExitStatus, ToolError> = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Ok(status),
            Ok(None) => {
                if cancel.load(Ordering::Relaxed) {
                    log::warn!("Cancelling {} (pid {})", tool, child.id());
                    kill_quietly(&mut child);
                    break Err(ToolError::Cancelled { tool: tool.clone() });
                }
                if started.elapsed() >= timeout {
                    log::warn!("{} exceeded {:?}, killing pid {}", tool, timeout, child.id());
                    kill_quietly(&mut child);
                    break Err(ToolError::TimedOut {
                        tool: tool.clone(),
                        secs: timeout.as_secs(),
                    });
                }
                std::thread::sleep(poll);
            }
            Err(source) => {
                kill_quietly(&mut child);
                break Err(ToolError::Spawn {
                    tool: tool.clone(),
                    source,
                });
            }
        }
    };

    let stdout = join_reader(stdout_reader);
    let stderr = String::from_utf8_lossy(&join_reader(stderr_reader)).into_owned();

    let status = outcome?;
    if !status.success() {
        return Err(ToolError::Failed {
            tool,
            status: status.to_string(),
            stderr: stderr_tail(&stderr),
        });
    }

    log::debug!("{} finished in {:?}", tool, started.elapsed());
    Ok(ToolOutput { stdout, stderr })
}

fn tool_name(cmd: &Command) -> String {
    PathBuf::from(cmd.get_program())
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tool".to_string())
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn kill_quietly(child: &mut std::process::Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Keep the last few non-empty lines of stderr for error messages.
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_tool_fallback() {
        let path = resolve_tool("SCRUBPREV_TEST_NONEXISTENT", "testcmd");
        assert_eq!(path, PathBuf::from("testcmd"));
    }

    #[test]
    fn test_env_override() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();

        std::env::set_var("SCRUBPREV_TEST_TOOL", temp_file.path());
        let path = resolve_tool("SCRUBPREV_TEST_TOOL", "default");
        assert_eq!(path, temp_file.path());

        std::env::remove_var("SCRUBPREV_TEST_TOOL");
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let text: String = (0..30).map(|i| format!("line {}\n\n", i)).collect();
        let tail = stderr_tail(&text);
        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
        assert!(tail.ends_with("line 29"));
        assert!(tail.starts_with("line 18"));
    }

    #[test]
    fn test_spawn_failure() {
        let cancel = AtomicBool::new(false);
        let cmd = Command::new("scrubprev-definitely-not-a-real-tool");
        let err = run_tool(cmd, Duration::from_secs(5), &cancel).unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[test]
    fn test_precancelled_never_spawns() {
        let cancel = AtomicBool::new(true);
        let cmd = Command::new("scrubprev-definitely-not-a-real-tool");
        let err = run_tool(cmd, Duration::from_secs(5), &cancel).unwrap_err();
        assert!(matches!(err, ToolError::Cancelled { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_reports_stderr() {
        let cancel = AtomicBool::new(false);
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo broken input >&2; exit 3"]);
        match run_tool(cmd, Duration::from_secs(10), &cancel) {
            Err(ToolError::Failed { tool, stderr, .. }) => {
                assert_eq!(tool, "sh");
                assert_eq!(stderr, "broken input");
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_stdout() {
        let cancel = AtomicBool::new(false);
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf '{\"ok\":1}'"]);
        let out = run_tool(cmd, Duration::from_secs(10), &cancel).unwrap();
        assert_eq!(out.stdout, b"{\"ok\":1}");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let cancel = AtomicBool::new(false);
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let started = Instant::now();
        let err = run_tool(cmd, Duration::from_millis(200), &cancel).unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
