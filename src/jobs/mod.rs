// Build job coordination
//
// A build writes sprites and the index into one output directory, so only one
// build per directory may run at a time. A second request gets `Busy`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::error::{PreviewError, Result};
use crate::preview::index::IndexRecord;
use crate::preview::{self, BuildRequest, MediaBackend};

/// Output directories with a build in flight.
static ACTIVE_BUILDS: std::sync::LazyLock<Mutex<HashSet<PathBuf>>> =
    std::sync::LazyLock::new(|| Mutex::new(HashSet::new()));

/// Exclusive claim on an output directory. Released on drop.
#[derive(Debug)]
pub struct BuildLock {
    key: PathBuf,
}

impl BuildLock {
    /// Claim `output_root`, or fail with `Busy` if another build holds it.
    pub fn try_acquire(output_root: &Path) -> Result<Self> {
        let key = lock_key(output_root);
        let mut active = ACTIVE_BUILDS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !active.insert(key.clone()) {
            return Err(PreviewError::Busy(output_root.display().to_string()));
        }
        Ok(Self { key })
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        let mut active = ACTIVE_BUILDS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        active.remove(&self.key);
    }
}

/// Normalize so `out`, `./out` and `/abs/out` share one lock.
fn lock_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let absolute = std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf());
    absolute
        .components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect()
}

/// Check if a build has been cancelled.
pub fn is_cancelled(flag: &AtomicBool) -> bool {
    flag.load(Ordering::Relaxed)
}

/// Sets a cancel flag when dropped unless disarmed. Ties the lifetime of an
/// in-flight build to the request that started it.
#[derive(Debug)]
pub struct CancelOnDrop {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl CancelOnDrop {
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag, armed: true }
    }

    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::Relaxed);
        }
    }
}

/// A build of one video into one output directory.
#[derive(Clone)]
pub struct PreviewJob {
    backend: Arc<dyn MediaBackend>,
    request: BuildRequest,
}

impl PreviewJob {
    pub fn new(backend: Arc<dyn MediaBackend>, request: BuildRequest) -> Self {
        Self { backend, request }
    }

    pub fn request(&self) -> &BuildRequest {
        &self.request
    }

    /// Run the build under the directory lock.
    pub fn run(&self, cancel: &AtomicBool) -> Result<IndexRecord> {
        let root = &self.request.layout.root;
        self.request.config.validate()?;
        // The lock key is canonical only once the directory exists
        std::fs::create_dir_all(root)?;
        let _lock = BuildLock::try_acquire(root)?;

        match preview::sweep_work_dirs(root) {
            Ok(0) => {}
            Ok(n) => log::warn!("Removed {} abandoned work dir(s) in {}", n, root.display()),
            Err(e) => log::warn!("Failed to sweep work dirs in {}: {}", root.display(), e),
        }

        let started = Instant::now();
        log::info!(
            "Building preview for {} into {}",
            self.request.video.display(),
            root.display()
        );

        let result = preview::build_preview(self.backend.as_ref(), &self.request, cancel);
        match &result {
            Ok(record) => log::info!(
                "Processing complete: {} frames in {} sprite(s) ({:.1}s)",
                record.total_frames,
                record.sprite_count(),
                started.elapsed().as_secs_f64()
            ),
            Err(PreviewError::Cancelled) => log::warn!("Build cancelled after {:.1}s", started.elapsed().as_secs_f64()),
            Err(e) => log::error!("Processing failed: {}", e),
        }
        result
    }
}
