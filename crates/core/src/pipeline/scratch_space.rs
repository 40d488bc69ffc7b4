use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::error::PipelineError;

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Per-run working directory: `<base>/<run-id>/faces/`.
///
/// Run ids are unique across concurrent runs in one process and across
/// processes, so parallel uploads never share files. The directory is
/// removed on drop unless [`ScratchSpace::keep`] was called.
#[derive(Debug)]
pub struct ScratchSpace {
    run_id: String,
    root: PathBuf,
    faces_dir: PathBuf,
    keep: bool,
}

impl ScratchSpace {
    pub fn create(base_dir: &Path) -> Result<Self, PipelineError> {
        let run_id = next_run_id();
        let root = base_dir.join(&run_id);
        let faces_dir = root.join("faces");
        std::fs::create_dir_all(&faces_dir).map_err(|source| PipelineError::Storage {
            path: faces_dir.clone(),
            source,
        })?;
        log::debug!("Scratch space at {}", root.display());
        Ok(Self {
            run_id,
            root,
            faces_dir,
            keep: false,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn faces_dir(&self) -> &Path {
        &self.faces_dir
    }

    /// Leaves the directory in place after the run, for inspection.
    pub fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to clean up {}: {e}", self.root.display());
            }
        }
    }
}

fn next_run_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let seq = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("run-{millis}-{}-{seq}", std::process::id())
}
