//! Per-run resources: the fork limiter and the scratch directory.
//!
//! A [`TaskRuntime`] is created at the start of every engine entry point and
//! torn down exactly once before the entry point returns, whatever happened
//! in between. Teardown is presence-guarded so an early failure (before the
//! runtime exists) never trips over a missing one.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use super::{ExecutorError, ExecutorResult};

/// Staging area for a single run.
///
/// Trait rather than a concrete type so tests can observe purge calls.
pub trait Scratch: Send + Sync {
    /// Directory modules may stage files under.
    fn path(&self) -> &Path;

    /// Remove the staging area. Called once at teardown.
    fn purge(&mut self) -> io::Result<()>;
}

/// Default scratch backed by a temp directory.
pub struct TempScratch {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl TempScratch {
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("opsgate-run-").tempdir()?;
        let path = dir.path().to_path_buf();
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }
}

impl Scratch for TempScratch {
    fn path(&self) -> &Path {
        &self.path
    }

    fn purge(&mut self) -> io::Result<()> {
        match self.dir.take() {
            Some(dir) => dir.close(),
            None => Ok(()),
        }
    }
}

/// Resources owned by one engine run.
pub struct TaskRuntime {
    semaphore: Arc<Semaphore>,
    scratch: Box<dyn Scratch>,
    torn_down: bool,
}

impl TaskRuntime {
    /// Create a runtime with a fresh temp scratch directory.
    pub fn new(forks: usize) -> ExecutorResult<Self> {
        let scratch = TempScratch::new().map_err(|e| {
            ExecutorError::Runtime(format!("failed to create scratch directory: {}", e))
        })?;
        Ok(Self::with_scratch(forks, Box::new(scratch)))
    }

    /// Create a runtime with an explicit scratch implementation.
    pub fn with_scratch(forks: usize, scratch: Box<dyn Scratch>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(forks.max(1))),
            scratch,
            torn_down: false,
        }
    }

    /// Clone of the fork limiter for spawned host tasks.
    pub fn semaphore(&self) -> Arc<Semaphore> {
        Arc::clone(&self.semaphore)
    }

    /// Acquire a fork slot.
    pub async fn acquire(semaphore: Arc<Semaphore>) -> ExecutorResult<OwnedSemaphorePermit> {
        semaphore
            .acquire_owned()
            .await
            .map_err(|e| ExecutorError::Runtime(format!("fork limiter closed: {}", e)))
    }

    /// The staging directory for this run.
    pub fn scratch_path(&self) -> PathBuf {
        self.scratch.path().to_path_buf()
    }

    /// Release the run's resources. Idempotent; purge failures are logged
    /// and swallowed so results already collected still reach the caller.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Err(e) = self.scratch.purge() {
            warn!(error = %e, "failed to purge scratch directory");
        } else {
            debug!("run resources released");
        }
    }
}

impl Drop for TaskRuntime {
    fn drop(&mut self) {
        self.teardown();
    }
}
