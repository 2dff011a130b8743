//! Shared scratch directory, emptied around every run.
//!
//! The directory is process-wide, so at most one run holds it at a time.
//! Every [`ScratchSpace`] over the same directory shares one lock, keyed by
//! the canonical path, however the directory was spelled and however many
//! runners were built over it. A [`ScratchLease`] clears the directory on
//! acquire and again on drop, which covers success, script failure and
//! panics unwinding through the runner.

use fn_config::SandboxSettings;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, warn};

lazy_static! {
    /// Live scratch locks by canonical root.
    static ref SCRATCH_LOCKS: Mutex<HashMap<PathBuf, Weak<Mutex<()>>>> =
        Mutex::new(HashMap::new());
}

fn lock_for(root: &Path) -> Arc<Mutex<()>> {
    if let Err(e) = fs::create_dir_all(root) {
        debug!(root = %root.display(), error = %e, "scratch root not created");
    }
    let key = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let mut locks = SCRATCH_LOCKS.lock().unwrap_or_else(|p| p.into_inner());
    locks.retain(|_, lock| lock.strong_count() > 0);
    if let Some(lock) = locks.get(&key).and_then(Weak::upgrade) {
        return lock;
    }
    let lock = Arc::new(Mutex::new(()));
    locks.insert(key, Arc::downgrade(&lock));
    lock
}

#[derive(Debug, Clone)]
pub struct ScratchSpace {
    root: PathBuf,
    enabled: bool,
    lock: Arc<Mutex<()>>,
}

impl ScratchSpace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            lock: lock_for(&root),
            root,
            enabled: true,
        }
    }

    pub fn from_settings(settings: &SandboxSettings) -> Self {
        let mut space = Self::new(&settings.scratch_dir);
        space.enabled = settings.clear_scratch;
        space
    }

    /// Keep the lock but skip clearing (debugging leftover files).
    pub fn without_clearing(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn clears(&self) -> bool {
        self.enabled
    }

    /// Remove every entry under the root. Best-effort: failures are logged
    /// and skipped. Returns the number of entries removed.
    pub fn clear(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(root = %self.root.display(), error = %e, "scratch root not readable");
                return 0;
            }
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_dir = fs::symlink_metadata(&path)
                .map(|m| m.is_dir())
                .unwrap_or(false);
            let res = if is_dir {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match res {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "scratch entry not removed"),
            }
        }
        removed
    }

    /// Take exclusive use of the scratch space, clearing it first.
    pub fn lease(&self) -> ScratchLease<'_> {
        let guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = fs::create_dir_all(&self.root) {
            debug!(root = %self.root.display(), error = %e, "scratch root not created");
        }
        let removed = self.clear();
        debug!(root = %self.root.display(), removed, "scratch leased");
        ScratchLease {
            space: self,
            _guard: guard,
        }
    }

    pub fn is_empty(&self) -> bool {
        fs::read_dir(&self.root)
            .map(|mut d| d.next().is_none())
            .unwrap_or(true)
    }
}

/// Exclusive hold on a [`ScratchSpace`] for one run.
pub struct ScratchLease<'a> {
    space: &'a ScratchSpace,
    _guard: MutexGuard<'a, ()>,
}

impl ScratchLease<'_> {
    pub fn path(&self) -> &Path {
        self.space.root()
    }
}

impl Drop for ScratchLease<'_> {
    fn drop(&mut self) {
        let removed = self.space.clear();
        debug!(root = %self.space.root.display(), removed, "scratch released");
    }
}
