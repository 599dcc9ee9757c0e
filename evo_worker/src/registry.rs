//! Shared `worker index → pid` registry.
//!
//! Each worker publishes its own pid once at startup; its ring predecessor
//! reads it on every watchdog tick. Only eventual consistency is required:
//! a missing entry means "skip this tick", and a stale or reused pid is
//! tolerated rather than treated as an error.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tempfile::NamedTempFile;

use crate::error::{WorkerError, WorkerResult};

/// Cross-process pid table for one worker group.
pub trait PidRegistry {
    /// Record `pid` for worker slot `index`.
    fn publish(&mut self, index: u32, pid: u32) -> WorkerResult<()>;

    /// Pid last published for slot `index`, if any.
    fn lookup(&self, index: u32) -> Option<u32>;
}

/// Registry backed by one small file per slot in a shared directory
/// (by default under `/dev/shm`).
#[derive(Debug, Clone)]
pub struct FsPidRegistry {
    dir: PathBuf,
}

impl FsPidRegistry {
    /// Open (creating if needed) the registry directory.
    pub fn open(dir: impl Into<PathBuf>) -> WorkerResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, index: u32) -> PathBuf {
        self.dir.join(format!("worker_{index}.pid"))
    }
}

impl PidRegistry for FsPidRegistry {
    fn publish(&mut self, index: u32, pid: u32) -> WorkerResult<()> {
        let registry_err = |source| WorkerError::Registry { index, source };

        // Write-then-rename so readers never observe a half-written pid.
        // A temp file that is never persisted is removed on drop.
        let mut file = NamedTempFile::new_in(&self.dir).map_err(registry_err)?;
        writeln!(file, "{pid}").map_err(registry_err)?;
        file.persist(self.slot_path(index))
            .map_err(|e| registry_err(e.error))?;

        tracing::debug!(index, pid, dir = %self.dir.display(), "published worker pid");
        Ok(())
    }

    fn lookup(&self, index: u32) -> Option<u32> {
        fs::read_to_string(self.slot_path(index))
            .ok()?
            .trim()
            .parse()
            .ok()
    }
}

/// In-process registry. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct MemoryPidRegistry {
    slots: Rc<RefCell<HashMap<u32, u32>>>,
}

impl MemoryPidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the entry for `index`.
    pub fn remove(&self, index: u32) {
        self.slots.borrow_mut().remove(&index);
    }
}

impl PidRegistry for MemoryPidRegistry {
    fn publish(&mut self, index: u32, pid: u32) -> WorkerResult<()> {
        self.slots.borrow_mut().insert(index, pid);
        Ok(())
    }

    fn lookup(&self, index: u32) -> Option<u32> {
        self.slots.borrow().get(&index).copied()
    }
}
