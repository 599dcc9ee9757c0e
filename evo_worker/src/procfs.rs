//! OS introspection source for CPU and memory readouts.
//!
//! Everything here is a small, local, synchronous read of a procfs text file.
//! A missing file (non-Linux host, process already gone) is reported as
//! `None`, never as an error.

use std::fs;
use std::path::{Path, PathBuf};

/// Page size assumed when `sysconf` cannot report one.
const FALLBACK_PAGE_SIZE: u64 = 4096;

/// Raw counter readouts consumed by the CPU sampler and threshold monitor.
pub trait ProcSource {
    /// First (aggregate `cpu`) line of `/proc/stat`.
    fn system_stat(&self) -> Option<String>;

    /// Contents of `/proc/<pid>/stat`.
    fn process_stat(&self, pid: u32) -> Option<String>;

    /// Resident set size of the current process in bytes.
    fn resident_bytes(&self) -> Option<u64>;

    /// Number of CPU cores used to scale usage percentages.
    fn cpu_count(&self) -> usize;
}

/// [`ProcSource`] backed by a procfs mount.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
    page_size: u64,
    cpus: usize,
}

impl ProcFs {
    /// Host procfs at `/proc`.
    pub fn new() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            root: PathBuf::from("/proc"),
            page_size: page_size(),
            cpus,
        }
    }

    /// Procfs-shaped tree rooted elsewhere, with a fixed core count.
    pub fn with_root(root: impl Into<PathBuf>, cpus: usize) -> Self {
        Self {
            root: root.into(),
            page_size: FALLBACK_PAGE_SIZE,
            cpus: cpus.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcSource for ProcFs {
    fn system_stat(&self) -> Option<String> {
        let content = fs::read_to_string(self.root.join("stat")).ok()?;
        content.lines().next().map(str::to_owned)
    }

    fn process_stat(&self, pid: u32) -> Option<String> {
        fs::read_to_string(self.root.join(pid.to_string()).join("stat")).ok()
    }

    fn resident_bytes(&self) -> Option<u64> {
        // statm: size resident shared text lib data dt (in pages)
        let content = fs::read_to_string(self.root.join("self").join("statm")).ok()?;
        let resident_pages: u64 = content.split_whitespace().nth(1)?.parse().ok()?;
        Some(resident_pages * self.page_size)
    }

    fn cpu_count(&self) -> usize {
        self.cpus
    }
}

fn page_size() -> u64 {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as u64 } else { FALLBACK_PAGE_SIZE }
}
