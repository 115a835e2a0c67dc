//! Append-only JSON store of registered account fixtures
//!
//! The file is a single JSON array. Concurrent runs share it, so every append
//! holds an exclusive lock on a sibling `.lock` file for the whole
//! read-modify-write, and the new array replaces the old one by rename.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::AccountInfo;
use crate::error::E2eResult;

/// Serializes appends between tasks of this process; the file lock covers
/// other processes.
static APPEND_GUARD: parking_lot::Mutex<()> = parking_lot::const_mutex(());

#[derive(Debug, Clone)]
pub struct FixtureSink {
    path: PathBuf,
}

impl FixtureSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "fixtures".into());
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Append one account record. Returns the number of stored records.
    pub fn append(&self, info: &AccountInfo) -> E2eResult<usize> {
        let dir = self.dir();
        fs::create_dir_all(&dir)?;

        let _guard = APPEND_GUARD.lock();
        let _file_lock = FileLock::acquire(&self.lock_path())?;

        let mut records = self.read_array();
        records.push(serde_json::to_value(info)?);

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        write_pretty(tmp.as_file_mut(), &records)?;
        tmp.as_file_mut().flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        info!("Saved account {} to {}", info.user_name, self.path.display());
        Ok(records.len())
    }

    /// Read back everything stored so far
    pub fn records(&self) -> Vec<Value> {
        self.read_array()
    }

    // Unreadable, unparsable or non-array content counts as empty.
    fn read_array(&self) -> Vec<Value> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Cannot read {}: {}, starting fresh", self.path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                warn!("{} does not hold a JSON array, overwriting", self.path.display());
                Vec::new()
            }
            Err(e) => {
                warn!("{} is not valid JSON ({}), overwriting", self.path.display(), e);
                Vec::new()
            }
        }
    }
}

fn write_pretty(out: &mut File, records: &[Value]) -> E2eResult<()> {
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(out, formatter);
    records.serialize(&mut ser)?;
    Ok(())
}

/// Exclusive advisory lock, released on drop
struct FileLock {
    #[cfg(unix)]
    _lock: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

impl FileLock {
    fn acquire(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        debug!("Locking {}", path.display());

        #[cfg(unix)]
        {
            use nix::fcntl::{Flock, FlockArg};

            let lock = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| io::Error::from(errno))?;
            Ok(Self { _lock: lock })
        }

        #[cfg(not(unix))]
        {
            Ok(Self { _file: file })
        }
    }
}
