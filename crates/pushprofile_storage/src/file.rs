//! File-based persistence backend.

use crate::backend::{validate_key, PersistenceBackend};
use crate::error::StorageResult;
use parking_lot::Mutex;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// File extension used for stored values.
const VALUE_EXTENSION: &str = "bin";

/// A file-based persistence backend.
///
/// Every key maps to one file `<key>.bin` inside the backend directory.
/// Values survive process restarts.
///
/// # Durability
///
/// `archive` writes the new value to a temporary file in the same
/// directory, calls `sync_all`, and renames it over the previous file, so a
/// crash leaves either the old value or the new one on disk.
///
/// # Thread Safety
///
/// Writers are serialized by an internal lock; readers go straight to the
/// file system and see whole files thanks to the rename.
///
/// # Example
///
/// ```no_run
/// use pushprofile_storage::{FileBackend, PersistenceBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("profile-state")).unwrap();
/// backend.archive("user.current", b"snapshot").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Opens a backend rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the directory holding the value files.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{VALUE_EXTENSION}"))
    }
}

impl PersistenceBackend for FileBackend {
    fn archive(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        let _guard = self.write_lock.lock();

        let mut staged = NamedTempFile::new_in(&self.dir)?;
        staged.write_all(bytes)?;
        staged.as_file().sync_all()?;
        staged
            .persist(self.value_path(key))
            .map_err(|e| e.error)?;

        Ok(())
    }

    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        match fs::read(self.value_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let _guard = self.write_lock.lock();

        match fs::remove_file(self.value_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(VALUE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_key(stem).is_ok() {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
