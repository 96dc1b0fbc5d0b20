//! Atomic whole-file replacement for store files.
//!
//! A write lands in `<file>.tmp` next to the target, is flushed and synced,
//! then renamed over the target. Readers see either the old file or the
//! complete new one. A `.tmp` left behind by a killed process is never read
//! and is overwritten by the next write.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{CadenceError, Result};

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// A file that is only ever replaced as a whole.
#[derive(Debug, Clone)]
pub struct AtomicFile {
    path: PathBuf,
}

/// A fully written and synced temporary file that has not replaced the
/// target yet. Dropping it without [`StagedWrite::commit`] leaves the
/// target untouched.
#[derive(Debug)]
#[must_use = "a staged write does nothing until committed"]
pub struct StagedWrite {
    tmp: PathBuf,
    target: PathBuf,
}

impl AtomicFile {
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the temporary sibling file.
    #[must_use]
    pub fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(TMP_SUFFIX);
        self.path.with_file_name(name)
    }

    /// Write `bytes` to the temporary file and sync it to disk.
    pub fn stage(&self, bytes: &[u8]) -> io::Result<StagedWrite> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.tmp_path();
        let mut tmp_file = File::create(&tmp)?;
        tmp_file.write_all(bytes)?;
        tmp_file.sync_all()?;

        Ok(StagedWrite {
            tmp,
            target: self.path.clone(),
        })
    }

    /// Replace the file with `bytes`.
    pub fn write(&self, bytes: &[u8]) -> io::Result<()> {
        self.stage(bytes)?.commit()
    }

    /// Replace the file with pretty-printed JSON.
    pub fn write_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        self.write(json.as_bytes())?;
        Ok(())
    }

    /// Read and parse the file.
    ///
    /// A missing file is `Ok(None)`. Unparseable content is a
    /// [`CadenceError::StoreCorrupted`], never silently discarded.
    pub fn read_json<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Err(CadenceError::store_corrupted(
                self.path.clone(),
                "file is empty",
            ));
        }

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| CadenceError::store_corrupted(self.path.clone(), e.to_string()))
    }
}

impl StagedWrite {
    /// Atomically move the staged file over the target.
    pub fn commit(self) -> io::Result<()> {
        fs::rename(&self.tmp, &self.target)?;
        if let Err(e) = sync_parent(&self.target) {
            warn!("Could not sync the directory of {}: {}", self.target.display(), e);
        }
        Ok(())
    }
}

/// Flush the directory entry so a committed rename survives a power loss.
#[cfg(unix)]
fn sync_parent(path: &Path) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => return Ok(()),
    };
    File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn test_file() -> (AtomicFile, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let file = AtomicFile::new(temp_dir.path().join("accounts/alice/interacted_users.json"));
        (file, temp_dir)
    }

    #[test]
    fn test_read_missing_is_none() {
        let (file, _temp_dir) = test_file();
        let loaded: Option<BTreeMap<String, u32>> = file.read_json().expect("read");
        assert!(loaded.is_none());
    }

    #[test]
    fn test_write_creates_parent_and_leaves_no_tmp() {
        let (file, _temp_dir) = test_file();
        file.write_json(&BTreeMap::from([("bob".to_string(), 1u32)]))
            .expect("write");
        assert!(file.path().exists());
        assert!(!file.tmp_path().exists());
    }

    #[test]
    fn test_kill_between_stage_and_commit_keeps_original() {
        let (file, _temp_dir) = test_file();
        let original = BTreeMap::from([("bob".to_string(), 1u32)]);
        file.write_json(&original).expect("initial write");

        // Stage a new version, then "die" before the rename.
        let staged = file.stage(b"{\"bob\": 2, \"carol\"").expect("stage");
        drop(staged);

        assert!(file.tmp_path().exists());
        let loaded: BTreeMap<String, u32> = file
            .read_json()
            .expect("original still parses")
            .expect("original still present");
        assert_eq!(loaded, original);

        // The next write overwrites the stray temporary file.
        let updated = BTreeMap::from([("bob".to_string(), 3u32)]);
        file.write_json(&updated).expect("second write");
        assert!(!file.tmp_path().exists());
        let loaded: BTreeMap<String, u32> = file.read_json().expect("read").expect("present");
        assert_eq!(loaded, updated);
    }

    #[test]
    fn test_corrupted_file_is_an_error() {
        let (file, _temp_dir) = test_file();
        file.write(b"{ not json").expect("write garbage");
        let result: Result<Option<BTreeMap<String, u32>>> = file.read_json();
        assert!(matches!(result, Err(CadenceError::StoreCorrupted { .. })));
    }

    #[test]
    fn test_empty_file_is_an_error() {
        let (file, _temp_dir) = test_file();
        file.write(b"").expect("write empty");
        let result: Result<Option<BTreeMap<String, u32>>> = file.read_json();
        assert!(matches!(result, Err(CadenceError::StoreCorrupted { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_sync_parent_reports_missing_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        assert!(sync_parent(&temp_dir.path().join("state.json")).is_ok());

        let err = sync_parent(&temp_dir.path().join("gone/state.json")).expect_err("missing dir");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_tmp_path_is_sibling() {
        let file = AtomicFile::new("/data/accounts/alice/sessions.json");
        assert_eq!(
            file.tmp_path(),
            PathBuf::from("/data/accounts/alice/sessions.json.tmp")
        );
    }
}
