//! Per-account directory layout and process ownership.
//!
//! Every component that touches disk receives an [`Account`] handle instead
//! of reading a process-wide "current user". The handle knows where each
//! file lives:
//!
//! ```text
//! accounts/<username>/
//! ├── config.toml
//! ├── interacted_users.json
//! ├── history_filters_users.json
//! ├── sessions.json
//! ├── whitelist.txt / blacklist.txt
//! ├── logs/run-<timestamp>.log
//! ├── crashes/crash-<timestamp>.json
//! └── .cadence.lock
//! ```

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::{CadenceError, Result};

/// Default root holding one directory per account.
pub const ACCOUNTS_DIR: &str = "accounts";

pub const FILENAME_INTERACTED_USERS: &str = "interacted_users.json";
pub const FILENAME_HISTORY_FILTERS: &str = "history_filters_users.json";
pub const FILENAME_SESSIONS: &str = "sessions.json";
pub const FILENAME_WHITELIST: &str = "whitelist.txt";
pub const FILENAME_BLACKLIST: &str = "blacklist.txt";
pub const FILENAME_CONFIG: &str = "config.toml";
const FILENAME_LOCK: &str = ".cadence.lock";

/// Handle on one account's on-disk state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    username: String,
    dir: PathBuf,
}

impl Account {
    /// Creates a handle for `username` under `accounts_root`.
    #[must_use]
    pub fn new(accounts_root: impl AsRef<Path>, username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            dir: accounts_root.as_ref().join(&username),
            username,
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn interacted_users_path(&self) -> PathBuf {
        self.dir.join(FILENAME_INTERACTED_USERS)
    }

    #[must_use]
    pub fn history_filters_path(&self) -> PathBuf {
        self.dir.join(FILENAME_HISTORY_FILTERS)
    }

    #[must_use]
    pub fn sessions_path(&self) -> PathBuf {
        self.dir.join(FILENAME_SESSIONS)
    }

    #[must_use]
    pub fn whitelist_path(&self) -> PathBuf {
        self.dir.join(FILENAME_WHITELIST)
    }

    #[must_use]
    pub fn blacklist_path(&self) -> PathBuf {
        self.dir.join(FILENAME_BLACKLIST)
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.dir.join(FILENAME_CONFIG)
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.dir.join("logs")
    }

    #[must_use]
    pub fn crashes_dir(&self) -> PathBuf {
        self.dir.join("crashes")
    }

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(FILENAME_LOCK)
    }

    /// Create the account directory if needed.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Take exclusive ownership of this account for the process lifetime.
    ///
    /// Fails fast with [`CadenceError::AccountLocked`] when another process
    /// holds the lock. The lock is released when the guard is dropped.
    pub fn lock(&self) -> Result<AccountLock> {
        self.ensure_dir()?;
        let path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        FileExt::try_lock_exclusive(&file).map_err(|_| CadenceError::AccountLocked {
            account: self.username.clone(),
            path: path.clone(),
        })?;

        debug!("Acquired account lock {}", path.display());
        Ok(AccountLock { file, path })
    }
}

/// Guard holding the account lock.
#[derive(Debug)]
pub struct AccountLock {
    file: File,
    path: PathBuf,
}

impl AccountLock {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AccountLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_account_paths() {
        let account = Account::new("/data/accounts", "alice");
        assert_eq!(account.username(), "alice");
        assert_eq!(account.dir(), Path::new("/data/accounts/alice"));
        assert_eq!(
            account.sessions_path(),
            PathBuf::from("/data/accounts/alice/sessions.json")
        );
        assert_eq!(
            account.history_filters_path(),
            PathBuf::from("/data/accounts/alice/history_filters_users.json")
        );
    }

    #[test]
    fn test_second_lock_fails_fast() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let account = Account::new(temp_dir.path(), "alice");

        let guard = account.lock().expect("first lock");
        let second = account.lock();
        assert!(matches!(second, Err(CadenceError::AccountLocked { .. })));

        drop(guard);
        assert!(account.lock().is_ok());
    }
}
