//! Test fixtures for account directories.
//!
//! Provides a temporary `accounts/` root with one account, optional
//! white/black lists and a minimal campaign configuration.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::account::Account;
use crate::config::CampaignConfig;
use crate::session::SessionHistory;
use crate::storage::InteractionStore;

/// A temporary accounts root holding one account.
///
/// Automatically cleans up when dropped.
///
/// # Example
///
/// ```rust,ignore
/// let fixture = AccountFixture::new("alice").with_whitelist(&["friend"]);
/// let store = fixture.store();
/// assert!(store.in_whitelist("friend"));
/// ```
pub struct AccountFixture {
    temp_dir: TempDir,
    username: String,
}

impl AccountFixture {
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new(username: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let fixture = Self {
            temp_dir,
            username: username.to_string(),
        };
        fixture.account().ensure_dir().expect("Failed to create account dir");
        fixture
    }

    #[must_use]
    pub fn with_whitelist(self, users: &[&str]) -> Self {
        self.write_file(crate::account::FILENAME_WHITELIST, &users.join("\n"));
        self
    }

    #[must_use]
    pub fn with_blacklist(self, users: &[&str]) -> Self {
        self.write_file(crate::account::FILENAME_BLACKLIST, &users.join("\n"));
        self
    }

    /// The accounts root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// The account directory.
    #[must_use]
    pub fn dir(&self) -> PathBuf {
        self.account().dir().to_path_buf()
    }

    #[must_use]
    pub fn account(&self) -> Account {
        Account::new(self.root(), &self.username)
    }

    /// Minimal configuration: no jobs, no working hours, instant restarts.
    #[must_use]
    pub fn config(&self) -> CampaignConfig {
        let mut config = CampaignConfig::new(&self.username);
        config.restart_wait = crate::config::ValueRange::fixed(0);
        config.device.profile_command = vec!["driver".to_string(), "profile".to_string()];
        config
    }

    /// # Panics
    ///
    /// Panics if the store cannot be loaded.
    #[must_use]
    pub fn store(&self) -> InteractionStore {
        InteractionStore::load(&self.account()).expect("Failed to load store")
    }

    /// # Panics
    ///
    /// Panics if the history cannot be loaded.
    #[must_use]
    pub fn history(&self) -> SessionHistory {
        SessionHistory::load(&self.account()).expect("Failed to load history")
    }

    /// Write a file relative to the account directory.
    ///
    /// # Panics
    ///
    /// Panics if the write fails.
    pub fn write_file(&self, relative_path: &str, content: &str) {
        let path = self.dir().join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(path, content).expect("Failed to write fixture file");
    }

    /// # Panics
    ///
    /// Panics if the file cannot be read.
    #[must_use]
    pub fn read_file(&self, relative_path: &str) -> String {
        std::fs::read_to_string(self.dir().join(relative_path)).expect("Failed to read fixture file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_account_dir() {
        let fixture = AccountFixture::new("alice");
        assert!(fixture.dir().is_dir());
        assert_eq!(fixture.account().username(), "alice");
        assert!(fixture.store().is_empty());
        assert!(fixture.history().is_empty());
    }

    #[test]
    fn test_fixture_lists() {
        let fixture = AccountFixture::new("alice")
            .with_whitelist(&["friend"])
            .with_blacklist(&["@spammer"]);
        let store = fixture.store();
        assert!(store.in_whitelist("friend"));
        assert!(store.in_blacklist("spammer"));
    }

    #[test]
    fn test_write_and_read_file() {
        let fixture = AccountFixture::new("alice");
        fixture.write_file("nested/file.txt", "content");
        assert_eq!(fixture.read_file("nested/file.txt"), "content");
    }
}
