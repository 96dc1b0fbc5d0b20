//! Append-only session history (`sessions.json`).

use tracing::{debug, info};

use super::SessionState;
use crate::account::Account;
use crate::error::Result;
use crate::storage::AtomicFile;

/// Every finished session of one account, oldest first.
///
/// Sessions are only ever appended; the file is rewritten atomically in
/// full after each append so a crash leaves the previous history intact.
#[derive(Debug)]
pub struct SessionHistory {
    file: AtomicFile,
    sessions: Vec<SessionState>,
}

impl SessionHistory {
    /// Load the history for `account`. A missing file is an empty history.
    pub fn load(account: &Account) -> Result<Self> {
        let file = AtomicFile::new(account.sessions_path());
        let sessions: Vec<SessionState> = file.read_json()?.unwrap_or_default();
        debug!("Loaded {} previous sessions", sessions.len());
        Ok(Self { file, sessions })
    }

    /// Append a session and persist the whole history.
    ///
    /// The session is marked finished if it was not already.
    pub fn append(&mut self, mut session: SessionState) -> Result<()> {
        session.finish();
        info!(session = %session.id, "Session saved to {}", self.file.path().display());
        self.sessions.push(session);
        self.persist()
    }

    /// Rewrite the history file.
    pub fn persist(&self) -> Result<()> {
        self.file.write_json(&self.sessions)
    }

    #[must_use]
    pub fn sessions(&self) -> &[SessionState] {
        &self.sessions
    }

    /// The `n` most recent sessions, oldest first.
    #[must_use]
    pub fn last(&self, n: usize) -> &[SessionState] {
        let start = self.sessions.len().saturating_sub(n);
        &self.sessions[start..]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
