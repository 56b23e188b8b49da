//! Credential storage for the authenticated session.
//!
//! The store is the single piece of shared mutable state in the client: it
//! holds the current [`Credential`] pair and the cached [`Role`]. It never
//! performs network I/O. Two implementations are provided:
//! - [`MemoryCredentialStore`] lives as long as the process
//! - [`FileCredentialStore`] persists the session encrypted on disk

use crate::auth::models::Credential;
use crate::errors::{ClientError, ClientResult};
use crate::models::Role;
use crate::utils::crypto::StringCrypto;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Holder of the current credential pair and cached role.
pub trait CredentialStore: Send + Sync {
    /// Returns the stored credential, if any.
    fn get(&self) -> ClientResult<Option<Credential>>;

    /// Replaces the credential pair as a unit. The cached role is kept.
    fn set(&self, credential: Credential) -> ClientResult<()>;

    /// Returns the cached role, if one was recorded for this session.
    fn role(&self) -> ClientResult<Option<Role>>;

    /// Records the role of the authenticated user.
    fn set_role(&self, role: Role) -> ClientResult<()>;

    /// Drops the credential and the cached role. Idempotent.
    fn clear(&self) -> ClientResult<()>;

    /// Replaces the credential (or, with `None`, clears the session) only if
    /// the stored pair still carries `presented_refresh`. Returns whether the
    /// store was changed.
    ///
    /// Used by token refresh so a late result for an ended session never
    /// touches the session that replaced it.
    fn swap_if_current(
        &self,
        presented_refresh: &str,
        replacement: Option<Credential>,
    ) -> ClientResult<bool>;
}

fn holds_refresh(session: &StoredSession, presented_refresh: &str) -> bool {
    session
        .credential
        .as_ref()
        .is_some_and(|credential| credential.refresh_token == presented_refresh)
}

/// Everything a store keeps for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub credential: Option<Credential>,
    pub role: Option<Role>,
}

fn poisoned<T>(_: T) -> ClientError {
    ClientError::storage("credential store lock poisoned")
}

/// In-process credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    session: RwLock<StoredSession>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds a credential.
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            session: RwLock::new(StoredSession {
                credential: Some(credential),
                role: None,
            }),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> ClientResult<Option<Credential>> {
        Ok(self.session.read().map_err(poisoned)?.credential.clone())
    }

    fn set(&self, credential: Credential) -> ClientResult<()> {
        self.session.write().map_err(poisoned)?.credential = Some(credential);
        Ok(())
    }

    fn role(&self) -> ClientResult<Option<Role>> {
        Ok(self.session.read().map_err(poisoned)?.role)
    }

    fn set_role(&self, role: Role) -> ClientResult<()> {
        self.session.write().map_err(poisoned)?.role = Some(role);
        Ok(())
    }

    fn clear(&self) -> ClientResult<()> {
        *self.session.write().map_err(poisoned)? = StoredSession::default();
        Ok(())
    }

    fn swap_if_current(
        &self,
        presented_refresh: &str,
        replacement: Option<Credential>,
    ) -> ClientResult<bool> {
        let mut session = self.session.write().map_err(poisoned)?;
        if !holds_refresh(&session, presented_refresh) {
            return Ok(false);
        }
        match replacement {
            Some(credential) => session.credential = Some(credential),
            None => *session = StoredSession::default(),
        }
        Ok(true)
    }
}

/// Credential store that survives process restarts.
///
/// The session is serialised to JSON, encrypted with [`StringCrypto`], and
/// written to `path`. Reads always go to disk so that several handles on the
/// same file agree; the mutex serialises read-modify-write cycles within
/// this process.
pub struct FileCredentialStore {
    path: PathBuf,
    crypto: StringCrypto,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>, crypto: StringCrypto) -> Self {
        Self {
            path: path.into(),
            crypto,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the session; a missing, undecryptable, or malformed file reads
    /// as an empty session.
    fn load(&self) -> ClientResult<StoredSession> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoredSession::default()),
            Err(e) => {
                return Err(ClientError::storage(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let plaintext = match self.crypto.decrypt(&contents) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(
                    "Ignoring unreadable credential file {}: {}",
                    self.path.display(),
                    e
                );
                return Ok(StoredSession::default());
            }
        };

        match serde_json::from_str(&plaintext) {
            Ok(session) => Ok(session),
            Err(e) => {
                warn!(
                    "Ignoring malformed credential file {}: {}",
                    self.path.display(),
                    e
                );
                Ok(StoredSession::default())
            }
        }
    }

    fn save(&self, session: &StoredSession) -> ClientResult<()> {
        let json = serde_json::to_string(session)
            .map_err(|e| ClientError::storage(format!("failed to encode session: {}", e)))?;
        let encrypted = self
            .crypto
            .encrypt(&json)
            .map_err(|e| ClientError::storage(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ClientError::storage(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        // Write to a sibling file and rename so a crash never leaves half a pair.
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, encrypted).map_err(|e| {
            ClientError::storage(format!("failed to write {}: {}", tmp_path.display(), e))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            ClientError::storage(format!("failed to replace {}: {}", self.path.display(), e))
        })?;

        debug!("Session persisted to {}", self.path.display());
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut StoredSession)) -> ClientResult<()> {
        let _guard = self.lock.lock().map_err(poisoned)?;
        let mut session = self.load()?;
        apply(&mut session);
        self.save(&session)
    }

    fn remove(&self) -> ClientResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::storage(format!(
                "failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> ClientResult<Option<Credential>> {
        let _guard = self.lock.lock().map_err(poisoned)?;
        Ok(self.load()?.credential)
    }

    fn set(&self, credential: Credential) -> ClientResult<()> {
        self.update(|session| session.credential = Some(credential))
    }

    fn role(&self) -> ClientResult<Option<Role>> {
        let _guard = self.lock.lock().map_err(poisoned)?;
        Ok(self.load()?.role)
    }

    fn set_role(&self, role: Role) -> ClientResult<()> {
        self.update(|session| session.role = Some(role))
    }

    fn clear(&self) -> ClientResult<()> {
        let _guard = self.lock.lock().map_err(poisoned)?;
        self.remove()
    }

    fn swap_if_current(
        &self,
        presented_refresh: &str,
        replacement: Option<Credential>,
    ) -> ClientResult<bool> {
        let _guard = self.lock.lock().map_err(poisoned)?;
        let mut session = self.load()?;
        if !holds_refresh(&session, presented_refresh) {
            return Ok(false);
        }
        match replacement {
            Some(credential) => {
                session.credential = Some(credential);
                self.save(&session)?;
            }
            None => self.remove()?,
        }
        Ok(true)
    }
}
