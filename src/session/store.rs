//! Client-side auth store.
//!
//! The in-memory state is canonical. `user`, `session` and `is_authenticated`
//! are written through to a [`SessionPersistence`] on every change so a
//! restarted client picks up where it left off.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tracing::warn;

use super::model::{Session, User};
use crate::error::StoreError;

/// The persisted subset of [`AuthState`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedAuth {
    pub user: Option<User>,
    pub session: Option<Session>,
    pub is_authenticated: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub user: Option<User>,
    pub session: Option<Session>,
    pub is_loading: bool,
    pub is_authenticated: bool,
    pub error: Option<String>,
}

impl AuthState {
    fn persisted(&self) -> PersistedAuth {
        PersistedAuth {
            user: self.user.clone(),
            session: self.session.clone(),
            is_authenticated: self.is_authenticated,
        }
    }
}

pub trait SessionPersistence: Send + Sync {
    fn load(&self) -> Result<Option<PersistedAuth>, StoreError>;
    fn save(&self, state: &PersistedAuth) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

// JSON file on disk
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionPersistence for JsonFileStore {
    fn load(&self) -> Result<Option<PersistedAuth>, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, state: &PersistedAuth) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        // write then rename so a crash never leaves half a file
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Option<PersistedAuth>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionPersistence for MemoryStore {
    fn load(&self) -> Result<Option<PersistedAuth>, StoreError> {
        Ok(self.inner.lock().ok().and_then(|guard| guard.clone()))
    }

    fn save(&self, state: &PersistedAuth) -> Result<(), StoreError> {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Some(state.clone());
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = None;
        }
        Ok(())
    }
}

pub struct AuthStore {
    state: RwLock<AuthState>,
    persistence: Arc<dyn SessionPersistence>,
}

impl AuthStore {
    /// Builds the store from whatever was persisted last. A missing or
    /// unreadable record starts empty.
    pub fn hydrate(persistence: Arc<dyn SessionPersistence>) -> Self {
        let persisted = match persistence.load() {
            Ok(p) => p.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "could not load persisted auth state");
                PersistedAuth::default()
            }
        };

        Self {
            state: RwLock::new(AuthState {
                user: persisted.user,
                session: persisted.session,
                is_loading: false,
                is_authenticated: persisted.is_authenticated,
                error: None,
            }),
            persistence,
        }
    }

    pub fn snapshot(&self) -> AuthState {
        self.state
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn set_user(&self, user: Option<User>) {
        self.update(true, |s| {
            s.is_authenticated = user.is_some();
            s.user = user;
        });
    }

    /// Replaces the session; the user follows the session's user.
    pub fn set_session(&self, session: Option<Session>) {
        self.update(true, |s| {
            s.user = session.as_ref().and_then(|x| x.user.clone());
            s.is_authenticated = s.user.is_some();
            s.session = session;
        });
    }

    pub fn set_loading(&self, loading: bool) {
        self.update(false, |s| s.is_loading = loading);
    }

    pub fn set_error(&self, error: Option<String>) {
        self.update(false, |s| s.error = error);
    }

    pub fn logout(&self) {
        self.update(true, |s| {
            s.user = None;
            s.session = None;
            s.is_authenticated = false;
            s.error = None;
        });
    }

    /// Logs out and removes the persisted record entirely.
    pub fn purge(&self) {
        self.update(false, |s| {
            s.user = None;
            s.session = None;
            s.is_authenticated = false;
            s.error = None;
        });
        if let Err(e) = self.persistence.clear() {
            warn!(error = %e, "could not clear persisted auth state");
        }
    }

    fn update(&self, persist: bool, f: impl FnOnce(&mut AuthState)) {
        let persisted = {
            let Ok(mut state) = self.state.write() else {
                return;
            };
            f(&mut state);
            persist.then(|| state.persisted())
        };

        if let Some(p) = persisted {
            if let Err(e) = self.persistence.save(&p) {
                warn!(error = %e, "could not persist auth state");
            }
        }
    }
}
