//! Session store for the bearer token and cached user profile
//!
//! The store sits on top of a small key/value contract ([`SessionStorage`]).
//! Two entries are kept: the opaque token and the user profile serialized as
//! JSON. Every mutation is written through to the backing storage right away.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, warn};

use crate::error::SdkResult;

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";

/// Profile of the logged-in user as returned by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "nome")]
    pub name: String,
    pub email: String,
}

impl UserProfile {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Point-in-time view of the persisted session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<UserProfile>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

/// Durable key/value storage backing a [`SessionStore`]
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> SdkResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> SdkResult<()>;
    fn remove(&self, key: &str) -> SdkResult<()>;
}

/// Process-local storage, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> SdkResult<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SdkResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> SdkResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// JSON file storage. The whole map is rewritten on every mutation.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open the storage at `path`, loading any existing entries.
    ///
    /// A missing file starts empty. An unreadable or corrupt file is also
    /// treated as empty: the session simply reads as logged out.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Ignoring corrupt session file {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!("Failed to read session file {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };

        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> SdkResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write then rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> SdkResult<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SdkResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> SdkResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

/// Thread-safe handle to the persisted session
///
/// Cloning is cheap; all clones share the same storage.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
}

impl SessionStore {
    pub fn new(storage: impl SessionStorage + 'static) -> Self {
        Self {
            storage: Arc::new(storage),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::new(FileStorage::open(path))
    }

    /// Read the current session
    pub fn get(&self) -> Session {
        let token = self.token();
        let user = if token.is_some() { self.user() } else { None };
        Session { token, user }
    }

    /// Stored bearer token, if any
    pub fn token(&self) -> Option<String> {
        self.read(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Cached user profile. A profile that fails to parse reads as absent.
    pub fn user(&self) -> Option<UserProfile> {
        let raw = self.read(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                debug!("Stored user profile is not valid JSON: {}", e);
                None
            }
        }
    }

    /// Persist a token and the profile that goes with it
    pub fn set(&self, token: &str, user: Option<&UserProfile>) {
        self.write(TOKEN_KEY, token);
        match user.map(serde_json::to_string) {
            Some(Ok(json)) => self.write(USER_KEY, &json),
            Some(Err(e)) => error!("Failed to serialize user profile: {}", e),
            None => self.delete(USER_KEY),
        }
    }

    /// Remove both the token and the profile
    pub fn clear(&self) {
        self.delete(TOKEN_KEY);
        self.delete(USER_KEY);
        debug!("Session cleared");
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    fn read(&self, key: &str) -> Option<String> {
        self.storage.get(key).unwrap_or_else(|e| {
            warn!("Session storage read of '{}' failed: {}", key, e);
            None
        })
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value) {
            error!("Session storage write of '{}' failed: {}", key, e);
        }
    }

    fn delete(&self, key: &str) {
        if let Err(e) = self.storage.remove(key) {
            error!("Session storage delete of '{}' failed: {}", key, e);
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SdkError;

    fn alice() -> UserProfile {
        UserProfile::new("Alice", "alice@example.com")
    }

    #[test]
    fn test_set_and_get() {
        let store = SessionStore::in_memory();
        assert!(!store.is_authenticated());
        assert_eq!(store.get(), Session::default());

        store.set("tok-123", Some(&alice()));

        assert!(store.is_authenticated());
        let session = store.get();
        assert_eq!(session.token.as_deref(), Some("tok-123"));
        assert_eq!(session.user, Some(alice()));
    }

    #[test]
    fn test_clear_removes_everything() {
        let store = SessionStore::in_memory();
        store.set("tok-123", Some(&alice()));
        store.clear();

        assert!(!store.is_authenticated());
        assert!(store.user().is_none());
        assert_eq!(store.get(), Session::default());
    }

    #[test]
    fn test_user_without_token_reads_as_logged_out() {
        let storage = MemoryStorage::new();
        storage
            .set(USER_KEY, r#"{"nome":"Alice","email":"alice@example.com"}"#)
            .unwrap();
        let store = SessionStore::new(storage);

        let session = store.get();
        assert!(session.token.is_none());
        assert!(session.user.is_none());
    }

    #[test]
    fn test_corrupt_user_reads_as_absent() {
        let storage = MemoryStorage::new();
        storage.set(TOKEN_KEY, "tok").unwrap();
        storage.set(USER_KEY, "{not json").unwrap();
        let store = SessionStore::new(storage);

        assert!(store.is_authenticated());
        assert!(store.user().is_none());
    }

    #[test]
    fn test_empty_token_is_not_authenticated() {
        let store = SessionStore::in_memory();
        store.set("", None);
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_user_profile_wire_format() {
        let json = serde_json::to_string(&alice()).unwrap();
        assert_eq!(json, r#"{"nome":"Alice","email":"alice@example.com"}"#);

        let parsed: UserProfile = serde_json::from_str(
            r#"{"id":7,"email":"bob@example.com","nome":"Bob","created_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(parsed.id, Some(7));
        assert_eq!(parsed.name, "Bob");
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = SessionStore::from_file(&path);
        store.set("tok-file", Some(&alice()));
        drop(store);

        let reopened = SessionStore::from_file(&path);
        assert_eq!(reopened.token().as_deref(), Some("tok-file"));
        assert_eq!(reopened.user(), Some(alice()));

        reopened.clear();
        let cleared = SessionStore::from_file(&path);
        assert!(!cleared.is_authenticated());
    }

    #[test]
    fn test_file_storage_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "garbage").unwrap();

        let store = SessionStore::from_file(&path);
        assert!(!store.is_authenticated());
    }

    struct BrokenStorage;

    impl SessionStorage for BrokenStorage {
        fn get(&self, _key: &str) -> SdkResult<Option<String>> {
            Err(SdkError::StorageError(std::io::Error::other("unavailable")))
        }
        fn set(&self, _key: &str, _value: &str) -> SdkResult<()> {
            Err(SdkError::StorageError(std::io::Error::other("unavailable")))
        }
        fn remove(&self, _key: &str) -> SdkResult<()> {
            Err(SdkError::StorageError(std::io::Error::other("unavailable")))
        }
    }

    #[test]
    fn test_unavailable_storage_is_not_authenticated() {
        let store = SessionStore::new(BrokenStorage);
        store.set("tok", Some(&alice()));
        assert!(!store.is_authenticated());
        store.clear();
    }
}
