//! Credential store implementations.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::credential::Credential;
use crate::error::{CredentialError, CredentialResult};

/// Storage key under which the login token is kept.
pub const LOGIN_KEY: &str = "login";

/// Persistent storage for a single bearer credential.
///
/// Implementations must tolerate concurrent calls from many in-flight
/// requests.
pub trait CredentialStore: Send + Sync {
    /// Current credential, if one is stored.
    fn get(&self) -> CredentialResult<Option<Credential>>;

    /// Replace the stored credential.
    fn set(&self, credential: Credential) -> CredentialResult<()>;

    /// Remove the stored credential. Clearing an empty store is not an error.
    fn clear(&self) -> CredentialResult<()>;

    /// Returns `true` if a credential is stored.
    fn contains(&self) -> CredentialResult<bool> {
        Ok(self.get()?.is_some())
    }
}

/// Process-local store. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Option<Credential>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `credential`.
    #[must_use]
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            inner: RwLock::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> CredentialResult<Option<Credential>> {
        Ok(self.inner.read().clone())
    }

    fn set(&self, credential: Credential) -> CredentialResult<()> {
        *self.inner.write() = Some(credential);
        Ok(())
    }

    fn clear(&self) -> CredentialResult<()> {
        self.inner.write().take();
        Ok(())
    }
}

/// File-backed store.
///
/// The file holds a JSON object keyed by storage key, so several
/// credentials can share one file. Writes replace the file atomically and
/// on Unix the file is readable by its owner only.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    key: String,
    lock: Mutex<()>,
}

type CredentialFile = BTreeMap<String, Credential>;

impl FileCredentialStore {
    /// Store the login credential in `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_key(path, LOGIN_KEY)
    }

    /// Store a credential under a custom key.
    #[must_use]
    pub fn with_key(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
            lock: Mutex::new(()),
        }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CredentialError {
        CredentialError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read_file(&self) -> CredentialResult<CredentialFile> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CredentialFile::new());
            }
            Err(err) => return Err(self.io_error(err)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(CredentialFile::new());
        }
        serde_json::from_slice(&bytes).map_err(|err| CredentialError::Corrupt {
            path: self.path.clone(),
            message: err.to_string(),
        })
    }

    fn write_file(&self, contents: &CredentialFile) -> CredentialResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
            }
        }

        let bytes = serde_json::to_vec_pretty(contents).map_err(|err| CredentialError::Corrupt {
            path: self.path.clone(),
            message: err.to_string(),
        })?;

        let tmp_path = self.path.with_extension("tmp");
        let mut file = open_private(&tmp_path).map_err(|err| self.io_error(err))?;
        file.write_all(&bytes).map_err(|err| self.io_error(err))?;
        file.sync_all().map_err(|err| self.io_error(err))?;
        drop(file);
        fs::rename(&tmp_path, &self.path).map_err(|err| self.io_error(err))?;
        Ok(())
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> CredentialResult<Option<Credential>> {
        let _guard = self.lock.lock();
        let mut contents = self.read_file()?;
        Ok(contents.remove(&self.key))
    }

    fn set(&self, credential: Credential) -> CredentialResult<()> {
        let _guard = self.lock.lock();
        let mut contents = self.read_file()?;
        contents.insert(self.key.clone(), credential);
        self.write_file(&contents)?;
        debug!(path = %self.path.display(), key = %self.key, "credential stored");
        Ok(())
    }

    fn clear(&self) -> CredentialResult<()> {
        let _guard = self.lock.lock();
        let mut contents = self.read_file()?;
        if contents.remove(&self.key).is_none() {
            return Ok(());
        }
        self.write_file(&contents)?;
        debug!(path = %self.path.display(), key = %self.key, "credential cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_lifecycle() {
        let store = MemoryCredentialStore::new();
        assert!(store.get().unwrap().is_none());

        store.set(Credential::new("abc123").unwrap()).unwrap();
        assert_eq!(store.get().unwrap().unwrap().token(), "abc123");
        assert!(store.contains().unwrap());

        store.clear().unwrap();
        assert!(!store.contains().unwrap());
        store.clear().unwrap();
    }

    #[test]
    fn memory_store_with_credential() {
        let store = MemoryCredentialStore::with_credential(Credential::new("t").unwrap());
        assert_eq!(store.get().unwrap().unwrap().token(), "t");
    }
}
