//! Storage media for the credential record.
//!
//! Each backend holds a single record with all three credential fields, so a
//! save or clear always moves the whole triple.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use keyring::Entry;

use super::Credential;
use crate::config::{Config, StorageKind};

/// Service name for OS keychain entries
const SERVICE_NAME: &str = "folio";

/// Keychain account holding the session record
const KEYRING_ACCOUNT: &str = "session";

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

pub trait CredentialBackend: Send + Sync {
    fn load(&self) -> Result<Option<Credential>>;
    fn save(&self, credential: &Credential) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Open the backend selected in the config
pub fn open_backend(config: &Config) -> Result<Box<dyn CredentialBackend>> {
    Ok(match config.storage {
        StorageKind::Memory => Box::new(MemoryBackend::default()),
        StorageKind::File => Box::new(FileBackend::new(config.cache_dir()?)),
        StorageKind::Keyring => Box::new(KeyringBackend::new()),
    })
}

/// Lives as long as the process
#[derive(Debug, Default)]
pub struct MemoryBackend {
    record: Mutex<Option<Credential>>,
}

impl CredentialBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Credential>> {
        Ok(self.record.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// `session.json` in the cache directory
pub struct FileBackend {
    cache_dir: PathBuf,
}

impl FileBackend {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

impl CredentialBackend for FileBackend {
    fn load(&self) -> Result<Option<Credential>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let credential: Credential =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(credential))
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir).context("Failed to create cache directory")?;
        let contents = serde_json::to_string_pretty(credential)?;

        // Write then rename so a reader sees the old record or the new one.
        let tmp = self.cache_dir.join(format!("{}.tmp", SESSION_FILE));
        std::fs::write(&tmp, contents).context("Failed to write session file")?;
        std::fs::rename(&tmp, self.session_path()).context("Failed to replace session file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

/// One OS keychain entry holding the JSON record
pub struct KeyringBackend {
    account: String,
}

impl KeyringBackend {
    pub fn new() -> Self {
        Self {
            account: KEYRING_ACCOUNT.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.account).context("Failed to create keyring entry")
    }
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialBackend for KeyringBackend {
    fn load(&self) -> Result<Option<Credential>> {
        match self.entry()?.get_password() {
            Ok(json) => {
                let credential = serde_json::from_str(&json)
                    .context("Failed to parse session record from keychain")?;
                Ok(Some(credential))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve session from keychain"),
        }
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        let json = serde_json::to_string(credential)?;
        self.entry()?
            .set_password(&json)
            .context("Failed to store session in keychain")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}
