// Credential persistence
// One logical credential, stored as separate identity and token entries
// in a key-value backend

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::OptionalExtension;

use super::types::Credential;

/// Storage key for the serialized identity half of the credential
const IDENTITY_KEY: &str = "session.identity";

/// Storage key for the bearer token half of the credential
const TOKEN_KEY: &str = "session.token";

/// Minimal key-value persistence the credential store runs on. Swapped
/// for [`MemoryBackend`] in tests.
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// SQLite-backed key-value store, one row per key
pub struct SqliteBackend {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteBackend {
    /// Open (or create) the backing database and its key-value table
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = rusqlite::Connection::open(path)
            .with_context(|| format!("Failed to open session store: {}", path.display()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS session_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .context("Failed to create session_kv table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl StorageBackend for SqliteBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("session store lock poisoned");
        conn.query_row(
            "SELECT value FROM session_kv WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("Failed to read session key {key}"))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().expect("session store lock poisoned");
        conn.execute(
            "INSERT INTO session_kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )
        .with_context(|| format!("Failed to write session key {key}"))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().expect("session store lock poisoned");
        conn.execute("DELETE FROM session_kv WHERE key = ?1", [key])
            .with_context(|| format!("Failed to remove session key {key}"))?;
        Ok(())
    }
}

/// In-memory backend for tests and throwaway sessions
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().expect("session store lock poisoned");
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("session store lock poisoned");
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("session store lock poisoned");
        entries.remove(key);
        Ok(())
    }
}

/// Single source of truth for who the caller is and what proves it.
///
/// Reads degrade: missing keys, unreadable storage, or an identity blob
/// that no longer parses all come back as "no session" rather than an
/// error, so a corrupted store behaves like a logged-out one.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn StorageBackend>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Current credential, or `None` when logged out
    pub fn read(&self) -> Option<Credential> {
        let identity = match self.backend.get(IDENTITY_KEY) {
            Ok(Some(identity)) => identity,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Session store unreadable, treating as logged out");
                return None;
            }
        };
        let token = match self.backend.get(TOKEN_KEY) {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Session store unreadable, treating as logged out");
                return None;
            }
        };
        if token.trim().is_empty() {
            return None;
        }

        let mut credential: Credential = match serde_json::from_str(&identity) {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!(error = %e, "Stored identity does not parse, treating as logged out");
                return None;
            }
        };
        credential.token = token;
        Some(credential)
    }

    /// Persist both halves of the credential
    pub fn write(&self, credential: &Credential) -> Result<()> {
        let identity =
            serde_json::to_string(credential).context("Failed to serialize identity")?;
        self.backend.set(IDENTITY_KEY, &identity)?;
        self.backend.set(TOKEN_KEY, &credential.token)?;
        Ok(())
    }

    /// Remove the stored session. Idempotent.
    pub fn clear(&self) -> Result<()> {
        self.backend.remove(IDENTITY_KEY)?;
        self.backend.remove(TOKEN_KEY)?;
        Ok(())
    }
}
