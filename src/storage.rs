//! Local key-value storage for the session cache.
//!
//! Values live in a single SQLite table. Every failure is logged and turned
//! into a miss or a `false` result so callers never have to handle storage
//! errors.

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

pub const USER_KEY: &str = "user";
pub const TOKEN_KEY: &str = "token";

/// Result of reading a key: either the decoded value or, when the stored
/// text is not valid JSON for `T`, the raw text unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum Stored<T> {
    Decoded(T),
    Raw(String),
}

impl<T> Stored<T> {
    pub fn decoded(self) -> Option<T> {
        match self {
            Stored::Decoded(value) => Some(value),
            Stored::Raw(_) => None,
        }
    }
}

impl Stored<String> {
    pub fn into_string(self) -> String {
        match self {
            Stored::Decoded(value) | Stored::Raw(value) => value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalStorage {
    path: Option<String>,
}

impl LocalStorage {
    pub fn new(path: &str) -> Self {
        Self {
            path: Some(path.to_string()),
        }
    }

    /// Storage for contexts with no local store at all. Reads miss and
    /// writes report `false`.
    pub fn unavailable() -> Self {
        Self { path: None }
    }

    pub fn is_available(&self) -> bool {
        self.path.is_some()
    }

    fn get_connection(&self) -> rusqlite::Result<Option<Connection>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };

        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Some(conn))
    }

    pub fn get_raw(&self, key: &str) -> Option<String> {
        let result = self.get_connection().and_then(|conn| match conn {
            Some(conn) => conn
                .query_row(
                    "SELECT value FROM kv_store WHERE key = ?1",
                    [key],
                    |row| row.get::<_, String>(0),
                )
                .optional(),
            None => Ok(None),
        });

        match result {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to read key '{}' from storage: {}", key, e);
                None
            }
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<Stored<T>> {
        let raw = self.get_raw(key)?;

        match serde_json::from_str::<T>(&raw) {
            Ok(value) => Some(Stored::Decoded(value)),
            Err(_) => Some(Stored::Raw(raw)),
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Stored<T> {
        self.get(key).unwrap_or(Stored::Decoded(default))
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.set_raw(key, &json),
            Err(e) => {
                warn!("Failed to encode value for key '{}': {}", key, e);
                false
            }
        }
    }

    pub fn set_raw(&self, key: &str, value: &str) -> bool {
        let result = self.get_connection().and_then(|conn| match conn {
            Some(conn) => conn
                .execute(
                    "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, value],
                )
                .map(|_| true),
            None => Ok(false),
        });

        result.unwrap_or_else(|e| {
            warn!("Failed to write key '{}' to storage: {}", key, e);
            false
        })
    }

    pub fn remove(&self, key: &str) -> bool {
        let result = self.get_connection().and_then(|conn| match conn {
            Some(conn) => conn
                .execute("DELETE FROM kv_store WHERE key = ?1", [key])
                .map(|_| true),
            None => Ok(false),
        });

        result.unwrap_or_else(|e| {
            warn!("Failed to remove key '{}' from storage: {}", key, e);
            false
        })
    }

    pub fn clear(&self) -> bool {
        let result = self.get_connection().and_then(|conn| match conn {
            Some(conn) => conn.execute("DELETE FROM kv_store", []).map(|_| true),
            None => Ok(false),
        });

        result.unwrap_or_else(|e| {
            warn!("Failed to clear storage: {}", e);
            false
        })
    }

    pub fn keys(&self) -> Vec<String> {
        let result = self.get_connection().and_then(|conn| match conn {
            Some(conn) => {
                let mut stmt = conn.prepare("SELECT key FROM kv_store ORDER BY key")?;
                let keys = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(keys)
            }
            None => Ok(Vec::new()),
        });

        result.unwrap_or_else(|e| {
            warn!("Failed to list storage keys: {}", e);
            Vec::new()
        })
    }
}
