use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::content::atomic_io::write_text_atomic;

/// Namespaced key/value persistence for versioned records.
///
/// Read-side problems (missing key, schema version mismatch, undecodable
/// payload) are absorbed into `None` so callers fall back to defaults;
/// write-side problems are real errors.
pub struct Store {
    root: PathBuf,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid store key '{key}': keys use [a-z0-9_.-] only")]
    InvalidKey { key: String },
    #[error("failed to encode record for key '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write record {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    schema_version: u32,
    payload: serde_json::Value,
}

impl Store {
    pub fn open(cache_dir: &Path, namespace: &str) -> Result<Self, StoreError> {
        if !is_valid_key(namespace) {
            return Err(StoreError::InvalidKey {
                key: namespace.to_string(),
            });
        }
        let root = cache_dir.join("store").join(namespace);
        fs::create_dir_all(&root).map_err(|source| StoreError::CreateDir {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn put<T: Serialize>(
        &self,
        key: &str,
        schema_version: u32,
        value: &T,
    ) -> Result<(), StoreError> {
        let path = self.record_path(key)?;
        let payload = serde_json::to_value(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        let envelope = Envelope {
            schema_version,
            payload,
        };
        let text =
            serde_json::to_string_pretty(&envelope).map_err(|source| StoreError::Encode {
                key: key.to_string(),
                source,
            })?;
        write_text_atomic(&path, &text).map_err(|source| StoreError::Write { path, source })
    }

    /// Returns the decoded payload, or `None` when the key is absent, the
    /// stored schema version differs from `schema_version`, or the payload
    /// does not decode as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, schema_version: u32) -> Option<T> {
        let path = self.record_path(key).ok()?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return None,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "store_record_unreadable");
                return None;
            }
        };
        let envelope = match serde_json::from_str::<Envelope>(&raw) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "store_record_corrupt");
                return None;
            }
        };
        if envelope.schema_version != schema_version {
            warn!(
                path = %path.display(),
                stored_version = envelope.schema_version,
                expected_version = schema_version,
                "store_record_version_mismatch_using_defaults"
            );
            return None;
        }
        match serde_json::from_value::<T>(envelope.payload) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "store_payload_undecodable");
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.record_path(key)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    fn record_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_key(key) {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || "_.-".contains(ch))
}
