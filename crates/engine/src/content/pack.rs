use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::atomic_io::write_text_atomic;
use super::database::MergedRawDefs;

pub(crate) const CONTENT_PACK_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Error)]
pub enum ContentPackError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid content pack at {path}: {message}")]
    InvalidFormat { path: PathBuf, message: String },
}

/// Cache fingerprint written next to the compiled pack. Any field mismatch
/// forces a recompile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PackManifest {
    pub pack_format_version: u16,
    pub compiler_version: String,
    pub game_version: String,
    pub enabled_mods_hash_sha256_hex: String,
    pub input_hash_sha256_hex: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ContentPackV1 {
    pub meta: PackManifest,
    pub defs: MergedRawDefs,
}

#[derive(Debug, Clone)]
pub(crate) enum ManifestReadState {
    Missing,
    Unreadable,
    Present(PackManifest),
}

pub(crate) fn content_cache_dir(cache_dir: &Path) -> PathBuf {
    cache_dir.join("content")
}

pub(crate) fn pack_path(cache_dir: &Path) -> PathBuf {
    content_cache_dir(cache_dir).join("defs.pack.json")
}

pub(crate) fn manifest_path(cache_dir: &Path) -> PathBuf {
    content_cache_dir(cache_dir).join("defs.manifest.json")
}

pub(crate) fn read_manifest(path: &Path) -> ManifestReadState {
    if !path.exists() {
        return ManifestReadState::Missing;
    }
    let Ok(raw) = fs::read_to_string(path) else {
        return ManifestReadState::Unreadable;
    };
    match serde_json::from_str::<PackManifest>(&raw) {
        Ok(parsed) => ManifestReadState::Present(parsed),
        Err(_) => ManifestReadState::Unreadable,
    }
}

pub(crate) fn write_manifest_atomic(
    path: &Path,
    manifest: &PackManifest,
) -> Result<(), ContentPackError> {
    let text = serde_json::to_string(manifest).map_err(|error| ContentPackError::InvalidFormat {
        path: path.to_path_buf(),
        message: format!("failed to encode manifest json: {error}"),
    })?;
    write_text_atomic(path, &text).map_err(|source| ContentPackError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn write_content_pack(
    path: &Path,
    pack: &ContentPackV1,
) -> Result<(), ContentPackError> {
    let text = serde_json::to_string(pack).map_err(|error| ContentPackError::InvalidFormat {
        path: path.to_path_buf(),
        message: format!("failed to encode pack json: {error}"),
    })?;
    write_text_atomic(path, &text).map_err(|source| ContentPackError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn read_content_pack(path: &Path) -> Result<ContentPackV1, ContentPackError> {
    let raw = fs::read_to_string(path).map_err(|source| ContentPackError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let pack: ContentPackV1 =
        serde_json::from_str(&raw).map_err(|error| ContentPackError::InvalidFormat {
            path: path.to_path_buf(),
            message: format!("failed to decode pack json: {error}"),
        })?;
    if pack.meta.pack_format_version != CONTENT_PACK_FORMAT_VERSION {
        return Err(ContentPackError::InvalidFormat {
            path: path.to_path_buf(),
            message: format!(
                "pack format version {} does not match supported version {}",
                pack.meta.pack_format_version, CONTENT_PACK_FORMAT_VERSION
            ),
        });
    }
    Ok(pack)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn sample_manifest() -> PackManifest {
        PackManifest {
            pack_format_version: CONTENT_PACK_FORMAT_VERSION,
            compiler_version: "dev".to_string(),
            game_version: "dev".to_string(),
            enabled_mods_hash_sha256_hex: "aa".to_string(),
            input_hash_sha256_hex: "bb".to_string(),
        }
    }

    #[test]
    fn pack_round_trips() {
        let temp = TempDir::new().expect("temp");
        let path = pack_path(temp.path());
        let pack = ContentPackV1 {
            meta: sample_manifest(),
            defs: MergedRawDefs::default(),
        };
        write_content_pack(&path, &pack).expect("write");
        let loaded = read_content_pack(&path).expect("read");
        assert_eq!(loaded.meta, sample_manifest());
        assert!(loaded.defs.items.is_empty());
    }

    #[test]
    fn wrong_format_version_is_invalid() {
        let temp = TempDir::new().expect("temp");
        let path = pack_path(temp.path());
        let mut pack = ContentPackV1 {
            meta: sample_manifest(),
            defs: MergedRawDefs::default(),
        };
        pack.meta.pack_format_version = CONTENT_PACK_FORMAT_VERSION + 1;
        write_content_pack(&path, &pack).expect("write");
        let error = read_content_pack(&path).expect_err("format mismatch");
        assert!(matches!(error, ContentPackError::InvalidFormat { .. }));
    }

    #[test]
    fn manifest_read_states() {
        let temp = TempDir::new().expect("temp");
        let path = manifest_path(temp.path());
        assert!(matches!(read_manifest(&path), ManifestReadState::Missing));

        write_manifest_atomic(&path, &sample_manifest()).expect("write");
        assert!(matches!(
            read_manifest(&path),
            ManifestReadState::Present(_)
        ));

        std::fs::write(&path, "{broken").expect("corrupt");
        assert!(matches!(
            read_manifest(&path),
            ManifestReadState::Unreadable
        ));
    }
}
