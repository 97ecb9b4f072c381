use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::discovery::ModSource;
use super::types::ContentPlanError;

#[derive(Debug, Clone)]
pub(crate) struct ContentInputHash {
    pub xml_file_count: usize,
    pub hash_hex: String,
}

pub(crate) fn hash_enabled_sources(sources: &[ModSource]) -> String {
    let mut hasher = Sha256::new();
    for source in sources {
        hasher.update(source.mod_id.as_bytes());
        hasher.update([0u8]);
    }
    to_hex_lower(&hasher.finalize())
}

/// Order-sensitive digest over every XML file of every source, so editing,
/// adding, or removing any def file invalidates the compiled pack.
pub(crate) fn hash_xml_inputs(sources: &[ModSource]) -> Result<ContentInputHash, ContentPlanError> {
    let mut hasher = Sha256::new();
    let mut xml_file_count = 0usize;
    for source in sources {
        hasher.update(source.mod_id.as_bytes());
        hasher.update([0u8]);
        for (normalized_rel, abs_path) in collect_xml_files_sorted(&source.source_dir)? {
            let bytes = fs::read(&abs_path).map_err(|io_error| ContentPlanError::ReadFile {
                path: abs_path.clone(),
                source: io_error,
            })?;
            hasher.update(normalized_rel.as_bytes());
            hasher.update([0u8]);
            hasher.update(&bytes);
            xml_file_count += 1;
        }
    }

    Ok(ContentInputHash {
        xml_file_count,
        hash_hex: to_hex_lower(&hasher.finalize()),
    })
}

pub(crate) fn collect_xml_files_sorted(
    root: &Path,
) -> Result<Vec<(String, PathBuf)>, ContentPlanError> {
    let mut files = Vec::<(String, PathBuf)>::new();
    collect_recursive(root, root, &mut files)?;
    files.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(files)
}

fn collect_recursive(
    root: &Path,
    current: &Path,
    files: &mut Vec<(String, PathBuf)>,
) -> Result<(), ContentPlanError> {
    let entries = fs::read_dir(current).map_err(|source| ContentPlanError::ReadDir {
        path: current.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| ContentPlanError::ReadDirEntry {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(root, &path, files)?;
            continue;
        }
        let is_xml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        if !is_xml {
            continue;
        }
        let rel = path.strip_prefix(root).expect("path discovered under root");
        files.push((normalize_rel_path(rel), path));
    }
    Ok(())
}

fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}
