use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::AppPaths;

use super::types::{ContentPlanError, ContentPlanRequest};

#[derive(Debug, Clone)]
pub(crate) struct ModSource {
    pub mod_id: String,
    pub load_index: u32,
    pub source_dir: PathBuf,
}

/// Base content always loads first; enabled mods follow in request order.
/// Later sources override earlier ones def-by-def.
pub(crate) fn discover_sources(
    app_paths: &AppPaths,
    request: &ContentPlanRequest,
) -> Result<Vec<ModSource>, ContentPlanError> {
    let mut seen = HashSet::<String>::new();
    let mut sources = vec![ModSource {
        mod_id: "base".to_string(),
        load_index: 0,
        source_dir: app_paths.base_content_dir.clone(),
    }];

    for (idx, mod_id) in request.enabled_mods.iter().enumerate() {
        let trimmed = mod_id.trim();
        if trimmed.is_empty() {
            return Err(ContentPlanError::EmptyEnabledMod);
        }
        if !seen.insert(trimmed.to_string()) {
            return Err(ContentPlanError::DuplicateEnabledMod {
                mod_id: trimmed.to_string(),
            });
        }
        let mod_dir = app_paths.mods_dir.join(trimmed);
        ensure_dir_exists(trimmed, &mod_dir)?;
        sources.push(ModSource {
            mod_id: trimmed.to_string(),
            load_index: (idx + 1) as u32,
            source_dir: mod_dir,
        });
    }

    Ok(sources)
}

fn ensure_dir_exists(mod_id: &str, path: &Path) -> Result<(), ContentPlanError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ContentPlanError::EnabledModMissing {
            mod_id: mod_id.to_string(),
            expected_dir: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn base_is_first_then_enabled_order() {
        let temp = TempDir::new().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("assets").join("base")).expect("create base");
        fs::create_dir_all(root.join("mods").join("winter")).expect("create winter");
        fs::create_dir_all(root.join("mods").join("autumn")).expect("create autumn");
        let app_paths = AppPaths {
            root: root.to_path_buf(),
            base_content_dir: root.join("assets").join("base"),
            mods_dir: root.join("mods"),
            cache_dir: root.join("cache"),
        };
        let request = ContentPlanRequest {
            enabled_mods: vec!["winter".to_string(), "autumn".to_string()],
            compiler_version: "1".to_string(),
            game_version: "1".to_string(),
        };

        let sources = discover_sources(&app_paths, &request).expect("discover");
        let ids: Vec<&str> = sources.iter().map(|source| source.mod_id.as_str()).collect();
        assert_eq!(ids, vec!["base", "winter", "autumn"]);
        assert_eq!(sources[2].load_index, 2);
    }

    #[test]
    fn missing_enabled_mod_errors() {
        let temp = TempDir::new().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("assets").join("base")).expect("create base");
        let app_paths = AppPaths {
            root: root.to_path_buf(),
            base_content_dir: root.join("assets").join("base"),
            mods_dir: root.join("mods"),
            cache_dir: root.join("cache"),
        };
        let request = ContentPlanRequest {
            enabled_mods: vec!["ghost".to_string()],
            compiler_version: "1".to_string(),
            game_version: "1".to_string(),
        };

        let error = discover_sources(&app_paths, &request).expect_err("missing mod");
        assert!(matches!(
            error,
            ContentPlanError::EnabledModMissing { .. }
        ));
    }
}
