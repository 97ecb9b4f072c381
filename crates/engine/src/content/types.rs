use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ContentPlanRequest {
    pub enabled_mods: Vec<String>,
    pub compiler_version: String,
    pub game_version: String,
}

impl Default for ContentPlanRequest {
    fn default() -> Self {
        Self {
            enabled_mods: Vec::new(),
            compiler_version: "dev".to_string(),
            game_version: "dev".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileAction {
    UseCache,
    Compile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileReason {
    CacheValid,
    ManifestMissing,
    ManifestUnreadable,
    PackMissing,
    VersionMismatch,
    EnabledModsHashMismatch,
    InputHashMismatch,
}

#[derive(Debug, Clone, Copy)]
pub struct ContentPlanSummary {
    pub source_count: usize,
    pub xml_file_count: usize,
    pub action: CompileAction,
    pub reason: CompileReason,
}

impl ContentPlanSummary {
    pub fn status_label(&self) -> &'static str {
        match self.action {
            CompileAction::Compile => "compiled",
            CompileAction::UseCache => "cached",
        }
    }
}

#[derive(Debug, Error)]
pub enum ContentPlanError {
    #[error("enabled mod id cannot be empty")]
    EmptyEnabledMod,
    #[error("duplicate enabled mod id in request: {mod_id}")]
    DuplicateEnabledMod { mod_id: String },
    #[error("enabled mod does not exist on disk: {mod_id} at {expected_dir}")]
    EnabledModMissing {
        mod_id: String,
        expected_dir: PathBuf,
    },
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read directory entry in {path}: {source}")]
    ReadDirEntry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
