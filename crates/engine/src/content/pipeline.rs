use thiserror::Error;
use tracing::{info, warn};

use crate::AppPaths;

use super::compiler::{compile_merged_raw_defs, ContentCompileError};
use super::database::{ContentDatabase, ContentValidationError};
use super::discovery::discover_sources;
use super::hashing::{hash_enabled_sources, hash_xml_inputs};
use super::pack::{
    manifest_path, pack_path, read_content_pack, read_manifest, write_content_pack,
    write_manifest_atomic, ContentPackError, ContentPackV1, ManifestReadState, PackManifest,
    CONTENT_PACK_FORMAT_VERSION,
};
use super::types::{
    CompileAction, CompileReason, ContentPlanError, ContentPlanRequest, ContentPlanSummary,
};

#[derive(Debug, Error)]
pub enum ContentPipelineError {
    #[error(transparent)]
    Plan(#[from] ContentPlanError),
    #[error(transparent)]
    Compile(#[from] ContentCompileError),
    #[error(transparent)]
    Validation(#[from] ContentValidationError),
    #[error(transparent)]
    Pack(#[from] ContentPackError),
}

/// Compile straight from XML sources, skipping the pack cache entirely.
pub fn compile_content_defs(
    app_paths: &AppPaths,
    request: &ContentPlanRequest,
) -> Result<ContentDatabase, ContentPipelineError> {
    let merged = compile_merged_raw_defs(app_paths, request)?;
    Ok(ContentDatabase::from_raw(merged)?)
}

/// Cache-aware load: reuse the compiled pack when the manifest fingerprint
/// still matches the XML inputs, otherwise recompile and rewrite the cache.
pub fn build_or_load_content_database(
    app_paths: &AppPaths,
    request: &ContentPlanRequest,
) -> Result<(ContentDatabase, ContentPlanSummary), ContentPipelineError> {
    let sources = discover_sources(app_paths, request)?;
    let enabled_mods_hash = hash_enabled_sources(&sources);
    let input_hash = hash_xml_inputs(&sources)?;

    let expected = PackManifest {
        pack_format_version: CONTENT_PACK_FORMAT_VERSION,
        compiler_version: request.compiler_version.clone(),
        game_version: request.game_version.clone(),
        enabled_mods_hash_sha256_hex: enabled_mods_hash,
        input_hash_sha256_hex: input_hash.hash_hex.clone(),
    };
    let manifest_file = manifest_path(&app_paths.cache_dir);
    let pack_file = pack_path(&app_paths.cache_dir);
    let reason = decide_reason(&manifest_file, &pack_file, &expected);
    let action = match reason {
        CompileReason::CacheValid => CompileAction::UseCache,
        _ => CompileAction::Compile,
    };
    let summary = ContentPlanSummary {
        source_count: sources.len(),
        xml_file_count: input_hash.xml_file_count,
        action,
        reason,
    };
    info!(
        source_count = summary.source_count,
        xml_file_count = summary.xml_file_count,
        action = ?summary.action,
        reason = ?summary.reason,
        input_hash = %expected.input_hash_sha256_hex,
        enabled_mods_hash = %expected.enabled_mods_hash_sha256_hex,
        "content_plan_decision"
    );

    if action == CompileAction::UseCache {
        match try_load_cached(&pack_file, &expected) {
            Ok(database) => {
                info!(
                    pack_path = %pack_file.display(),
                    content_status = summary.status_label(),
                    "content_cache_hit"
                );
                return Ok((database, summary));
            }
            Err(reason) => {
                warn!(reason = %reason, "content_cache_invalid_rebuilding");
            }
        }
    }

    let merged = compile_merged_raw_defs(app_paths, request)?;
    let database = ContentDatabase::from_raw(merged.clone())?;
    let pack = ContentPackV1 {
        meta: expected.clone(),
        defs: merged,
    };
    write_content_pack(&pack_file, &pack)?;
    write_manifest_atomic(&manifest_file, &expected)?;
    info!(
        item_count = database.items().len(),
        task_count = database.tasks().len(),
        area_count = database.areas().len(),
        content_status = "compiled",
        "content_pipeline_summary"
    );
    Ok((database, summary))
}

fn decide_reason(
    manifest_file: &std::path::Path,
    pack_file: &std::path::Path,
    expected: &PackManifest,
) -> CompileReason {
    let manifest = match read_manifest(manifest_file) {
        ManifestReadState::Missing => return CompileReason::ManifestMissing,
        ManifestReadState::Unreadable => return CompileReason::ManifestUnreadable,
        ManifestReadState::Present(manifest) => manifest,
    };
    if !pack_file.is_file() {
        return CompileReason::PackMissing;
    }
    if manifest.pack_format_version != expected.pack_format_version
        || manifest.compiler_version != expected.compiler_version
        || manifest.game_version != expected.game_version
    {
        return CompileReason::VersionMismatch;
    }
    if manifest.enabled_mods_hash_sha256_hex != expected.enabled_mods_hash_sha256_hex {
        return CompileReason::EnabledModsHashMismatch;
    }
    if manifest.input_hash_sha256_hex != expected.input_hash_sha256_hex {
        return CompileReason::InputHashMismatch;
    }
    CompileReason::CacheValid
}

fn try_load_cached(
    pack_file: &std::path::Path,
    expected: &PackManifest,
) -> Result<ContentDatabase, String> {
    let pack = read_content_pack(pack_file).map_err(|error| format!("failed to read pack: {error}"))?;
    if &pack.meta != expected {
        return Err("pack meta does not match manifest fingerprint".to_string());
    }
    ContentDatabase::from_raw(pack.defs).map_err(|error| format!("cached defs invalid: {error}"))
}
