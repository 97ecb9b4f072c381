use engine::{
    build_or_load_content_database, resolve_app_paths, ContentPipelineError, ContentPlanRequest,
    ContentPlanSummary, StartupError, Store, StoreError,
};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::session::{GameSession, SessionConfig, SessionError};
use super::SAVE_STORE_NAMESPACE;

const ENABLED_MODS_ENV_VAR: &str = "BRAMBLE_ENABLED_MODS";

pub(crate) struct AppWiring {
    pub(crate) session: GameSession,
    pub(crate) summary: ContentPlanSummary,
}

#[derive(Debug, Error)]
pub(crate) enum BootError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Content(#[from] ContentPipelineError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

pub(crate) fn build_app() -> Result<AppWiring, BootError> {
    init_tracing();
    info!("=== Bramblewood Startup ===");

    let app_paths = resolve_app_paths()?;
    let request = ContentPlanRequest {
        enabled_mods: parse_enabled_mods_from_env(),
        compiler_version: env!("CARGO_PKG_VERSION").to_string(),
        game_version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let (content, summary) = build_or_load_content_database(&app_paths, &request)?;
    let store = Store::open(&app_paths.cache_dir, SAVE_STORE_NAMESPACE)?;
    let session = GameSession::start(content, store, SessionConfig::default())?;

    Ok(AppWiring { session, summary })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn parse_enabled_mods_from_env() -> Vec<String> {
    std::env::var(ENABLED_MODS_ENV_VAR)
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
}
