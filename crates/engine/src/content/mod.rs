pub(crate) mod atomic_io;
mod compiler;
mod database;
mod discovery;
mod hashing;
mod pack;
mod pipeline;
mod types;

pub use compiler::{ContentCompileError, ContentErrorCode, SourceLocation};
pub use database::{
    AreaDef, AreaDefId, ContentDatabase, ContentValidationError, FindSpec, HidingKind, ItemDef,
    ItemDefId, RoleTag, TaskDef, TaskDefId, TaskStep, FINDS_PER_AREA,
};
pub use pipeline::{build_or_load_content_database, compile_content_defs, ContentPipelineError};
pub use types::{
    CompileAction, CompileReason, ContentPlanError, ContentPlanRequest, ContentPlanSummary,
};
