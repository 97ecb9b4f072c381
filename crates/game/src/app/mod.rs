use std::process::ExitCode;

use tracing::{error, info};

mod bootstrap;
mod collections;
mod events;
mod progression;
mod roles;
mod save;
mod session;
mod snapshot;
mod tasks;
mod world;

#[cfg(test)]
mod tests;

pub(crate) const INVENTORY_SLOT_COUNT: usize = 4;
pub(crate) const AUTOSAVE_INTERVAL_SECONDS: f32 = 45.0;
pub(crate) const SAVE_VERSION: u32 = 2;
pub(crate) const SAVE_STORE_NAMESPACE: &str = "bramblewood";
pub(crate) const SAVE_RECORD_KEY: &str = "session";
pub(crate) const STARTING_AREA: &str = "area.forest";
pub(crate) const ROLE_NOTIFY_ORDER_TEXT: &str = "Task>World>Progression>Autosave";

pub(crate) fn run() -> ExitCode {
    let wiring = match bootstrap::build_app() {
        Ok(wiring) => wiring,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };
    let mut session = wiring.session;
    info!(
        sources = wiring.summary.source_count,
        xml_files = wiring.summary.xml_file_count,
        content_status = wiring.summary.status_label(),
        "content_ready"
    );

    let snapshot = session.role_snapshot();
    info!(
        consistent = snapshot.is_consistent(),
        active_role = ?snapshot.task,
        current_task = snapshot.current_task.as_deref().unwrap_or("none"),
        inventory_count = snapshot.inventory_count,
        "session_ready"
    );
    for line in session.progression_report() {
        info!("{line}");
    }
    session.save_now(save::SaveReason::Manual);

    ExitCode::SUCCESS
}
