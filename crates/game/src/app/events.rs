use super::collections::CollectionsSnapshot;
use super::roles::Role;
use super::save::SaveReason;

/// The typed message set carried on the session bus. UI chrome subscribes;
/// the core only emits.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum GameEvent {
    CharacterSwitch {
        role: Role,
    },
    InventoryUpdate {
        role: Role,
        items: Vec<String>,
    },
    TaskStepCompleted {
        role: Role,
        task: String,
        step_id: String,
    },
    TaskCompleted {
        role: Role,
        task: String,
    },
    AreaEntered {
        role: Role,
        area: String,
    },
    /// Always carries the full shared-collection state so observers never
    /// have to diff partial updates.
    CollectionsUpdate {
        snapshot: CollectionsSnapshot,
    },
    SaveRequested {
        reason: SaveReason,
    },
    SaveCompleted {
        role: Role,
        reason: SaveReason,
    },
}
