use std::collections::BTreeSet;

use engine::{AreaDefId, ContentDatabase, TaskDefId};
use thiserror::Error;
use tracing::debug;

use super::roles::{Role, RoleChangeError, RoleSlots};

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RoleProgress {
    /// Monotonic: areas are never removed once unlocked.
    unlocked: BTreeSet<AreaDefId>,
    current_area: Option<AreaDefId>,
    completed_tasks: BTreeSet<TaskDefId>,
}

#[derive(Debug, Error)]
pub(crate) enum ProgressionError {
    #[error("unknown area def id {area:?}; content validation should have caught this")]
    UnknownArea { area: AreaDefId },
}

/// Tracks unlocked areas and the current-task pointer per role, and picks
/// which task the task system should run next in an area.
#[derive(Debug, Default)]
pub(crate) struct ProgressionSystem {
    active_role: Option<Role>,
    slots: RoleSlots<RoleProgress>,
}

impl ProgressionSystem {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn apply_role_change(&mut self, role: Role) -> Result<(), RoleChangeError> {
        self.active_role = Some(role);
        Ok(())
    }

    pub(crate) fn role_id(&self) -> Option<Role> {
        self.active_role
    }

    /// Idempotent; returns whether the set actually grew.
    pub(crate) fn unlock_area(&mut self, role: Role, area: AreaDefId) -> bool {
        let newly = self.slots.get_mut(role).unlocked.insert(area);
        if newly {
            debug!(role = role.as_token(), area = area.0, "area_unlocked");
        }
        newly
    }

    pub(crate) fn unlocked_areas(&self, role: Role) -> &BTreeSet<AreaDefId> {
        &self.slots.get(role).unlocked
    }

    pub(crate) fn current_area(&self, role: Role) -> Option<AreaDefId> {
        self.slots.get(role).current_area
    }

    /// Area entry: unlocks (idempotently) and repoints the role's current
    /// area. Task selection is a separate read (`next_task`) so the caller
    /// controls when the task system is handed the result.
    pub(crate) fn enter_area(&mut self, role: Role, area: AreaDefId) {
        self.unlock_area(role, area);
        self.slots.get_mut(role).current_area = Some(area);
    }

    /// First uncompleted task for this role in its current area, in the
    /// area's authored order.
    pub(crate) fn next_task(
        &self,
        content: &ContentDatabase,
        role: Role,
    ) -> Result<Option<TaskDefId>, ProgressionError> {
        let Some(area) = self.current_area(role) else {
            return Ok(None);
        };
        let area_def = content
            .area(area)
            .ok_or(ProgressionError::UnknownArea { area })?;
        let completed = &self.slots.get(role).completed_tasks;
        Ok(area_def
            .tasks_for(role.to_content())
            .iter()
            .copied()
            .find(|task| !completed.contains(task)))
    }

    pub(crate) fn mark_task_completed(&mut self, role: Role, task: TaskDefId) {
        self.slots.get_mut(role).completed_tasks.insert(task);
    }

    pub(crate) fn is_task_completed(&self, role: Role, task: TaskDefId) -> bool {
        self.slots.get(role).completed_tasks.contains(&task)
    }

    pub(crate) fn completed_tasks(&self, role: Role) -> &BTreeSet<TaskDefId> {
        &self.slots.get(role).completed_tasks
    }

    pub(crate) fn reset(&mut self) {
        self.slots = RoleSlots::default();
    }
}
