use engine::{ContentDatabase, ItemDefId, TaskDef, TaskDefId, TaskStep};
use thiserror::Error;
use tracing::debug;

use super::roles::{Role, RoleChangeError, RoleSlots};
use super::INVENTORY_SLOT_COUNT;

/// Per-role task state machine: no active task, step N of task T in
/// progress, or task complete. Steps are linear; branching is a content
/// non-feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum TaskProgress {
    #[default]
    Idle,
    InProgress {
        task: TaskDefId,
        step_index: usize,
    },
    Completed {
        task: TaskDefId,
    },
}

/// Slot-capped, per-role held items. An item is possessed or not; there is
/// no quantity stacking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Inventory {
    items: Vec<ItemDefId>,
}

impl Inventory {
    pub(crate) fn has(&self, item: ItemDefId) -> bool {
        self.items.contains(&item)
    }

    pub(crate) fn count(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn item_ids(&self) -> &[ItemDefId] {
        &self.items
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StepAttemptOutcome {
    /// Supplied target is not the active step's target (or no task is
    /// active). Not an error: players tap irrelevant objects constantly.
    WrongTarget,
    /// Required items are not all held. Retryable, nothing mutated.
    MissingRequirements { missing: Vec<ItemDefId> },
    /// Granting would overflow the slot cap. Retryable after making room;
    /// nothing mutated, consumed items included.
    InventoryFull { needed: usize, free: usize },
    StepAdvanced {
        step_id: String,
        next_step_index: usize,
    },
    TaskCompleted {
        task: TaskDefId,
        step_id: String,
    },
}

#[derive(Debug, Error)]
pub(crate) enum TaskError {
    #[error("unknown task def id {task:?}; content validation should have caught this")]
    UnknownTask { task: TaskDefId },
    #[error("task '{task}' is already active and incomplete for role {role}")]
    TaskAlreadyActive { role: &'static str, task: String },
    #[error("restored step index {step_index} out of range for task '{task}'")]
    StepIndexOutOfRange { task: String, step_index: usize },
    #[error("restored inventory of {count} items exceeds the {cap}-slot cap")]
    InventoryOverCapacity { count: usize, cap: usize },
}

#[derive(Debug, Default)]
pub(crate) struct TaskSystem {
    active_role: Option<Role>,
    progress: RoleSlots<TaskProgress>,
    inventories: RoleSlots<Inventory>,
}

impl TaskSystem {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Role-change notification from the registry; never sourced elsewhere.
    pub(crate) fn apply_role_change(&mut self, role: Role) -> Result<(), RoleChangeError> {
        self.active_role = Some(role);
        Ok(())
    }

    pub(crate) fn current_role(&self) -> Option<Role> {
        self.active_role
    }

    pub(crate) fn progress(&self, role: Role) -> TaskProgress {
        *self.progress.get(role)
    }

    pub(crate) fn inventory(&self, role: Role) -> &Inventory {
        self.inventories.get(role)
    }

    pub(crate) fn current_step<'c>(
        &self,
        content: &'c ContentDatabase,
        role: Role,
    ) -> Result<Option<(&'c TaskDef, &'c TaskStep)>, TaskError> {
        let TaskProgress::InProgress { task, step_index } = self.progress(role) else {
            return Ok(None);
        };
        let task_def = content
            .task(task)
            .ok_or(TaskError::UnknownTask { task })?;
        Ok(task_def.steps.get(step_index).map(|step| (task_def, step)))
    }

    /// Starting an unknown task is a content bug and fails loudly; starting
    /// over an incomplete task is a programming error at the call site.
    pub(crate) fn start_task(
        &mut self,
        content: &ContentDatabase,
        role: Role,
        task: TaskDefId,
    ) -> Result<(), TaskError> {
        let task_def = content
            .task(task)
            .ok_or(TaskError::UnknownTask { task })?;
        if let TaskProgress::InProgress { task: active, .. } = self.progress(role) {
            let active_name = content
                .task(active)
                .map(|def| def.def_name.clone())
                .unwrap_or_else(|| format!("{active:?}"));
            return Err(TaskError::TaskAlreadyActive {
                role: role.as_token(),
                task: active_name,
            });
        }
        *self.progress.get_mut(role) = TaskProgress::InProgress {
            task,
            step_index: 0,
        };
        debug!(
            role = role.as_token(),
            task = %task_def.def_name,
            "task_started"
        );
        Ok(())
    }

    /// One world interaction against the active step. Mutates nothing unless
    /// the target matches, requirements are held, and the grant fits the
    /// slot cap; then consumes, grants, and advances in one motion.
    pub(crate) fn attempt_step(
        &mut self,
        content: &ContentDatabase,
        role: Role,
        target: &str,
    ) -> Result<StepAttemptOutcome, TaskError> {
        let TaskProgress::InProgress { task, step_index } = self.progress(role) else {
            return Ok(StepAttemptOutcome::WrongTarget);
        };
        let task_def = content
            .task(task)
            .ok_or(TaskError::UnknownTask { task })?;
        let step = task_def
            .steps
            .get(step_index)
            .ok_or_else(|| TaskError::StepIndexOutOfRange {
                task: task_def.def_name.clone(),
                step_index,
            })?;
        if step.target != target {
            return Ok(StepAttemptOutcome::WrongTarget);
        }

        let inventory = self.inventories.get_mut(role);
        let missing: Vec<ItemDefId> = step
            .requires
            .iter()
            .copied()
            .filter(|item| !inventory.has(*item))
            .collect();
        if !missing.is_empty() {
            debug!(
                role = role.as_token(),
                task = %task_def.def_name,
                step = %step.step_id,
                missing_count = missing.len(),
                "step_requirements_not_met"
            );
            return Ok(StepAttemptOutcome::MissingRequirements { missing });
        }

        // Compute the post-step item set before touching the inventory, so a
        // grant that cannot fit leaves consumed items in place.
        let mut next_items = inventory.items.clone();
        next_items.retain(|item| !step.consumes.contains(item));
        let mut needed = 0usize;
        for grant in &step.grants {
            if !next_items.contains(grant) {
                next_items.push(*grant);
                needed += 1;
            }
        }
        if next_items.len() > INVENTORY_SLOT_COUNT {
            let free = INVENTORY_SLOT_COUNT.saturating_sub(next_items.len() - needed);
            debug!(
                role = role.as_token(),
                task = %task_def.def_name,
                step = %step.step_id,
                needed,
                free,
                "step_grant_over_slot_cap"
            );
            return Ok(StepAttemptOutcome::InventoryFull { needed, free });
        }
        inventory.items = next_items;

        let step_id = step.step_id.clone();
        if step_index + 1 == task_def.steps.len() {
            *self.progress.get_mut(role) = TaskProgress::Completed { task };
            Ok(StepAttemptOutcome::TaskCompleted { task, step_id })
        } else {
            *self.progress.get_mut(role) = TaskProgress::InProgress {
                task,
                step_index: step_index + 1,
            };
            Ok(StepAttemptOutcome::StepAdvanced {
                step_id,
                next_step_index: step_index + 1,
            })
        }
    }

    /// Save-restore entry point; validates against the slot cap and the
    /// task's step range before accepting anything.
    pub(crate) fn restore(
        &mut self,
        content: &ContentDatabase,
        role: Role,
        progress: TaskProgress,
        items: Vec<ItemDefId>,
    ) -> Result<(), TaskError> {
        if items.len() > INVENTORY_SLOT_COUNT {
            return Err(TaskError::InventoryOverCapacity {
                count: items.len(),
                cap: INVENTORY_SLOT_COUNT,
            });
        }
        if let TaskProgress::InProgress { task, step_index } = progress {
            let task_def = content
                .task(task)
                .ok_or(TaskError::UnknownTask { task })?;
            if step_index >= task_def.steps.len() {
                return Err(TaskError::StepIndexOutOfRange {
                    task: task_def.def_name.clone(),
                    step_index,
                });
            }
        }
        *self.progress.get_mut(role) = progress;
        self.inventories.get_mut(role).items = items;
        Ok(())
    }

    pub(crate) fn reset(&mut self) {
        self.progress = RoleSlots::default();
        self.inventories = RoleSlots::default();
    }
}
