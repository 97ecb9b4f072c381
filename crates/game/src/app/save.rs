use engine::{AreaDefId, ContentDatabase, ItemDefId, TaskDefId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::collections::{AreaCollectionState, CollectionsSnapshot, CollectionsSystem};
use super::progression::ProgressionSystem;
use super::roles::{Role, RoleChangeError};
use super::tasks::{TaskProgress, TaskSystem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SaveReason {
    Interval,
    TaskCompleted,
    AreaChange,
    RoleSwitch,
    Manual,
}

impl SaveReason {
    pub(crate) fn as_token(self) -> &'static str {
        match self {
            SaveReason::Interval => "interval",
            SaveReason::TaskCompleted => "task_completed",
            SaveReason::AreaChange => "area_change",
            SaveReason::RoleSwitch => "role_switch",
            SaveReason::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SavedRole {
    Boy,
    Girl,
}

impl SavedRole {
    pub(crate) fn from_role(role: Role) -> Self {
        match role {
            Role::Boy => SavedRole::Boy,
            Role::Girl => SavedRole::Girl,
        }
    }

    pub(crate) fn to_role(self) -> Role {
        match self {
            SavedRole::Boy => Role::Boy,
            SavedRole::Girl => Role::Girl,
        }
    }
}

/// Saves reference defs by defName; numeric def ids are not stable across
/// content edits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct SavedRoleState {
    pub current_area: Option<String>,
    pub current_task: Option<String>,
    pub current_step_index: Option<usize>,
    pub completed_tasks: Vec<String>,
    pub unlocked_areas: Vec<String>,
    pub inventory: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SaveRecord {
    /// Role active at the instant of serialization, sourced from the Role
    /// Registry and nowhere else.
    pub active_role: SavedRole,
    pub boy: SavedRoleState,
    pub girl: SavedRoleState,
    pub collections: CollectionsSnapshot,
}

impl SaveRecord {
    pub(crate) fn role_state(&self, role: Role) -> &SavedRoleState {
        match role {
            Role::Boy => &self.boy,
            Role::Girl => &self.girl,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum SaveBuildError {
    #[error("unknown area def id {area:?} while serializing")]
    UnknownArea { area: AreaDefId },
    #[error("unknown task def id {task:?} while serializing")]
    UnknownTask { task: TaskDefId },
    #[error("unknown item def id {item:?} while serializing")]
    UnknownItem { item: ItemDefId },
}

#[derive(Debug, Error)]
pub(crate) enum RestoreError {
    #[error("saved area '{name}' is not in the current content set")]
    UnknownAreaName { name: String },
    #[error("saved task '{name}' is not in the current content set")]
    UnknownTaskName { name: String },
    #[error("saved item '{name}' is not in the current content set")]
    UnknownItemName { name: String },
    #[error("saved find '{find}' is not declared by area '{area}'")]
    UnknownFindId { area: String, find: String },
    #[error("saved record failed decoding at {path}: {message}")]
    Undecodable { path: String, message: String },
}

pub(crate) fn build_save_record(
    active_role: Role,
    tasks: &TaskSystem,
    progression: &ProgressionSystem,
    collections: &CollectionsSystem,
    content: &ContentDatabase,
) -> Result<SaveRecord, SaveBuildError> {
    Ok(SaveRecord {
        active_role: SavedRole::from_role(active_role),
        boy: build_role_state(Role::Boy, tasks, progression, content)?,
        girl: build_role_state(Role::Girl, tasks, progression, content)?,
        collections: collections.snapshot(content),
    })
}

fn build_role_state(
    role: Role,
    tasks: &TaskSystem,
    progression: &ProgressionSystem,
    content: &ContentDatabase,
) -> Result<SavedRoleState, SaveBuildError> {
    let area_name = |area: AreaDefId| -> Result<String, SaveBuildError> {
        content
            .area(area)
            .map(|def| def.def_name.clone())
            .ok_or(SaveBuildError::UnknownArea { area })
    };
    let task_name = |task: TaskDefId| -> Result<String, SaveBuildError> {
        content
            .task(task)
            .map(|def| def.def_name.clone())
            .ok_or(SaveBuildError::UnknownTask { task })
    };

    let (current_task, current_step_index) = match tasks.progress(role) {
        TaskProgress::InProgress { task, step_index } => (Some(task_name(task)?), Some(step_index)),
        TaskProgress::Idle | TaskProgress::Completed { .. } => (None, None),
    };

    Ok(SavedRoleState {
        current_area: progression
            .current_area(role)
            .map(&area_name)
            .transpose()?,
        current_task,
        current_step_index,
        completed_tasks: progression
            .completed_tasks(role)
            .iter()
            .copied()
            .map(&task_name)
            .collect::<Result<_, _>>()?,
        unlocked_areas: progression
            .unlocked_areas(role)
            .iter()
            .copied()
            .map(&area_name)
            .collect::<Result<_, _>>()?,
        inventory: tasks
            .inventory(role)
            .item_ids()
            .iter()
            .map(|item| {
                content
                    .item(*item)
                    .map(|def| def.def_name.clone())
                    .ok_or(SaveBuildError::UnknownItem { item: *item })
            })
            .collect::<Result<_, _>>()?,
    })
}

/// Decode with JSON-path context so a half-corrupt save names the field that
/// broke before the caller falls back to defaults.
pub(crate) fn decode_save_record(payload: serde_json::Value) -> Result<SaveRecord, RestoreError> {
    serde_path_to_error::deserialize::<_, SaveRecord>(payload).map_err(|error| {
        let path = error.path().to_string();
        let message = error.into_inner().to_string();
        let path = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        RestoreError::Undecodable { path, message }
    })
}

#[derive(Debug, Default)]
pub(crate) struct RestoredRoleState {
    pub unlocked: Vec<AreaDefId>,
    pub current_area: Option<AreaDefId>,
    pub completed: Vec<TaskDefId>,
    pub progress: TaskProgress,
    pub inventory: Vec<ItemDefId>,
}

pub(crate) fn resolve_saved_role_state(
    content: &ContentDatabase,
    saved: &SavedRoleState,
) -> Result<RestoredRoleState, RestoreError> {
    let area_id = |name: &String| -> Result<AreaDefId, RestoreError> {
        content
            .area_id_by_name(name)
            .ok_or_else(|| RestoreError::UnknownAreaName { name: name.clone() })
    };
    let task_id = |name: &String| -> Result<TaskDefId, RestoreError> {
        content
            .task_id_by_name(name)
            .ok_or_else(|| RestoreError::UnknownTaskName { name: name.clone() })
    };

    let progress = match (&saved.current_task, saved.current_step_index) {
        (Some(name), Some(step_index)) => TaskProgress::InProgress {
            task: task_id(name)?,
            step_index,
        },
        (Some(name), None) => TaskProgress::InProgress {
            task: task_id(name)?,
            step_index: 0,
        },
        (None, _) => TaskProgress::Idle,
    };

    Ok(RestoredRoleState {
        unlocked: saved
            .unlocked_areas
            .iter()
            .map(area_id)
            .collect::<Result<_, _>>()?,
        current_area: saved.current_area.as_ref().map(area_id).transpose()?,
        completed: saved
            .completed_tasks
            .iter()
            .map(task_id)
            .collect::<Result<_, _>>()?,
        progress,
        inventory: saved
            .inventory
            .iter()
            .map(|name| {
                content
                    .item_id_by_name(name)
                    .ok_or_else(|| RestoreError::UnknownItemName { name: name.clone() })
            })
            .collect::<Result<_, _>>()?,
    })
}

pub(crate) fn resolve_saved_collections(
    content: &ContentDatabase,
    saved: &CollectionsSnapshot,
) -> Result<(Vec<(AreaDefId, AreaCollectionState)>, Vec<String>), RestoreError> {
    let area_id = |name: &str| -> Result<AreaDefId, RestoreError> {
        content
            .area_id_by_name(name)
            .ok_or_else(|| RestoreError::UnknownAreaName {
                name: name.to_string(),
            })
    };

    let mut touched_areas = std::collections::BTreeSet::<&str>::new();
    touched_areas.extend(saved.finds_by_area.keys().map(String::as_str));
    touched_areas.extend(saved.trophies_by_area.iter().map(String::as_str));
    touched_areas.extend(saved.postcards_by_area.iter().map(String::as_str));
    touched_areas.extend(saved.audio_by_area.iter().map(String::as_str));

    let mut per_area = Vec::with_capacity(touched_areas.len());
    for area_name in touched_areas {
        let area = area_id(area_name)?;
        let area_def = content.area(area).ok_or_else(|| RestoreError::UnknownAreaName {
            name: area_name.to_string(),
        })?;
        let finds = saved
            .finds_by_area
            .get(area_name)
            .cloned()
            .unwrap_or_default();
        for find in &finds {
            if !area_def.has_find(find) {
                return Err(RestoreError::UnknownFindId {
                    area: area_name.to_string(),
                    find: find.clone(),
                });
            }
        }
        let contains = |names: &[String]| names.iter().any(|name| name == area_name);
        per_area.push((
            area,
            AreaCollectionState::from_saved(
                finds,
                contains(&saved.trophies_by_area),
                contains(&saved.postcards_by_area),
                contains(&saved.audio_by_area),
            ),
        ));
    }

    Ok((per_area, saved.camp_upgrades.clone()))
}

/// Timer plus bookkeeping for periodic and event-triggered saves. Tracks its
/// own view of the active role only so the consistency snapshot can compare
/// it against the registry's truth; the role written into a record always
/// comes from the registry.
#[derive(Debug)]
pub(crate) struct AutosaveSystem {
    active_role: Option<Role>,
    interval_seconds: f32,
    elapsed_seconds: f32,
    last_write_role: Option<Role>,
    write_count: u64,
}

impl AutosaveSystem {
    pub(crate) fn new(interval_seconds: f32) -> Self {
        Self {
            active_role: None,
            interval_seconds,
            elapsed_seconds: 0.0,
            last_write_role: None,
            write_count: 0,
        }
    }

    pub(crate) fn apply_role_change(&mut self, role: Role) -> Result<(), RoleChangeError> {
        self.active_role = Some(role);
        Ok(())
    }

    pub(crate) fn reported_active_role(&self) -> Option<Role> {
        self.active_role
    }

    /// Advances the timer; true means an interval save is due.
    pub(crate) fn tick(&mut self, dt_seconds: f32) -> bool {
        self.elapsed_seconds += dt_seconds.max(0.0);
        self.elapsed_seconds >= self.interval_seconds
    }

    pub(crate) fn note_save_completed(&mut self, role: Role) {
        self.last_write_role = Some(role);
        self.write_count = self.write_count.saturating_add(1);
        self.elapsed_seconds = 0.0;
    }

    pub(crate) fn last_write_role(&self) -> Option<Role> {
        self.last_write_role
    }

    pub(crate) fn write_count(&self) -> u64 {
        self.write_count
    }
}
