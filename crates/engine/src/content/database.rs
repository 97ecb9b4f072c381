use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every non-placeholder area hides exactly this many collectible finds.
pub const FINDS_PER_AREA: usize = 10;

/// Content-side tag for the two playable twins. The runtime's role type maps
/// onto this at the crate boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleTag {
    Boy,
    Girl,
}

impl RoleTag {
    pub const BOTH: [RoleTag; 2] = [RoleTag::Boy, RoleTag::Girl];

    pub fn as_token(self) -> &'static str {
        match self {
            RoleTag::Boy => "boy",
            RoleTag::Girl => "girl",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HidingKind {
    Edge,
    Under,
    InOn,
    Landmark,
    SkillGated,
}

impl HidingKind {
    pub const ALL: [HidingKind; 5] = [
        HidingKind::Edge,
        HidingKind::Under,
        HidingKind::InOn,
        HidingKind::Landmark,
        HidingKind::SkillGated,
    ];

    pub fn parse_token(token: &str) -> Option<Self> {
        match token {
            "edge" => Some(HidingKind::Edge),
            "under" => Some(HidingKind::Under),
            "inOn" => Some(HidingKind::InOn),
            "landmark" => Some(HidingKind::Landmark),
            "skillGated" => Some(HidingKind::SkillGated),
            _ => None,
        }
    }

    pub fn as_token(self) -> &'static str {
        match self {
            HidingKind::Edge => "edge",
            HidingKind::Under => "under",
            HidingKind::InOn => "inOn",
            HidingKind::Landmark => "landmark",
            HidingKind::SkillGated => "skillGated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemDefId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskDefId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AreaDefId(pub u32);

#[derive(Debug, Clone)]
pub struct ItemDef {
    pub id: ItemDefId,
    pub def_name: String,
    pub label: String,
    pub icon: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TaskStep {
    pub step_id: String,
    pub target: String,
    pub requires: Vec<ItemDefId>,
    pub grants: Vec<ItemDefId>,
    pub consumes: Vec<ItemDefId>,
}

#[derive(Debug, Clone)]
pub struct TaskDef {
    pub id: TaskDefId,
    pub def_name: String,
    pub label: String,
    pub steps: Vec<TaskStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindSpec {
    pub find_id: String,
    pub hiding: HidingKind,
}

#[derive(Debug, Clone)]
pub struct AreaDef {
    pub id: AreaDefId,
    pub def_name: String,
    pub label: String,
    pub boy_tasks: Vec<TaskDefId>,
    pub girl_tasks: Vec<TaskDefId>,
    /// Interactable ids physically present in this area's scene.
    pub manifest: BTreeSet<String>,
    pub finds: Vec<FindSpec>,
    pub postcard_trigger: Option<String>,
    pub audio_zone: Option<String>,
    pub placeholder: bool,
}

impl AreaDef {
    pub fn tasks_for(&self, role: RoleTag) -> &[TaskDefId] {
        match role {
            RoleTag::Boy => &self.boy_tasks,
            RoleTag::Girl => &self.girl_tasks,
        }
    }

    pub fn has_find(&self, find_id: &str) -> bool {
        self.finds.iter().any(|find| find.find_id == find_id)
    }
}

#[derive(Debug, Error)]
pub enum ContentValidationError {
    #[error("task '{task}' (role {role}, area '{area}') is not a known TaskDef")]
    UnknownTaskRef {
        area: String,
        role: &'static str,
        task: String,
    },
    #[error("task '{task}' is assigned to both area '{first_area}' and area '{second_area}'")]
    TaskInMultipleAreas {
        task: String,
        first_area: String,
        second_area: String,
    },
    #[error("step '{step}' of task '{task}' references unknown item '{item}'")]
    UnknownItemRef {
        task: String,
        step: String,
        item: String,
    },
    #[error(
        "step '{step}' of task '{task}' targets '{target}', which is not in the world manifest of area '{area}'"
    )]
    StepTargetNotInManifest {
        area: String,
        task: String,
        step: String,
        target: String,
    },
    #[error("area '{area}' has no tasks for role {role} and is not flagged placeholder")]
    MissingRoleTasks { area: String, role: &'static str },
    #[error("area '{area}' declares {count} finds; expected exactly {expected}")]
    FindCountMismatch {
        area: String,
        count: usize,
        expected: usize,
    },
    #[error("area '{area}' declares duplicate find id '{find}'")]
    DuplicateFindId { area: String, find: String },
}

/// Raw (string-referenced) defs as parsed from XML, before id assignment and
/// cross-reference resolution. Also the compiled-pack wire form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct MergedRawDefs {
    pub items: Vec<RawItemDef>,
    pub tasks: Vec<RawTaskDef>,
    pub areas: Vec<RawAreaDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RawItemDef {
    pub def_name: String,
    pub label: String,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RawStep {
    pub step_id: String,
    pub target: String,
    pub requires: Vec<String>,
    pub grants: Vec<String>,
    pub consumes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RawTaskDef {
    pub def_name: String,
    pub label: String,
    pub steps: Vec<RawStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RawAreaDef {
    pub def_name: String,
    pub label: String,
    pub boy_tasks: Vec<String>,
    pub girl_tasks: Vec<String>,
    pub manifest: Vec<String>,
    pub finds: Vec<FindSpec>,
    pub postcard_trigger: Option<String>,
    pub audio_zone: Option<String>,
    pub placeholder: bool,
}

#[derive(Debug, Default, Clone)]
pub struct ContentDatabase {
    items: Vec<ItemDef>,
    tasks: Vec<TaskDef>,
    areas: Vec<AreaDef>,
    item_ids_by_name: HashMap<String, ItemDefId>,
    task_ids_by_name: HashMap<String, TaskDefId>,
    area_ids_by_name: HashMap<String, AreaDefId>,
    area_by_task: HashMap<TaskDefId, AreaDefId>,
}

impl ContentDatabase {
    /// Assigns ids in sorted defName order, resolves string refs, and
    /// enforces the referential-integrity rules. Runtime code trusts the
    /// result; all content errors stop here.
    pub(crate) fn from_raw(raw: MergedRawDefs) -> Result<Self, ContentValidationError> {
        let mut items: Vec<RawItemDef> = raw.items;
        items.sort_by(|a, b| a.def_name.cmp(&b.def_name));
        let mut tasks: Vec<RawTaskDef> = raw.tasks;
        tasks.sort_by(|a, b| a.def_name.cmp(&b.def_name));
        let mut areas: Vec<RawAreaDef> = raw.areas;
        areas.sort_by(|a, b| a.def_name.cmp(&b.def_name));

        let mut item_ids_by_name = HashMap::with_capacity(items.len());
        let items = items
            .into_iter()
            .enumerate()
            .map(|(idx, raw_item)| {
                let id = ItemDefId(idx as u32);
                item_ids_by_name.insert(raw_item.def_name.clone(), id);
                ItemDef {
                    id,
                    def_name: raw_item.def_name,
                    label: raw_item.label,
                    icon: raw_item.icon,
                }
            })
            .collect::<Vec<_>>();

        let mut task_ids_by_name = HashMap::with_capacity(tasks.len());
        for (idx, raw_task) in tasks.iter().enumerate() {
            task_ids_by_name.insert(raw_task.def_name.clone(), TaskDefId(idx as u32));
        }
        let tasks = tasks
            .into_iter()
            .enumerate()
            .map(|(idx, raw_task)| {
                let steps = raw_task
                    .steps
                    .iter()
                    .map(|raw_step| {
                        Ok(TaskStep {
                            step_id: raw_step.step_id.clone(),
                            target: raw_step.target.clone(),
                            requires: resolve_items(
                                &item_ids_by_name,
                                &raw_task.def_name,
                                raw_step,
                                &raw_step.requires,
                            )?,
                            grants: resolve_items(
                                &item_ids_by_name,
                                &raw_task.def_name,
                                raw_step,
                                &raw_step.grants,
                            )?,
                            consumes: resolve_items(
                                &item_ids_by_name,
                                &raw_task.def_name,
                                raw_step,
                                &raw_step.consumes,
                            )?,
                        })
                    })
                    .collect::<Result<Vec<_>, ContentValidationError>>()?;
                Ok(TaskDef {
                    id: TaskDefId(idx as u32),
                    def_name: raw_task.def_name,
                    label: raw_task.label,
                    steps,
                })
            })
            .collect::<Result<Vec<_>, ContentValidationError>>()?;

        let mut area_ids_by_name = HashMap::with_capacity(areas.len());
        let mut area_by_task = HashMap::<TaskDefId, AreaDefId>::new();
        let mut resolved_areas: Vec<AreaDef> = Vec::with_capacity(areas.len());
        for (idx, raw_area) in areas.into_iter().enumerate() {
            let id = AreaDefId(idx as u32);
            area_ids_by_name.insert(raw_area.def_name.clone(), id);

            let resolve_role_tasks =
                |role: RoleTag, refs: &[String]| -> Result<Vec<TaskDefId>, ContentValidationError> {
                    refs.iter()
                        .map(|task_name| {
                            task_ids_by_name.get(task_name).copied().ok_or_else(|| {
                                ContentValidationError::UnknownTaskRef {
                                    area: raw_area.def_name.clone(),
                                    role: role.as_token(),
                                    task: task_name.clone(),
                                }
                            })
                        })
                        .collect()
                };
            let boy_tasks = resolve_role_tasks(RoleTag::Boy, &raw_area.boy_tasks)?;
            let girl_tasks = resolve_role_tasks(RoleTag::Girl, &raw_area.girl_tasks)?;

            if !raw_area.placeholder {
                if boy_tasks.is_empty() {
                    return Err(ContentValidationError::MissingRoleTasks {
                        area: raw_area.def_name,
                        role: RoleTag::Boy.as_token(),
                    });
                }
                if girl_tasks.is_empty() {
                    return Err(ContentValidationError::MissingRoleTasks {
                        area: raw_area.def_name,
                        role: RoleTag::Girl.as_token(),
                    });
                }
            }

            let expected_finds = if raw_area.placeholder && raw_area.finds.is_empty() {
                0
            } else {
                FINDS_PER_AREA
            };
            if raw_area.finds.len() != expected_finds {
                return Err(ContentValidationError::FindCountMismatch {
                    area: raw_area.def_name,
                    count: raw_area.finds.len(),
                    expected: expected_finds,
                });
            }
            let mut seen_finds = BTreeSet::<&str>::new();
            for find in &raw_area.finds {
                if !seen_finds.insert(find.find_id.as_str()) {
                    return Err(ContentValidationError::DuplicateFindId {
                        area: raw_area.def_name,
                        find: find.find_id.clone(),
                    });
                }
            }

            for task_id in boy_tasks.iter().chain(girl_tasks.iter()) {
                if let Some(first_area) = area_by_task.insert(*task_id, id) {
                    if first_area != id {
                        let task_name = tasks[task_id.0 as usize].def_name.clone();
                        let first_name = resolved_areas[first_area.0 as usize]
                            .def_name
                            .clone();
                        return Err(ContentValidationError::TaskInMultipleAreas {
                            task: task_name,
                            first_area: first_name,
                            second_area: raw_area.def_name,
                        });
                    }
                }
            }

            resolved_areas.push(AreaDef {
                id,
                def_name: raw_area.def_name,
                label: raw_area.label,
                boy_tasks,
                girl_tasks,
                manifest: raw_area.manifest.into_iter().collect(),
                finds: raw_area.finds,
                postcard_trigger: raw_area.postcard_trigger,
                audio_zone: raw_area.audio_zone,
                placeholder: raw_area.placeholder,
            });
        }

        for area in &resolved_areas {
            for task_id in area.boy_tasks.iter().chain(area.girl_tasks.iter()) {
                let task = &tasks[task_id.0 as usize];
                for step in &task.steps {
                    if !area.manifest.contains(&step.target) {
                        return Err(ContentValidationError::StepTargetNotInManifest {
                            area: area.def_name.clone(),
                            task: task.def_name.clone(),
                            step: step.step_id.clone(),
                            target: step.target.clone(),
                        });
                    }
                }
            }
        }

        Ok(Self {
            items,
            tasks,
            areas: resolved_areas,
            item_ids_by_name,
            task_ids_by_name,
            area_ids_by_name,
            area_by_task,
        })
    }

    pub fn item(&self, id: ItemDefId) -> Option<&ItemDef> {
        self.items.get(id.0 as usize)
    }

    pub fn item_id_by_name(&self, name: &str) -> Option<ItemDefId> {
        self.item_ids_by_name.get(name).copied()
    }

    pub fn task(&self, id: TaskDefId) -> Option<&TaskDef> {
        self.tasks.get(id.0 as usize)
    }

    pub fn task_id_by_name(&self, name: &str) -> Option<TaskDefId> {
        self.task_ids_by_name.get(name).copied()
    }

    pub fn area(&self, id: AreaDefId) -> Option<&AreaDef> {
        self.areas.get(id.0 as usize)
    }

    pub fn area_id_by_name(&self, name: &str) -> Option<AreaDefId> {
        self.area_ids_by_name.get(name).copied()
    }

    /// The area a task is assigned to; validation guarantees at most one.
    pub fn area_of_task(&self, task: TaskDefId) -> Option<AreaDefId> {
        self.area_by_task.get(&task).copied()
    }

    pub fn items(&self) -> &[ItemDef] {
        &self.items
    }

    pub fn tasks(&self) -> &[TaskDef] {
        &self.tasks
    }

    pub fn areas(&self) -> &[AreaDef] {
        &self.areas
    }
}

fn resolve_items(
    item_ids_by_name: &HashMap<String, ItemDefId>,
    task_name: &str,
    step: &RawStep,
    refs: &[String],
) -> Result<Vec<ItemDefId>, ContentValidationError> {
    refs.iter()
        .map(|item_name| {
            item_ids_by_name.get(item_name).copied().ok_or_else(|| {
                ContentValidationError::UnknownItemRef {
                    task: task_name.to_string(),
                    step: step.step_id.clone(),
                    item: item_name.clone(),
                }
            })
        })
        .collect()
}

/// Keyed merge across load-ordered sources: later sources replace earlier
/// defs with the same defName, per def type.
pub(crate) fn merge_source_defs(per_source: Vec<MergedRawDefs>) -> MergedRawDefs {
    let mut items = BTreeMap::<String, RawItemDef>::new();
    let mut tasks = BTreeMap::<String, RawTaskDef>::new();
    let mut areas = BTreeMap::<String, RawAreaDef>::new();
    for source in per_source {
        for item in source.items {
            items.insert(item.def_name.clone(), item);
        }
        for task in source.tasks {
            tasks.insert(task.def_name.clone(), task);
        }
        for area in source.areas {
            areas.insert(area.def_name.clone(), area);
        }
    }
    MergedRawDefs {
        items: items.into_values().collect(),
        tasks: tasks.into_values().collect(),
        areas: areas.into_values().collect(),
    }
}
