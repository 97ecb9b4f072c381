use engine::{AreaDefId, ContentDatabase, EventBus, Stage, Store, Subscription, TaskDefId};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::collections::{CollectionsChange, CollectionsError, CollectionsSystem};
use super::events::GameEvent;
use super::progression::{ProgressionError, ProgressionSystem};
use super::roles::{Role, RoleRegistry, RoleSwitchError, RoleSwitchReceipt, RoleSwitchTxn};
use super::save::{
    build_save_record, decode_save_record, resolve_saved_collections, resolve_saved_role_state,
    AutosaveSystem, RestoreError, SaveReason, SaveRecord,
};
use super::snapshot::{ConsistencyProbe, RoleSnapshot};
use super::tasks::{StepAttemptOutcome, TaskError, TaskProgress, TaskSystem};
use super::world::{PlayerController, WorldError};
use super::{
    AUTOSAVE_INTERVAL_SECONDS, SAVE_RECORD_KEY, SAVE_VERSION, STARTING_AREA,
};

#[derive(Debug, Clone)]
pub(crate) struct SessionConfig {
    pub initial_role: Role,
    pub starting_area: String,
    pub autosave_interval_seconds: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_role: Role::Boy,
            starting_area: STARTING_AREA.to_string(),
            autosave_interval_seconds: AUTOSAVE_INTERVAL_SECONDS,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("unknown area '{name}' in content")]
    UnknownAreaName { name: String },
    #[error(transparent)]
    RoleSwitch(#[from] RoleSwitchError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Progression(#[from] ProgressionError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Collections(#[from] CollectionsError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InteractionOutcome {
    Find {
        newly_found: bool,
        trophy_awarded: bool,
    },
    Postcard {
        newly_awarded: bool,
    },
    AudioUnlock {
        newly_unlocked: bool,
    },
    Step(StepAttemptOutcome),
    NoAreaLoaded,
}

/// Single-threaded conductor owning every core system. All state mutation
/// happens synchronously inside its methods; there is no concurrency to
/// defend against, only ordering.
pub(crate) struct GameSession {
    pub(crate) content: ContentDatabase,
    pub(crate) store: Store,
    pub(crate) stage: Stage,
    pub(crate) bus: EventBus<GameEvent>,
    pub(crate) registry: RoleRegistry,
    pub(crate) tasks: TaskSystem,
    pub(crate) world: PlayerController,
    pub(crate) progression: ProgressionSystem,
    pub(crate) collections: CollectionsSystem,
    pub(crate) autosave: AutosaveSystem,
    starting_area: AreaDefId,
    initial_role: Role,
}

impl GameSession {
    pub(crate) fn start(
        content: ContentDatabase,
        store: Store,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let starting_area = content
            .area_id_by_name(&config.starting_area)
            .ok_or_else(|| SessionError::UnknownAreaName {
                name: config.starting_area.clone(),
            })?;
        let mut session = Self {
            content,
            store,
            stage: Stage::new(),
            bus: EventBus::new(),
            registry: RoleRegistry::new(config.initial_role),
            tasks: TaskSystem::new(),
            world: PlayerController::new(),
            progression: ProgressionSystem::new(),
            collections: CollectionsSystem::new(),
            autosave: AutosaveSystem::new(config.autosave_interval_seconds),
            starting_area,
            initial_role: config.initial_role,
        };
        session.world.spawn_rigs(&mut session.stage);
        session.restore_from_store();
        session.broadcast_active_role()?;
        let role = session.registry.active_role();
        let area = session
            .progression
            .current_area(role)
            .unwrap_or(session.starting_area);
        session.enter_area_id(role, area)?;
        Ok(session)
    }

    pub(crate) fn active_role(&self) -> Role {
        self.registry.active_role()
    }

    /// The one sanctioned way to change twins. The registry fans the change
    /// out to every dependent synchronously; only a completed switch emits
    /// the event and triggers the role-switch save.
    pub(crate) fn switch_role(&mut self, to: Role) -> Result<RoleSwitchReceipt, SessionError> {
        let receipt = self.registry.switch_role(
            to,
            RoleSwitchTxn {
                tasks: &mut self.tasks,
                world: &mut self.world,
                progression: &mut self.progression,
                autosave: &mut self.autosave,
                stage: &mut self.stage,
            },
        )?;
        if !receipt.changed {
            return Ok(receipt);
        }
        self.bus.emit(GameEvent::CharacterSwitch { role: to });

        // The incoming twin may be standing in a different area.
        let area = self
            .progression
            .current_area(to)
            .unwrap_or(self.starting_area);
        if self.world.loaded_area() != Some(area) {
            self.enter_area_id(to, area)?;
        } else {
            self.progression.enter_area(to, area);
            self.start_next_task_if_idle(to)?;
        }
        self.save_now(SaveReason::RoleSwitch);
        Ok(receipt)
    }

    pub(crate) fn enter_area(&mut self, area_name: &str) -> Result<(), SessionError> {
        let area = self
            .content
            .area_id_by_name(area_name)
            .ok_or_else(|| SessionError::UnknownAreaName {
                name: area_name.to_string(),
            })?;
        let role = self.registry.active_role();
        let changed = self.progression.current_area(role) != Some(area);
        self.enter_area_id(role, area)?;
        if changed {
            self.save_now(SaveReason::AreaChange);
        }
        Ok(())
    }

    /// One world tap/collision, routed by id: area finds, the postcard
    /// trigger, and audio zones go to collections; everything else is a step
    /// attempt against the active task.
    pub(crate) fn handle_interaction(
        &mut self,
        target_id: &str,
    ) -> Result<InteractionOutcome, SessionError> {
        let role = self.registry.active_role();
        let Some(area) = self.world.loaded_area() else {
            return Ok(InteractionOutcome::NoAreaLoaded);
        };
        let area_def = self
            .content
            .area(area)
            .ok_or(WorldError::UnknownArea { area })?;
        let is_find = area_def.has_find(target_id);
        let is_postcard = area_def.postcard_trigger.as_deref() == Some(target_id);
        let is_audio = area_def.audio_zone.as_deref() == Some(target_id);

        if is_find {
            let change = self.collections.record_find(&self.content, area, target_id)?;
            if change.is_updated() {
                self.emit_collections_update();
            }
            return Ok(InteractionOutcome::Find {
                newly_found: change.is_updated(),
                trophy_awarded: matches!(
                    change,
                    CollectionsChange::Updated {
                        trophy_awarded: true
                    }
                ),
            });
        }
        if is_postcard {
            let change = self.collections.record_postcard(&self.content, area)?;
            if change.is_updated() {
                self.emit_collections_update();
            }
            return Ok(InteractionOutcome::Postcard {
                newly_awarded: change.is_updated(),
            });
        }
        if is_audio {
            let change = self.collections.record_audio_unlock(&self.content, area)?;
            if change.is_updated() {
                self.emit_collections_update();
            }
            return Ok(InteractionOutcome::AudioUnlock {
                newly_unlocked: change.is_updated(),
            });
        }

        let inventory_before = self.tasks.inventory(role).clone();
        let outcome = self.tasks.attempt_step(&self.content, role, target_id)?;
        match &outcome {
            StepAttemptOutcome::WrongTarget
            | StepAttemptOutcome::MissingRequirements { .. }
            | StepAttemptOutcome::InventoryFull { .. } => {}
            StepAttemptOutcome::StepAdvanced { step_id, .. } => {
                self.emit_inventory_if_changed(role, &inventory_before);
                if let TaskProgress::InProgress { task, .. } = self.tasks.progress(role) {
                    let task_name = self.task_name(task)?;
                    self.bus.emit(GameEvent::TaskStepCompleted {
                        role,
                        task: task_name,
                        step_id: step_id.clone(),
                    });
                }
            }
            StepAttemptOutcome::TaskCompleted { task, step_id } => {
                self.emit_inventory_if_changed(role, &inventory_before);
                let task_name = self.task_name(*task)?;
                self.bus.emit(GameEvent::TaskStepCompleted {
                    role,
                    task: task_name.clone(),
                    step_id: step_id.clone(),
                });
                self.bus.emit(GameEvent::TaskCompleted {
                    role,
                    task: task_name.clone(),
                });
                info!(
                    role = role.as_token(),
                    task = %task_name,
                    "task_completed"
                );
                self.progression.mark_task_completed(role, *task);
                self.start_next_task_if_idle(role)?;
                self.save_now(SaveReason::TaskCompleted);
            }
        }
        Ok(InteractionOutcome::Step(outcome))
    }

    pub(crate) fn record_camp_upgrade(&mut self, upgrade_id: &str) -> bool {
        let changed = self.collections.record_camp_upgrade(upgrade_id).is_updated();
        if changed {
            self.emit_collections_update();
        }
        changed
    }

    /// Per-frame driver hook; fires the interval autosave when due.
    pub(crate) fn tick(&mut self, dt_seconds: f32) -> bool {
        if self.autosave.tick(dt_seconds) {
            self.save_now(SaveReason::Interval)
        } else {
            false
        }
    }

    /// Serializes both twins plus shared collections, tagged with the role
    /// the registry reports at this instant. Persistence failures are logged
    /// and absorbed; losing a save must never crash the session.
    pub(crate) fn save_now(&mut self, reason: SaveReason) -> bool {
        self.bus.emit(GameEvent::SaveRequested { reason });
        let active = self.registry.active_role();
        let record = match build_save_record(
            active,
            &self.tasks,
            &self.progression,
            &self.collections,
            &self.content,
        ) {
            Ok(record) => record,
            Err(error) => {
                warn!(error = %error, reason = reason.as_token(), "save_build_failed");
                return false;
            }
        };
        if let Err(error) = self.store.put(SAVE_RECORD_KEY, SAVE_VERSION, &record) {
            warn!(error = %error, reason = reason.as_token(), "save_write_failed");
            return false;
        }
        self.autosave.note_save_completed(active);
        self.bus.emit(GameEvent::SaveCompleted {
            role: active,
            reason,
        });
        debug!(
            role = active.as_token(),
            reason = reason.as_token(),
            write_count = self.autosave.write_count(),
            "save_completed"
        );
        true
    }

    pub(crate) fn role_snapshot(&self) -> RoleSnapshot {
        ConsistencyProbe::new(&self.tasks, &self.world, &self.progression, &self.autosave)
            .capture(&self.content)
    }

    pub(crate) fn subscribe_events(&mut self) -> Subscription {
        self.bus.subscribe()
    }

    pub(crate) fn poll_events(&mut self, subscription: &Subscription) -> Vec<GameEvent> {
        self.bus.poll(subscription)
    }

    pub(crate) fn progression_report(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for role in Role::BOTH {
            let area = self
                .progression
                .current_area(role)
                .and_then(|area| self.content.area(area))
                .map(|def| def.def_name.clone())
                .unwrap_or_else(|| "none".to_string());
            let task = match self.tasks.progress(role) {
                TaskProgress::InProgress { task, .. } => {
                    let step = self
                        .tasks
                        .current_step(&self.content, role)
                        .ok()
                        .flatten()
                        .map(|(_, step)| step.step_id.clone())
                        .unwrap_or_else(|| "?".to_string());
                    self.content
                        .task(task)
                        .map(|def| format!("{} (step {step})", def.def_name))
                        .unwrap_or_else(|| "unknown".to_string())
                }
                TaskProgress::Completed { task } => self
                    .content
                    .task(task)
                    .map(|def| format!("{} (complete)", def.def_name))
                    .unwrap_or_else(|| "unknown".to_string()),
                TaskProgress::Idle => "none".to_string(),
            };
            lines.push(format!(
                "{}: area={} task={} unlocked_areas={} inventory={}/{}",
                role.as_token(),
                area,
                task,
                self.progression.unlocked_areas(role).len(),
                self.tasks.inventory(role).count(),
                super::INVENTORY_SLOT_COUNT,
            ));
        }
        let snapshot = self.collections.snapshot(&self.content);
        lines.push(format!(
            "collections: areas_with_finds={} trophies={} postcards={} audio={} camp_upgrades={}",
            snapshot.finds_by_area.len(),
            snapshot.trophies_by_area.len(),
            snapshot.postcards_by_area.len(),
            snapshot.audio_by_area.len(),
            snapshot.camp_upgrades.len(),
        ));
        lines
    }

    fn broadcast_active_role(&mut self) -> Result<(), SessionError> {
        self.registry.broadcast(RoleSwitchTxn {
            tasks: &mut self.tasks,
            world: &mut self.world,
            progression: &mut self.progression,
            autosave: &mut self.autosave,
            stage: &mut self.stage,
        })?;
        Ok(())
    }

    fn enter_area_id(&mut self, role: Role, area: AreaDefId) -> Result<(), SessionError> {
        self.progression.enter_area(role, area);
        self.world.load_area(&mut self.stage, &self.content, area)?;
        let area_name = self
            .content
            .area(area)
            .map(|def| def.def_name.clone())
            .ok_or(WorldError::UnknownArea { area })?;
        self.bus.emit(GameEvent::AreaEntered {
            role,
            area: area_name,
        });
        self.start_next_task_if_idle(role)?;
        Ok(())
    }

    fn start_next_task_if_idle(&mut self, role: Role) -> Result<(), SessionError> {
        if matches!(self.tasks.progress(role), TaskProgress::InProgress { .. }) {
            return Ok(());
        }
        if let Some(next) = self.progression.next_task(&self.content, role)? {
            self.tasks.start_task(&self.content, role, next)?;
        }
        Ok(())
    }

    fn restore_from_store(&mut self) {
        let Some(payload) = self
            .store
            .get::<serde_json::Value>(SAVE_RECORD_KEY, SAVE_VERSION)
        else {
            return;
        };
        match decode_save_record(payload) {
            Ok(record) => {
                if let Err(error) = self.apply_save_record(&record) {
                    warn!(error = %error, "save_restore_failed_using_defaults");
                    self.reset_to_defaults();
                }
            }
            Err(error) => {
                warn!(error = %error, "save_record_undecodable_using_defaults");
            }
        }
    }

    fn apply_save_record(&mut self, record: &SaveRecord) -> Result<(), RestoreError> {
        // Resolve everything against the content set before mutating, so a
        // stale record cannot leave a half-applied session behind.
        let boy = resolve_saved_role_state(&self.content, &record.boy)?;
        let girl = resolve_saved_role_state(&self.content, &record.girl)?;
        let (areas, camp_upgrades) = resolve_saved_collections(&self.content, &record.collections)?;

        for (role, restored) in [(Role::Boy, boy), (Role::Girl, girl)] {
            self.tasks
                .restore(&self.content, role, restored.progress, restored.inventory)
                .map_err(|error| RestoreError::Undecodable {
                    path: format!("{}.task_state", role.as_token()),
                    message: error.to_string(),
                })?;
            for area in restored.unlocked {
                self.progression.unlock_area(role, area);
            }
            if let Some(area) = restored.current_area {
                self.progression.enter_area(role, area);
            }
            for task in restored.completed {
                self.progression.mark_task_completed(role, task);
            }
        }
        for (area, state) in areas {
            self.collections.restore_area(area, state);
        }
        self.collections.restore_camp_upgrades(camp_upgrades);
        self.registry = RoleRegistry::new(record.active_role.to_role());
        info!(
            active_role = record.active_role.to_role().as_token(),
            "save_restored"
        );
        Ok(())
    }

    fn reset_to_defaults(&mut self) {
        self.tasks.reset();
        self.progression.reset();
        self.collections.reset();
        self.registry = RoleRegistry::new(self.initial_role);
    }

    fn emit_collections_update(&mut self) {
        let snapshot = self.collections.snapshot(&self.content);
        self.bus.emit(GameEvent::CollectionsUpdate { snapshot });
    }

    fn emit_inventory_if_changed(
        &mut self,
        role: Role,
        before: &super::tasks::Inventory,
    ) {
        let after = self.tasks.inventory(role);
        if after == before {
            return;
        }
        let items = after
            .item_ids()
            .iter()
            .filter_map(|item| self.content.item(*item).map(|def| def.def_name.clone()))
            .collect();
        self.bus.emit(GameEvent::InventoryUpdate { role, items });
    }

    fn task_name(&self, task: TaskDefId) -> Result<String, SessionError> {
        self.content
            .task(task)
            .map(|def| def.def_name.clone())
            .ok_or_else(|| TaskError::UnknownTask { task }.into())
    }
}
