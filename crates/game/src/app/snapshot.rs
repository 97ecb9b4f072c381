use engine::ContentDatabase;

use super::progression::ProgressionSystem;
use super::roles::{Role, RoleSystemId};
use super::save::AutosaveSystem;
use super::tasks::{TaskProgress, TaskSystem};
use super::world::PlayerController;

/// The capability contract between the diagnostic layer and every
/// role-dependent system: "what role do you think is active". `None` means
/// the system has not been initialized yet, which is not a violation.
pub(crate) trait RoleReport {
    fn reported_role(&self) -> Option<Role>;
}

impl RoleReport for TaskSystem {
    fn reported_role(&self) -> Option<Role> {
        self.current_role()
    }
}

impl RoleReport for PlayerController {
    fn reported_role(&self) -> Option<Role> {
        self.active_player_role()
    }
}

impl RoleReport for ProgressionSystem {
    fn reported_role(&self) -> Option<Role> {
        self.role_id()
    }
}

impl RoleReport for AutosaveSystem {
    fn reported_role(&self) -> Option<Role> {
        self.reported_active_role()
    }
}

/// Ephemeral read-only aggregate of the role each system reports. Never a
/// source of truth and never persisted; exists only to catch desync.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RoleSnapshot {
    pub task: Option<Role>,
    pub world: Option<Role>,
    pub progression: Option<Role>,
    pub autosave: Option<Role>,
    pub inventory_count: usize,
    pub current_task: Option<String>,
}

impl RoleSnapshot {
    fn reports(&self) -> [(RoleSystemId, Option<Role>); 4] {
        [
            (RoleSystemId::Task, self.task),
            (RoleSystemId::World, self.world),
            (RoleSystemId::Progression, self.progression),
            (RoleSystemId::Autosave, self.autosave),
        ]
    }

    /// True iff every system that reports at all reports the same role.
    /// Vacuously true during partial startup.
    pub(crate) fn is_consistent(&self) -> bool {
        let mut seen: Option<Role> = None;
        for (_, report) in self.reports() {
            let Some(role) = report else {
                continue;
            };
            match seen {
                None => seen = Some(role),
                Some(expected) if expected == role => {}
                Some(_) => return false,
            }
        }
        true
    }

    /// One line per system disagreeing with the task system, which drives
    /// gameplay and is therefore the reference signal.
    pub(crate) fn describe_mismatches(&self) -> Vec<String> {
        let reference = self.task;
        let reference_text = role_text(reference);
        self.reports()
            .into_iter()
            .filter(|(system, _)| *system != RoleSystemId::Task)
            .filter(|(_, report)| *report != reference)
            .map(|(system, report)| {
                format!(
                    "{} reports {} but task system reports {}",
                    system.name(),
                    role_text(report),
                    reference_text
                )
            })
            .collect()
    }
}

fn role_text(role: Option<Role>) -> &'static str {
    match role {
        Some(role) => role.as_token(),
        None => "unknown",
    }
}

/// Observes, never corrects: fixing a mismatch is the Role Registry's job at
/// switch time. Constructed with explicit references to the four systems it
/// reads and torn down with the borrow.
pub(crate) struct ConsistencyProbe<'a> {
    tasks: &'a TaskSystem,
    world: &'a PlayerController,
    progression: &'a ProgressionSystem,
    autosave: &'a AutosaveSystem,
}

impl<'a> ConsistencyProbe<'a> {
    pub(crate) fn new(
        tasks: &'a TaskSystem,
        world: &'a PlayerController,
        progression: &'a ProgressionSystem,
        autosave: &'a AutosaveSystem,
    ) -> Self {
        Self {
            tasks,
            world,
            progression,
            autosave,
        }
    }

    pub(crate) fn capture(&self, content: &ContentDatabase) -> RoleSnapshot {
        let read = |report: &dyn RoleReport| report.reported_role();
        let task_role = read(self.tasks);
        let current_task = task_role.and_then(|role| match self.tasks.progress(role) {
            TaskProgress::InProgress { task, .. } | TaskProgress::Completed { task } => {
                content.task(task).map(|def| def.def_name.clone())
            }
            TaskProgress::Idle => None,
        });
        RoleSnapshot {
            task: task_role,
            world: read(self.world),
            progression: read(self.progression),
            autosave: read(self.autosave),
            inventory_count: task_role
                .map(|role| self.tasks.inventory(role).count())
                .unwrap_or(0),
            current_task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_snapshot() -> RoleSnapshot {
        RoleSnapshot {
            task: None,
            world: None,
            progression: None,
            autosave: None,
            inventory_count: 0,
            current_task: None,
        }
    }

    #[test]
    fn uninitialized_snapshot_is_vacuously_consistent() {
        let snapshot = empty_snapshot();
        assert!(snapshot.is_consistent());
        assert!(snapshot.describe_mismatches().is_empty());
    }

    #[test]
    fn partial_startup_is_not_a_violation() {
        let snapshot = RoleSnapshot {
            task: Some(Role::Boy),
            world: Some(Role::Boy),
            ..empty_snapshot()
        };
        assert!(snapshot.is_consistent());
    }

    #[test]
    fn half_notified_switch_names_exactly_the_stale_systems() {
        let snapshot = RoleSnapshot {
            task: Some(Role::Girl),
            world: Some(Role::Girl),
            progression: Some(Role::Boy),
            autosave: Some(Role::Boy),
            ..empty_snapshot()
        };
        assert!(!snapshot.is_consistent());
        let mismatches = snapshot.describe_mismatches();
        assert_eq!(mismatches.len(), 2);
        assert!(mismatches[0].starts_with("Progression reports boy"));
        assert!(mismatches[1].starts_with("Autosave reports boy"));
    }

    #[test]
    fn unknown_report_reads_as_unknown_in_diagnostics() {
        let snapshot = RoleSnapshot {
            task: Some(Role::Boy),
            world: None,
            progression: Some(Role::Boy),
            autosave: Some(Role::Boy),
            ..empty_snapshot()
        };
        // World has not reported; that differs from the reference only in
        // the diagnostic text, not in consistency.
        assert!(snapshot.is_consistent());
        let mismatches = snapshot.describe_mismatches();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(
            mismatches[0],
            "World reports unknown but task system reports boy"
        );
    }
}
