use engine::{RoleTag, Stage};
use thiserror::Error;
use tracing::{error, info};

use super::progression::ProgressionSystem;
use super::save::AutosaveSystem;
use super::tasks::TaskSystem;
use super::world::PlayerController;
use super::ROLE_NOTIFY_ORDER_TEXT;

/// The two playable twins. Exactly one is active at any instant; the other
/// keeps its own persisted progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Role {
    Boy,
    Girl,
}

impl Role {
    pub(crate) const BOTH: [Role; 2] = [Role::Boy, Role::Girl];

    pub(crate) fn other(self) -> Role {
        match self {
            Role::Boy => Role::Girl,
            Role::Girl => Role::Boy,
        }
    }

    pub(crate) fn as_token(self) -> &'static str {
        match self {
            Role::Boy => "boy",
            Role::Girl => "girl",
        }
    }

    pub(crate) fn to_content(self) -> RoleTag {
        match self {
            Role::Boy => RoleTag::Boy,
            Role::Girl => RoleTag::Girl,
        }
    }
}

/// Per-role storage for state both twins carry independently.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RoleSlots<T> {
    boy: T,
    girl: T,
}

impl<T> RoleSlots<T> {
    pub(crate) fn get(&self, role: Role) -> &T {
        match role {
            Role::Boy => &self.boy,
            Role::Girl => &self.girl,
        }
    }

    pub(crate) fn get_mut(&mut self, role: Role) -> &mut T {
        match role {
            Role::Boy => &mut self.boy,
            Role::Girl => &mut self.girl,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RoleSystemId {
    Task,
    World,
    Progression,
    Autosave,
}

impl RoleSystemId {
    pub(crate) fn name(self) -> &'static str {
        match self {
            RoleSystemId::Task => "Task",
            RoleSystemId::World => "World",
            RoleSystemId::Progression => "Progression",
            RoleSystemId::Autosave => "Autosave",
        }
    }
}

/// The documented fan-out contract: dependents learn about a role change in
/// exactly this order, synchronously, before `switch_role` returns.
pub(crate) const ROLE_NOTIFY_ORDER: [RoleSystemId; 4] = [
    RoleSystemId::Task,
    RoleSystemId::World,
    RoleSystemId::Progression,
    RoleSystemId::Autosave,
];

#[derive(Debug, Error)]
pub(crate) enum RoleChangeError {
    #[error("world has no avatar rig for role {role}")]
    MissingAvatarRig { role: &'static str },
}

#[derive(Debug, Error)]
pub(crate) enum RoleSwitchError {
    #[error("{system} rejected role change to {role}: {source}")]
    DependentFailed {
        system: &'static str,
        role: &'static str,
        rolled_back: bool,
        #[source]
        source: RoleChangeError,
    },
}

/// Mutable access to every role-dependent system for the duration of one
/// switch. Bundling them forces callers to hand over all dependents at once,
/// so a switch can never be applied to a subset.
pub(crate) struct RoleSwitchTxn<'a> {
    pub tasks: &'a mut TaskSystem,
    pub world: &'a mut PlayerController,
    pub progression: &'a mut ProgressionSystem,
    pub autosave: &'a mut AutosaveSystem,
    pub stage: &'a mut Stage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RoleSwitchReceipt {
    pub from: Role,
    pub to: Role,
    pub changed: bool,
}

/// Single authority for "which twin is active". Every other system either
/// consults this registry or is notified through `switch_role`; none may
/// re-derive the active role on its own.
pub(crate) struct RoleRegistry {
    active: Role,
    completed_switches: u64,
}

impl RoleRegistry {
    pub(crate) fn new(initial: Role) -> Self {
        Self {
            active: initial,
            completed_switches: 0,
        }
    }

    pub(crate) fn active_role(&self) -> Role {
        self.active
    }

    pub(crate) fn completed_switches(&self) -> u64 {
        self.completed_switches
    }

    /// The only sanctioned active-role mutation. Notifies every dependent in
    /// [`ROLE_NOTIFY_ORDER`] before returning. If a dependent rejects the
    /// change, already-notified dependents are rolled back to the prior role
    /// and the registry's own active role is left unchanged.
    pub(crate) fn switch_role(
        &mut self,
        to: Role,
        mut txn: RoleSwitchTxn<'_>,
    ) -> Result<RoleSwitchReceipt, RoleSwitchError> {
        let from = self.active;
        if to == from {
            return Ok(RoleSwitchReceipt {
                from,
                to,
                changed: false,
            });
        }

        for (idx, system) in ROLE_NOTIFY_ORDER.iter().enumerate() {
            if let Err(source) = Self::notify(*system, to, &mut txn) {
                let mut rolled_back = true;
                for notified in ROLE_NOTIFY_ORDER[..idx].iter().rev() {
                    if let Err(rollback_error) = Self::notify(*notified, from, &mut txn) {
                        rolled_back = false;
                        error!(
                            system = notified.name(),
                            error = %rollback_error,
                            "role_switch_rollback_failed"
                        );
                    }
                }
                return Err(RoleSwitchError::DependentFailed {
                    system: system.name(),
                    role: to.as_token(),
                    rolled_back,
                    source,
                });
            }
        }

        self.active = to;
        self.completed_switches = self.completed_switches.saturating_add(1);
        info!(
            from = from.as_token(),
            to = to.as_token(),
            order = ROLE_NOTIFY_ORDER_TEXT,
            switch_count = self.completed_switches,
            "role_switch_completed"
        );
        Ok(RoleSwitchReceipt {
            from,
            to,
            changed: true,
        })
    }

    /// Pushes the current active role to every dependent, in the same order
    /// as a switch. Used once at session start (and after a restore) so no
    /// system boots with a stale or unset role.
    pub(crate) fn broadcast(
        &self,
        mut txn: RoleSwitchTxn<'_>,
    ) -> Result<(), RoleSwitchError> {
        for system in ROLE_NOTIFY_ORDER.iter() {
            Self::notify(*system, self.active, &mut txn).map_err(|source| {
                RoleSwitchError::DependentFailed {
                    system: system.name(),
                    role: self.active.as_token(),
                    rolled_back: false,
                    source,
                }
            })?;
        }
        Ok(())
    }

    fn notify(
        system: RoleSystemId,
        role: Role,
        txn: &mut RoleSwitchTxn<'_>,
    ) -> Result<(), RoleChangeError> {
        match system {
            RoleSystemId::Task => txn.tasks.apply_role_change(role),
            RoleSystemId::World => txn.world.apply_role_change(role, txn.stage),
            RoleSystemId::Progression => txn.progression.apply_role_change(role),
            RoleSystemId::Autosave => txn.autosave.apply_role_change(role),
        }
    }
}
