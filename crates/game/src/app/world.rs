use engine::{AreaDefId, AvatarId, ContentDatabase, Stage};
use thiserror::Error;
use tracing::debug;

use super::roles::{Role, RoleChangeError, RoleSlots};

#[derive(Debug, Error)]
pub(crate) enum WorldError {
    #[error("unknown area def id {area:?}; content validation should have caught this")]
    UnknownArea { area: AreaDefId },
}

/// Thin world/player controller over the engine stage: keeps one avatar rig
/// per twin and swaps visibility on role change; populates area props from
/// the world manifest. Everything visual beyond that is out of scope.
#[derive(Debug, Default)]
pub(crate) struct PlayerController {
    active_role: Option<Role>,
    rigs: RoleSlots<Option<AvatarId>>,
    loaded_area: Option<AreaDefId>,
}

impl PlayerController {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn spawn_rigs(&mut self, stage: &mut Stage) {
        for role in Role::BOTH {
            if self.rigs.get(role).is_none() {
                let avatar = stage.spawn_avatar(role.as_token());
                *self.rigs.get_mut(role) = Some(avatar);
            }
        }
    }

    /// Role-change notification: the incoming twin's rig becomes the visible
    /// player mesh, the outgoing one is hidden. Refuses (and changes
    /// nothing) when the requested rig was never spawned.
    pub(crate) fn apply_role_change(
        &mut self,
        role: Role,
        stage: &mut Stage,
    ) -> Result<(), RoleChangeError> {
        let Some(rig) = *self.rigs.get(role) else {
            return Err(RoleChangeError::MissingAvatarRig {
                role: role.as_token(),
            });
        };
        if !stage.set_avatar_visible(rig, true) {
            return Err(RoleChangeError::MissingAvatarRig {
                role: role.as_token(),
            });
        }
        if let Some(other_rig) = *self.rigs.get(role.other()) {
            stage.set_avatar_visible(other_rig, false);
        }
        self.active_role = Some(role);
        Ok(())
    }

    pub(crate) fn active_player_role(&self) -> Option<Role> {
        self.active_role
    }

    pub(crate) fn avatar_rig(&self, role: Role) -> Option<AvatarId> {
        *self.rigs.get(role)
    }

    #[cfg(test)]
    pub(crate) fn drop_rig(&mut self, role: Role) {
        *self.rigs.get_mut(role) = None;
    }

    pub(crate) fn loaded_area(&self) -> Option<AreaDefId> {
        self.loaded_area
    }

    /// Rebuilds the stage prop set from the area's world manifest. Already
    /// being in the area is a no-op.
    pub(crate) fn load_area(
        &mut self,
        stage: &mut Stage,
        content: &ContentDatabase,
        area: AreaDefId,
    ) -> Result<(), WorldError> {
        if self.loaded_area == Some(area) {
            return Ok(());
        }
        let area_def = content
            .area(area)
            .ok_or(WorldError::UnknownArea { area })?;
        stage.clear_props();
        for interactable_id in &area_def.manifest {
            stage.spawn_prop(interactable_id);
        }
        self.loaded_area = Some(area);
        debug!(
            area = %area_def.def_name,
            prop_count = area_def.manifest.len(),
            "area_props_loaded"
        );
        Ok(())
    }
}
